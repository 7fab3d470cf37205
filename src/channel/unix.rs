use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::ChannelError;

/// FIFO in the temp directory. The file is removed when the channel drops.
pub(super) struct PlatformChannel {
    path: PathBuf,
    reader: Option<File>,
}

impl PlatformChannel {
    pub(super) fn create(path: &Path) -> Result<Self, ChannelError> {
        let create_err = |source: io::Error| ChannelError::Create {
            path: path.display().to_string(),
            source,
        };

        // A previous run that crashed leaves its FIFO behind
        if let Ok(metadata) = fs::symlink_metadata(path) {
            if !metadata.file_type().is_fifo() {
                return Err(create_err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "path exists and is not a FIFO",
                )));
            }
            debug!("Removing stale channel {}", path.display());
            fs::remove_file(path).map_err(create_err)?;
        }

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| create_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        // SAFETY: mkfifo only reads the NUL-terminated path, which outlives the call
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        if rc != 0 {
            return Err(create_err(io::Error::last_os_error()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            reader: None,
        })
    }

    /// Opening a FIFO for reading blocks until a writer opens it.
    pub(super) fn connect(&mut self, path: &Path) -> Result<(), ChannelError> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|source| ChannelError::Connect {
                path: path.display().to_string(),
                source,
            })?;
        self.reader = Some(file);
        Ok(())
    }

    pub(super) fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reader.as_mut() {
            Some(file) => file.read(buf),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "channel is not connected")),
        }
    }
}

impl Drop for PlatformChannel {
    fn drop(&mut self) {
        self.reader.take();
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove channel {}: {}", self.path.display(), e);
            }
        }
    }
}

pub(super) fn wake(path: &Path) {
    // Non-blocking so this never waits for a reader that is not there
    let _ = OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path);
}
