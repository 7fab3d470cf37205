use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use log::{debug, info};

use crate::config::resolve_local_path;
use crate::error::UploadError;
use crate::models::Packet;

/// Sink that appends every packet to a local file.
pub struct FilesystemSink {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
    written: AtomicU64,
}

impl FilesystemSink {
    /// Create (or truncate) the file named by a destination URL, creating
    /// parent directories as needed.
    pub fn create(url: &str) -> Result<Self, UploadError> {
        let path = resolve_local_path(url);
        Self::create_path(&path)
    }

    pub fn create_path(path: &Path) -> Result<Self, UploadError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                UploadError::Io(format!("Failed to create directory {}: {}", parent.display(), e))
            })?;
        }

        let file = File::create(path)
            .map_err(|e| UploadError::Io(format!("Failed to create {}: {}", path.display(), e)))?;
        debug!("Writing stream to {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(Some(BufWriter::new(file))),
            written: AtomicU64::new(0),
        })
    }

    pub fn submit(&self, packet: Packet) -> Result<(), UploadError> {
        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let writer = writer.as_mut().ok_or(UploadError::Finished)?;
        writer.write_all(packet.as_bytes())?;
        self.written.fetch_add(packet.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    /// Flush and sync the file. Later calls are no-ops.
    pub fn flush(&self) -> Result<(), UploadError> {
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(writer) = writer {
            let file = writer
                .into_inner()
                .map_err(|e| UploadError::Io(format!("Failed to flush {}: {}", self.path.display(), e.error())))?;
            file.sync_all()?;
            info!("Wrote {} bytes to {}", self.bytes_written(), self.path.display());
        }
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written.load(Ordering::SeqCst)
    }

    pub fn local_file(&self) -> &Path {
        &self.path
    }
}

impl Drop for FilesystemSink {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
