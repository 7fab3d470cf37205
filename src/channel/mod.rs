//! Named inter-process byte channel.
//!
//! The recorder process writes its output into a named channel owned by this
//! process. A [`ByteChannel`] is the consumer end: it is created before the
//! producer starts, blocks in [`ByteSource::wait_for_connect`] until the
//! producer opens it, and hands out one [`Packet`] per read. An empty packet
//! means the producer closed its end.
//!
//! Reads are capped at [`MAX_FRAME_SIZE`]; the producer side splits larger
//! writes (see [`ChannelWriter`]).

use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::constants::MAX_FRAME_SIZE;
use crate::error::ChannelError;
use crate::models::Packet;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;
mod writer;

#[cfg(unix)]
use unix::PlatformChannel;
#[cfg(windows)]
use windows::PlatformChannel;

pub use writer::ChannelWriter;

/// A blocking source of ordered packets.
///
/// Implemented by [`ByteChannel`] and by scripted sources in tests.
pub trait ByteSource: Send + 'static {
    /// Block until the producer has connected.
    fn wait_for_connect(&mut self) -> Result<(), ChannelError>;

    /// Block until the producer writes or disconnects.
    ///
    /// Returns an empty packet at end-of-stream. Read failures are not
    /// surfaced: they end the stream so the sink can still flush.
    fn read(&mut self) -> Packet;
}

/// Platform path of the channel called `name`.
pub fn channel_path(name: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(format!(r"\\.\pipe\{}", name))
    } else {
        std::env::temp_dir().join(format!("{}.pipe", name))
    }
}

/// Consumer end of a named channel.
pub struct ByteChannel {
    path: PathBuf,
    inner: PlatformChannel,
    buffer: Vec<u8>,
}

impl ByteChannel {
    /// Create the channel called `name`. Failure here is a configuration error.
    pub fn create(name: &str) -> Result<Self, ChannelError> {
        let path = channel_path(name);
        let inner = PlatformChannel::create(&path)?;
        debug!("Created channel {}", path.display());

        Ok(Self {
            path,
            inner,
            buffer: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for ByteChannel {
    fn wait_for_connect(&mut self) -> Result<(), ChannelError> {
        self.inner.connect(&self.path)?;
        if self.buffer.is_empty() {
            self.buffer = vec![0u8; MAX_FRAME_SIZE];
        }
        debug!("Producer connected to {}", self.path.display());
        Ok(())
    }

    fn read(&mut self) -> Packet {
        loop {
            match self.inner.read(&mut self.buffer) {
                Ok(0) => return Packet::empty(),
                Ok(n) => return Packet::copy_from_slice(&self.buffer[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("{}", ChannelError::Read(e));
                    return Packet::empty();
                }
            }
        }
    }
}

/// Nudge a consumer blocked on the channel at `path`.
///
/// Opens and immediately closes a producer handle so a pending connect or
/// read returns. Errors are ignored: there may be nobody waiting.
pub fn wake_channel(path: &Path) {
    #[cfg(unix)]
    unix::wake(path);
    #[cfg(windows)]
    windows::wake(path);
    #[cfg(not(any(unix, windows)))]
    let _ = path;
}

#[cfg(not(any(unix, windows)))]
struct PlatformChannel;

#[cfg(not(any(unix, windows)))]
impl PlatformChannel {
    fn create(_path: &Path) -> Result<Self, ChannelError> {
        Err(ChannelError::Unsupported(std::env::consts::OS))
    }

    fn connect(&mut self, _path: &Path) -> Result<(), ChannelError> {
        Err(ChannelError::Unsupported(std::env::consts::OS))
    }

    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_path_uses_name() {
        let path = channel_path("abc-123");
        let shown = path.to_string_lossy();
        assert!(shown.contains("abc-123"));
        if cfg!(windows) {
            assert!(shown.starts_with(r"\\.\pipe\"));
        } else {
            assert!(shown.ends_with("abc-123.pipe"));
        }
    }
}
