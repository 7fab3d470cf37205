use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::debug;

use crate::channel::channel_path;
use crate::constants::{CHANNEL_CONNECT_RETRIES, CHANNEL_CONNECT_RETRY_DELAY_MS, MAX_FRAME_SIZE};
use crate::error::ChannelError;

/// Producer end of a named channel.
///
/// Dropping the writer closes the channel, which the consumer reads as
/// end-of-stream.
#[derive(Debug)]
pub struct ChannelWriter {
    path: PathBuf,
    file: File,
}

impl ChannelWriter {
    /// Connect to the channel called `name`, retrying while it does not exist yet.
    pub fn connect(name: &str) -> Result<Self, ChannelError> {
        Self::connect_path(&channel_path(name))
    }

    pub fn connect_path(path: &Path) -> Result<Self, ChannelError> {
        let mut last_error = None;

        for attempt in 1..=CHANNEL_CONNECT_RETRIES {
            // Never create: a missing channel must not turn into a regular file
            match OpenOptions::new().write(true).open(path) {
                Ok(file) => {
                    debug!("Connected to channel {} on attempt {}", path.display(), attempt);
                    return Ok(Self {
                        path: path.to_path_buf(),
                        file,
                    });
                }
                Err(e) => {
                    debug!("Channel {} not ready (attempt {}): {}", path.display(), attempt, e);
                    last_error = Some(e);
                    if attempt < CHANNEL_CONNECT_RETRIES {
                        thread::sleep(Duration::from_millis(CHANNEL_CONNECT_RETRY_DELAY_MS));
                    }
                }
            }
        }

        Err(ChannelError::Connect {
            path: path.display().to_string(),
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "channel not found")),
        })
    }

    /// Write all of `data`, one frame at a time.
    pub fn write_all(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        for frame in data.chunks(MAX_FRAME_SIZE) {
            self.file.write_all(frame).map_err(ChannelError::Write)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
