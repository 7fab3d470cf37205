use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;

use crate::cloud::UploadEngine;
use crate::config::PipelineConfig;
use crate::constants::FILE_APPEND_BUFFER_SIZE;
use crate::error::UploadError;
use crate::models::{Packet, ProgressFn, StorageLocation, UploadDestination};
use crate::pipeline::filesystem::FilesystemSink;

/// Where consumed packets go.
pub enum Sink {
    Filesystem(FilesystemSink),
    Cloud(UploadEngine),
}

impl Sink {
    /// Build the sink for `destination.loc`. `id` names the stream.
    pub fn for_destination(
        id: &str,
        destination: &UploadDestination,
        config: &PipelineConfig,
    ) -> Result<Self, UploadError> {
        match destination.loc {
            StorageLocation::FileSystem => Ok(Sink::Filesystem(FilesystemSink::create(&destination.url)?)),
            StorageLocation::ResumableSession | StorageLocation::Multipart => {
                Ok(Sink::Cloud(UploadEngine::new(id, destination, config)?))
            }
        }
    }

    pub fn submit(&self, packet: Packet) -> Result<(), UploadError> {
        match self {
            Sink::Filesystem(sink) => sink.submit(packet),
            Sink::Cloud(engine) => engine.submit(packet),
        }
    }

    pub fn flush(&self) -> Result<(), UploadError> {
        match self {
            Sink::Filesystem(sink) => sink.flush(),
            Sink::Cloud(engine) => engine.flush(),
        }
    }

    /// Finish without delivering buffered data. Local files are always flushed.
    pub fn stop_skipping_final_flush(&self) -> Result<(), UploadError> {
        match self {
            Sink::Filesystem(sink) => sink.flush(),
            Sink::Cloud(engine) => engine.stop_skipping_final_flush(),
        }
    }

    /// Feed a local file through the sink. Returns the bytes read.
    pub fn append_from_file(&self, path: &Path) -> Result<u64, UploadError> {
        let file = File::open(path)
            .map_err(|e| UploadError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
        let total = feed_reader(file, |packet| self.submit(packet))?;
        debug!("Appended {} bytes from {}", total, path.display());
        Ok(total)
    }

    pub fn segment_ids(&self) -> Vec<String> {
        match self {
            Sink::Filesystem(_) => Vec::new(),
            Sink::Cloud(engine) => engine.segment_ids(),
        }
    }

    pub fn session_id(&self) -> String {
        match self {
            Sink::Filesystem(_) => String::new(),
            Sink::Cloud(engine) => engine.session_id(),
        }
    }

    pub fn local_file(&self) -> Option<PathBuf> {
        match self {
            Sink::Filesystem(sink) => Some(sink.local_file().to_path_buf()),
            Sink::Cloud(_) => None,
        }
    }

    /// Bytes delivered so far: written to disk or acknowledged by the provider.
    pub fn uploaded_bytes(&self) -> u64 {
        match self {
            Sink::Filesystem(sink) => sink.bytes_written(),
            Sink::Cloud(engine) => engine.uploaded_bytes(),
        }
    }

    pub fn set_max_retries(&self, max_retries: u32) {
        if let Sink::Cloud(engine) = self {
            engine.set_max_retries(max_retries);
        }
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) {
        if let Sink::Cloud(engine) = self {
            engine.set_timeout(timeout);
        }
    }

    pub fn set_max_upload_speed(&self, bytes_per_sec: Option<u64>) {
        if let Sink::Cloud(engine) = self {
            engine.set_max_upload_speed(bytes_per_sec);
        }
    }

    pub fn set_progress_callback(&self, callback: ProgressFn, total_bytes: Option<u64>) {
        if let Sink::Cloud(engine) = self {
            engine.set_progress_callback(callback, total_bytes);
        }
    }
}

/// Read `reader` to the end in fixed-size packets.
fn feed_reader<R: Read>(
    mut reader: R,
    mut submit: impl FnMut(Packet) -> Result<(), UploadError>,
) -> Result<u64, UploadError> {
    let mut buffer = vec![0u8; FILE_APPEND_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        submit(Packet::copy_from_slice(&buffer[..n]))?;
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_temp_file, random_payload};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_feed_reader_splits_into_buffer_sized_packets() {
        let payload = random_payload(FILE_APPEND_BUFFER_SIZE * 2 + 10, 3);
        let mut sizes = Vec::new();
        let mut joined = Vec::new();

        let total = feed_reader(payload.as_slice(), |packet| {
            sizes.push(packet.len());
            joined.extend_from_slice(packet.as_bytes());
            Ok(())
        })
        .unwrap();

        assert_eq!(total, payload.len() as u64);
        assert_eq!(joined, payload);
        assert!(sizes.iter().all(|size| *size <= FILE_APPEND_BUFFER_SIZE));
    }

    #[test]
    fn test_feed_reader_stops_on_submit_error() {
        let payload = vec![0u8; FILE_APPEND_BUFFER_SIZE * 3];
        let mut calls = 0;
        let result = feed_reader(payload.as_slice(), |_| {
            calls += 1;
            Err(UploadError::Finished)
        });
        assert_eq!(result, Err(UploadError::Finished));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_filesystem_sink_append_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let source = create_temp_file(b"recorded bytes").unwrap();
        let out = temp_dir.path().join("copy.ts");

        let sink = Sink::for_destination(
            "copy",
            &UploadDestination::local(&out.to_string_lossy()),
            &PipelineConfig::default(),
        )
        .unwrap();
        assert_eq!(sink.append_from_file(source.path()).unwrap(), 14);
        sink.flush().unwrap();

        assert_eq!(fs::read(&out).unwrap(), b"recorded bytes");
        assert_eq!(sink.local_file(), Some(out));
        assert!(sink.segment_ids().is_empty());
        assert!(sink.session_id().is_empty());
    }
}
