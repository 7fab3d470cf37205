//! Test utilities for stream_uploader
//!
//! Fixtures shared by the unit tests: fast engine settings, destinations, a
//! scripted byte source and polling helpers.

#![cfg(test)]

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::NamedTempFile;

use crate::channel::ByteSource;
use crate::cloud::{BackoffPolicy, EngineOptions};
use crate::error::ChannelError;
use crate::models::{Packet, StorageLocation, UploadDestination};

/// Engine options with a short tick and near-zero backoff.
pub fn fast_engine_options(chunk_size: usize) -> EngineOptions {
    EngineOptions {
        chunk_size,
        tick: Duration::from_millis(1),
        backoff: BackoffPolicy {
            max_retries: 10,
            base_delay: Duration::ZERO,
            max_delay: Duration::from_millis(5),
            jitter: Duration::ZERO,
        },
        timeout: None,
        max_upload_bytes_per_sec: None,
        queue_warn_bytes: usize::MAX,
        rng_seed: Some(7),
    }
}

pub fn resumable_destination() -> UploadDestination {
    UploadDestination {
        url: "https://storage.example.com/upload/session".to_string(),
        bucket: "vods".to_string(),
        session: "session-1".to_string(),
        loc: StorageLocation::ResumableSession,
    }
}

/// Poll `predicate` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    predicate()
}

/// Deterministic pseudo-random bytes.
pub fn random_payload(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.random()).collect()
}

/// Creates a temporary file with the given content
pub fn create_temp_file(content: &[u8]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content)?;
    file.flush()?;
    Ok(file)
}

/// Byte source that replays a fixed list of packets, then reports end-of-stream.
pub struct ScriptedSource {
    packets: VecDeque<Packet>,
    fail_connect: bool,
    read_delay: Duration,
    reads: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(packets: Vec<Vec<u8>>) -> Self {
        Self {
            packets: packets.into_iter().map(Packet::from).collect(),
            fail_connect: false,
            read_delay: Duration::ZERO,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_connect() -> Self {
        let mut source = Self::new(Vec::new());
        source.fail_connect = true;
        source
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Counter of completed reads, shared with the test.
    pub fn reads(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }
}

impl ByteSource for ScriptedSource {
    fn wait_for_connect(&mut self) -> Result<(), ChannelError> {
        if self.fail_connect {
            return Err(ChannelError::Connect {
                path: "scripted".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        Ok(())
    }

    fn read(&mut self) -> Packet {
        if !self.read_delay.is_zero() {
            thread::sleep(self.read_delay);
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.packets.pop_front().unwrap_or_else(Packet::empty)
    }
}
