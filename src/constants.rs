//! Global constants for the stream uploader.
//!
//! This module centralizes the hardcoded sizes, intervals and retry budgets
//! shared by the channel, the consumer and the upload engine.

// Channel constants
/// Largest single read taken from the byte channel (16MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Attempts made by a producer to open a channel that may not exist yet
pub const CHANNEL_CONNECT_RETRIES: usize = 5;

/// Delay between producer connection attempts in milliseconds
pub const CHANNEL_CONNECT_RETRY_DELAY_MS: u64 = 200;

/// How long a paused consumer waits before re-checking its flags
pub const PAUSE_POLL_INTERVAL_MS: u64 = 100;

// Upload engine constants
/// Working buffer size that triggers a non-final chunk send (8MB)
pub const CLOUD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Non-final chunks must be a multiple of this (256KB); resumable sessions reject other sizes
pub const CLOUD_CHUNK_SIZE_MULTIPLE: usize = 256 * 1024;

/// Interval between uploader ticks in milliseconds
pub const UPLOAD_TICK_MS: u64 = 16;

/// Provider cap on attempts per chunk; configured retries never exceed it
pub const CLOUD_MAX_RETRIES: u32 = 10;

/// Base delay added to every backoff sleep in milliseconds
pub const BACKOFF_BASE_DELAY_MS: u64 = 1000;

/// Upper bound on a single backoff sleep in milliseconds
pub const BACKOFF_MAX_DELAY_MS: u64 = 96_000;

/// Upper bound of the uniform jitter added to each backoff in milliseconds
pub const BACKOFF_JITTER_MS: u64 = 3000;

/// Pending bytes in the packet queue that trigger a growth warning (256MB)
pub const QUEUE_WARN_BYTES: usize = 256 * 1024 * 1024;

// Multipart constants
/// Attempts to obtain the signed endpoint for the next part
pub const MULTIPART_SEGMENT_RETRIES: u32 = 5;

/// Fixed delay between part endpoint attempts in milliseconds
pub const MULTIPART_SEGMENT_RETRY_DELAY_MS: u64 = 30;

/// Minimum request timeout for a part upload in seconds
pub const MULTIPART_MIN_TIMEOUT_SECS: u64 = 30;

/// Conservative upload throughput used to stretch part timeouts (256KB/s)
pub const MULTIPART_THROUGHPUT_ESTIMATE: u64 = 256 * 1024;

// File input constants
/// Read size used when feeding a local file through a sink (64KB)
pub const FILE_APPEND_BUFFER_SIZE: usize = 64 * 1024;

// Wire constants
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";
pub const RESUMABLE_START_HEADER: &str = "x-goog-resumable";
pub const FILE_URL_PREFIX: &str = "file://";

// Default file names
pub const DEFAULT_CONFIG_NAME: &str = "stream_uploader.yaml";
