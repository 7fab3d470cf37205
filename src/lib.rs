//! # stream_uploader
//!
//! Streams the byte output of an external recorder to local disk or to cloud
//! object storage without ever blocking the recorder on network I/O.
//!
//! ## Overview
//!
//! The recorder writes into a named channel owned by this process. A consumer
//! thread reads the channel and hands each packet to a sink: either a local
//! file, or an upload engine that chunks the stream and sends it to a
//! resumable-session or multipart storage backend with jittered exponential
//! backoff.
//!
//! ```text
//! producer ─▶ ByteChannel ─▶ StreamConsumer ─▶ Sink ─┬─▶ local file
//!                                                    └─▶ UploadEngine ─▶ storage backend
//! ```
//!
//! ## Usage
//!
//! ### Recording to the cloud
//!
//! ```no_run
//! use stream_uploader::config::PipelineConfig;
//! use stream_uploader::models::UploadDestination;
//! use stream_uploader::pipeline::create_output_pipe;
//!
//! # fn main() -> anyhow::Result<()> {
//! let destination = UploadDestination::from_json(
//!     r#"{"url": "https://storage.example.com/upload", "bucket": "vods", "session": "", "loc": 1}"#,
//! )?;
//!
//! let mut pipe = create_output_pipe("vod-1234", &destination, &PipelineConfig::default())?;
//! pipe.start()?;
//! // ... the recorder writes to pipe.channel_path() and exits ...
//! pipe.wait()?;
//!
//! println!("Session {} committed {} segments", pipe.session_id(), pipe.segment_ids().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`channel`]: Named inter-process byte channel and producer-side writer
//! - [`pipeline`]: Stream consumer, sinks and the output pipe facade
//! - [`cloud`]: Upload engine, backoff and storage backends
//! - [`config`]: YAML pipeline configuration
//! - [`models`]: Packets, destinations and callbacks
//! - [`error`]: Channel and upload error types
//! - [`security`]: Signed URL scrubbing for logs
//! - [`constants`]: Application-wide constants
//!
//! ## Safety
//!
//! `unsafe` is confined to the platform channel backends (`mkfifo` on Unix,
//! named pipe calls on Windows). Each call documents its safety invariants.

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Named inter-process byte channel
pub mod channel;

/// Upload engine and storage backends
pub mod cloud;

/// Pipeline configuration
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// Error types for channels and uploads
pub mod error;

/// Core data models shared by every stage
pub mod models;

/// Consumer threads, sinks and output pipes
pub mod pipeline;

/// Security utilities for credential protection
pub mod security;

/// Test utilities and helpers
#[cfg(test)]
pub mod test_utils;
