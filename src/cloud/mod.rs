//! Cloud upload engine and storage backends.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────────┐
//! │ Stream consumer │────▶│  Packet queue   │────▶│ Uploader thread      │
//! └─────────────────┘     └─────────────────┘     │ (chunks, backoff)    │
//!                                                 └──────────┬───────────┘
//!                                                            │
//!                                      ┌─────────────────────┴─────┐
//!                                      │                           │
//!                              ┌───────▼────────┐         ┌────────▼───────┐
//!                              │ Resumable      │         │ Multipart      │
//!                              │ session        │         │ (signed parts) │
//!                              └────────────────┘         └────────────────┘
//! ```
//!
//! ## Usage Example
//!
//! ```no_run
//! use stream_uploader::cloud::UploadEngine;
//! use stream_uploader::config::PipelineConfig;
//! use stream_uploader::models::{Packet, UploadDestination};
//!
//! # fn example() -> Result<(), stream_uploader::error::UploadError> {
//! let destination = UploadDestination::from_json(
//!     r#"{"url": "https://storage.example.com/upload?upload_id=1", "session": "1", "loc": 1}"#,
//! ).expect("valid destination");
//!
//! let engine = UploadEngine::new("vod-1234", &destination, &PipelineConfig::default())?;
//! engine.submit(Packet::from(vec![0u8; 1024]))?;
//! engine.flush()?;
//! println!("Uploaded {} bytes", engine.uploaded_bytes());
//! # Ok(())
//! # }
//! ```

/// Storage provider contract and backend selection
pub mod backend;

/// Jittered exponential backoff
pub mod backoff;

/// Chunking uploader running on its own thread
pub mod engine;

/// HTTP client utilities for storage APIs
pub mod http;

/// Multipart storage backend
pub mod multipart;

/// Pending packet queue
pub mod queue;

/// Resumable-session storage backend
pub mod resumable;

/// One-shot upload of a local file
pub mod upload_file;

pub use backend::{ChunkReceipt, CloudStorageClient, StorageBackend};
pub use backoff::BackoffPolicy;
pub use engine::{EngineOptions, UploadEngine};
pub use upload_file::{upload_to_cloud, CloudUploadRequest, CloudUploadResult};
