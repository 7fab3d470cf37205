//! Error taxonomy for the streaming pipeline.
//!
//! Channel failures degrade to end-of-stream, network and integrity failures
//! are retried by the upload engine, and only an exhausted retry budget (or a
//! failure to negotiate the next multipart segment) aborts a stream.

use std::io;

/// Failures of the inter-process byte channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to create channel {path}: {source}")]
    Create { path: String, source: io::Error },

    #[error("Failed to connect channel {path}: {source}")]
    Connect { path: String, source: io::Error },

    #[error("Failed to read from channel: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write to channel: {0}")]
    Write(#[source] io::Error),

    #[error("Named channels are not supported on {0}")]
    Unsupported(&'static str),
}

/// Failures raised while delivering packets to a sink.
///
/// Payloads are strings so the outcome of a finished upload can be stored and
/// handed out again by every later `flush()`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Transient network failure: {0}")]
    TransientNetwork(String),

    #[error("Integrity failure: {0}")]
    Integrity(String),

    #[error("Failed to upload chunk after {attempts} attempts: {last_error}")]
    RetryBudgetExhausted { attempts: u32, last_error: String },

    #[error("Failed to start new upload segment: {0}")]
    SegmentNegotiation(String),

    #[error("Invalid upload destination: {0}")]
    InvalidDestination(String),

    #[error("I/O failure: {0}")]
    Io(String),

    #[error("Upload already finished")]
    Finished,

    #[error("Uploader runtime failure: {0}")]
    Runtime(String),
}

impl UploadError {
    /// Whether this error ends the stream instead of being retried locally.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            UploadError::RetryBudgetExhausted { .. }
                | UploadError::SegmentNegotiation(_)
                | UploadError::InvalidDestination(_)
                | UploadError::Runtime(_)
        )
    }
}

impl From<io::Error> for UploadError {
    fn from(e: io::Error) -> Self {
        UploadError::Io(e.to_string())
    }
}

impl From<ChannelError> for UploadError {
    fn from(e: ChannelError) -> Self {
        UploadError::Channel(e.to_string())
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        // Signed URLs end up in reqwest's messages
        let e = e.without_url();
        UploadError::TransientNetwork(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(UploadError::RetryBudgetExhausted { attempts: 10, last_error: "x".into() }.is_fatal());
        assert!(UploadError::SegmentNegotiation("x".into()).is_fatal());
        assert!(!UploadError::TransientNetwork("x".into()).is_fatal());
        assert!(!UploadError::Integrity("x".into()).is_fatal());
        assert!(!UploadError::Finished.is_fatal());
    }

    #[test]
    fn test_channel_error_converts_to_upload_error() {
        let err: UploadError = ChannelError::Read(io::Error::new(io::ErrorKind::BrokenPipe, "gone")).into();
        assert!(matches!(err, UploadError::Channel(ref msg) if msg.contains("gone")));
    }
}
