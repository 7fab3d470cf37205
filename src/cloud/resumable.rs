//! Resumable-session storage backend.
//!
//! One session URI accepts successive byte ranges. A `308` response means
//! "continue" and echoes, in its `Range` header, how far the provider has
//! persisted the object; anything short of the request is resent by the
//! engine on its next attempt.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Client, StatusCode};

use crate::cloud::backend::{ChunkReceipt, CloudStorageClient};
use crate::cloud::http::{create_http_client, header_value, with_timeout};
use crate::constants::{CONTENT_TYPE_OCTET_STREAM, RESUMABLE_START_HEADER};
use crate::error::UploadError;
use crate::models::UploadDestination;
use crate::security::scrub_signed_url;

pub struct ResumableSessionClient {
    http: Client,
    destination: UploadDestination,
    timeout: Option<Duration>,
}

impl ResumableSessionClient {
    pub fn new() -> Result<Self, UploadError> {
        Ok(Self {
            http: create_http_client()?,
            destination: UploadDestination::default(),
            timeout: None,
        })
    }

    /// Open a session on `destination.url`; the returned `Location` becomes
    /// both the session id and the upload URI.
    async fn negotiate_session(&mut self) -> Result<(), UploadError> {
        let request = self
            .http
            .post(&self.destination.url)
            .header(RESUMABLE_START_HEADER, "start")
            .header(CONTENT_TYPE, CONTENT_TYPE_OCTET_STREAM)
            .header(CONTENT_LENGTH, 0);
        let response = with_timeout(request, self.timeout).send().await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(UploadError::TransientNetwork(format!(
                "Session negotiation returned status {}",
                status.as_u16()
            )));
        }

        let location = header_value(response.headers(), LOCATION.as_str()).ok_or_else(|| {
            UploadError::Integrity("Session negotiation response has no Location header".to_string())
        })?;

        info!("Negotiated resumable session {}", scrub_signed_url(&location));
        self.destination.session = location.clone();
        self.destination.url = location;
        Ok(())
    }
}

/// `Content-Range` for `len` bytes starting at `start`.
///
/// Non-final ranges leave the total open (`*`); the final one declares it.
/// An empty final chunk only declares the total.
pub fn content_range(start: u64, len: usize, is_last: bool) -> String {
    let total = if is_last {
        (start + len as u64).to_string()
    } else {
        "*".to_string()
    };

    if len == 0 {
        format!("bytes */{}", total)
    } else {
        format!("bytes {}-{}/{}", start, start + len as u64 - 1, total)
    }
}

/// Upper bound of an echoed `Range: bytes=0-N` header.
pub fn parse_range_upper_bound(range: &str) -> Option<u64> {
    let range = range.trim();
    let range = range.strip_prefix("bytes=").unwrap_or(range);
    let (_, end) = range.split_once('-')?;
    end.trim().parse().ok()
}

/// Bytes of this request the provider persisted, given the echoed range.
///
/// The provider reports the range of the whole object, so the request's own
/// start offset is used rather than the echoed one.
pub fn accepted_from_range(
    range: Option<&str>,
    uploaded_so_far: u64,
    requested: usize,
) -> Result<usize, UploadError> {
    let range = match range.map(str::trim) {
        None | Some("") => return Ok(0),
        Some(range) => range,
    };

    let end = parse_range_upper_bound(range)
        .ok_or_else(|| UploadError::Integrity(format!("Invalid range header received: {}", range)))?;

    let accepted = (end + 1).checked_sub(uploaded_so_far).ok_or_else(|| {
        UploadError::Integrity(format!(
            "Range {} ends before the {} bytes already uploaded",
            range, uploaded_so_far
        ))
    })?;

    if accepted > requested as u64 {
        return Err(UploadError::Integrity(format!(
            "Range {} acknowledges more than the {} bytes sent",
            range, requested
        )));
    }

    Ok(accepted as usize)
}

#[async_trait]
impl CloudStorageClient for ResumableSessionClient {
    async fn initialize_destination(&mut self, destination: &UploadDestination) -> Result<(), UploadError> {
        self.destination = destination.clone();
        if self.destination.session.is_empty() {
            self.negotiate_session().await?;
        }
        Ok(())
    }

    async fn start_new_segment(&mut self) -> Result<(), UploadError> {
        Ok(())
    }

    async fn upload_bytes(
        &mut self,
        chunk: &[u8],
        is_last: bool,
        uploaded_so_far: u64,
    ) -> Result<ChunkReceipt, UploadError> {
        let range = content_range(uploaded_so_far, chunk.len(), is_last);
        debug!("PUT {} ({} bytes)", range, chunk.len());

        let request = self
            .http
            .put(&self.destination.url)
            .header(CONTENT_TYPE, CONTENT_TYPE_OCTET_STREAM)
            .header(CONTENT_LENGTH, chunk.len())
            .header(CONTENT_RANGE, range)
            .body(chunk.to_vec());
        let response = with_timeout(request, self.timeout).send().await?;

        match response.status().as_u16() {
            200 | 201 => Ok(ChunkReceipt::accepted(chunk.len())),
            308 => {
                let echoed = header_value(response.headers(), RANGE.as_str());
                let accepted = accepted_from_range(echoed.as_deref(), uploaded_so_far, chunk.len())?;
                Ok(ChunkReceipt::accepted(accepted))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(UploadError::TransientNetwork(format!(
                    "Failed to send data to resumable session: {} {}",
                    status,
                    body.trim()
                )))
            }
        }
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn session_id(&self) -> String {
        self.destination.session.clone()
    }
}
