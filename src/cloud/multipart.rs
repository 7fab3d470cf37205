//! Multipart storage backend.
//!
//! Every part goes to its own pre-signed URL and is accepted whole or not at
//! all. After each non-final part the client asks the part authority for the
//! signed URL of the next one.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{CONTENT_TYPE, ETAG};
use reqwest::Client;

use crate::cloud::backend::{ChunkReceipt, CloudStorageClient};
use crate::cloud::http::{create_http_client, header_value};
use crate::config::MultipartSettings;
use crate::constants::CONTENT_TYPE_OCTET_STREAM;
use crate::error::UploadError;
use crate::models::UploadDestination;
use crate::security::safe_error_message;

pub struct MultipartClient {
    http: Client,
    video_id: String,
    authority_url: String,
    destination: UploadDestination,
    current_part: u32,
    settings: MultipartSettings,
    timeout: Option<Duration>,
}

impl MultipartClient {
    pub fn new(video_id: &str, authority_url: &str, settings: MultipartSettings) -> Result<Self, UploadError> {
        Ok(Self {
            http: create_http_client()?,
            video_id: video_id.to_string(),
            authority_url: authority_url.trim_end_matches('/').to_string(),
            destination: UploadDestination::default(),
            current_part: 1,
            settings,
            timeout: None,
        })
    }

    /// Part number the next `upload_bytes` call targets.
    pub fn current_part(&self) -> u32 {
        self.current_part
    }

    async fn request_part_destination(&self) -> Result<UploadDestination, UploadError> {
        let url = format!("{}/vod/{}/upload/part", self.authority_url, self.video_id);
        let part = self.current_part.to_string();

        let response = self
            .http
            .get(&url)
            .query(&[
                ("bucket", self.destination.bucket.as_str()),
                ("session", self.destination.session.as_str()),
                ("part", part.as_str()),
            ])
            .timeout(Duration::from_secs(self.settings.min_timeout_secs))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UploadError::TransientNetwork(format!(
                "Part authority returned status {}",
                response.status().as_u16()
            )));
        }

        let mut destination: UploadDestination = response.json().await?;
        destination.loc = self.destination.loc;
        if destination.bucket.is_empty() {
            destination.bucket = self.destination.bucket.clone();
        }
        if destination.session.is_empty() {
            destination.session = self.destination.session.clone();
        }
        Ok(destination)
    }
}

#[async_trait]
impl CloudStorageClient for MultipartClient {
    async fn initialize_destination(&mut self, destination: &UploadDestination) -> Result<(), UploadError> {
        self.destination = destination.clone();
        Ok(())
    }

    async fn start_new_segment(&mut self) -> Result<(), UploadError> {
        self.current_part += 1;
        let retries = self.settings.segment_retries.max(1);

        for attempt in 1..=retries {
            match self.request_part_destination().await {
                Ok(destination) => {
                    debug!("Obtained upload URL for part {}", self.current_part);
                    self.destination = destination;
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "{} [attempt {}/{}]",
                        safe_error_message("Failed to get new segment", &e),
                        attempt,
                        retries
                    );
                    if attempt < retries {
                        tokio::time::sleep(Duration::from_millis(self.settings.segment_retry_delay_ms)).await;
                    }
                }
            }
        }

        Err(UploadError::SegmentNegotiation(format!(
            "no upload URL for part {} after {} attempts",
            self.current_part, retries
        )))
    }

    async fn upload_bytes(
        &mut self,
        chunk: &[u8],
        _is_last: bool,
        _uploaded_so_far: u64,
    ) -> Result<ChunkReceipt, UploadError> {
        // An empty part cannot finalize anything
        if chunk.is_empty() {
            return Ok(ChunkReceipt::default());
        }

        let timeout = self.settings.part_timeout(chunk.len(), self.timeout);
        debug!("PUT part {} ({} bytes, timeout {:?})", self.current_part, chunk.len(), timeout);

        let response = self
            .http
            .put(&self.destination.url)
            .header(CONTENT_TYPE, CONTENT_TYPE_OCTET_STREAM)
            .body(chunk.to_vec())
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::TransientNetwork(format!(
                "Failed to upload part {}: {} {}",
                self.current_part,
                status,
                body.trim()
            )));
        }

        let etag = header_value(response.headers(), ETAG.as_str()).ok_or_else(|| {
            UploadError::Integrity(format!("Part {} response has no ETag", self.current_part))
        })?;

        Ok(ChunkReceipt {
            segment_token: Some(etag),
            bytes_accepted: chunk.len(),
        })
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn session_id(&self) -> String {
        self.destination.session.clone()
    }
}
