use std::time::Duration;

use async_trait::async_trait;

use crate::cloud::multipart::MultipartClient;
use crate::cloud::resumable::ResumableSessionClient;
use crate::config::PipelineConfig;
use crate::error::UploadError;
use crate::models::{StorageLocation, UploadDestination};

/// What a backend reports for one `upload_bytes` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkReceipt {
    /// Provider token for a committed part, when the provider issues one
    pub segment_token: Option<String>,
    /// Bytes of the request the provider accepted, counted from its start
    pub bytes_accepted: usize,
}

impl ChunkReceipt {
    pub fn accepted(bytes_accepted: usize) -> Self {
        Self {
            segment_token: None,
            bytes_accepted,
        }
    }
}

/// Upload contract shared by every storage provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudStorageClient: Send {
    /// Bind the client to `destination`, negotiating a session if needed.
    async fn initialize_destination(&mut self, destination: &UploadDestination) -> Result<(), UploadError>;

    /// Prepare the next logical segment after a non-final chunk was accepted.
    async fn start_new_segment(&mut self) -> Result<(), UploadError>;

    /// Send `chunk`, which starts at stream offset `uploaded_so_far`.
    async fn upload_bytes(
        &mut self,
        chunk: &[u8],
        is_last: bool,
        uploaded_so_far: u64,
    ) -> Result<ChunkReceipt, UploadError>;

    fn set_timeout(&mut self, timeout: Option<Duration>);

    /// Provider session identifier; empty when the provider has none.
    fn session_id(&self) -> String;
}

/// The closed set of storage providers, chosen once from the destination.
pub enum StorageBackend {
    Resumable(ResumableSessionClient),
    Multipart(MultipartClient),
}

impl StorageBackend {
    /// Select the backend for `destination`. `video_id` names the stream for
    /// part endpoint requests.
    pub fn for_destination(
        video_id: &str,
        destination: &UploadDestination,
        config: &PipelineConfig,
    ) -> Result<Self, UploadError> {
        match destination.loc {
            StorageLocation::ResumableSession => {
                Ok(StorageBackend::Resumable(ResumableSessionClient::new()?))
            }
            StorageLocation::Multipart => {
                let authority = config.multipart.part_authority_url.as_deref().ok_or_else(|| {
                    UploadError::InvalidDestination(
                        "multipart destinations require multipart.part_authority_url".to_string(),
                    )
                })?;
                Ok(StorageBackend::Multipart(MultipartClient::new(
                    video_id,
                    authority,
                    config.multipart.clone(),
                )?))
            }
            StorageLocation::FileSystem => Err(UploadError::InvalidDestination(format!(
                "{} is not a cloud destination",
                destination
            ))),
        }
    }
}

#[async_trait]
impl CloudStorageClient for StorageBackend {
    async fn initialize_destination(&mut self, destination: &UploadDestination) -> Result<(), UploadError> {
        match self {
            StorageBackend::Resumable(client) => client.initialize_destination(destination).await,
            StorageBackend::Multipart(client) => client.initialize_destination(destination).await,
        }
    }

    async fn start_new_segment(&mut self) -> Result<(), UploadError> {
        match self {
            StorageBackend::Resumable(client) => client.start_new_segment().await,
            StorageBackend::Multipart(client) => client.start_new_segment().await,
        }
    }

    async fn upload_bytes(
        &mut self,
        chunk: &[u8],
        is_last: bool,
        uploaded_so_far: u64,
    ) -> Result<ChunkReceipt, UploadError> {
        match self {
            StorageBackend::Resumable(client) => client.upload_bytes(chunk, is_last, uploaded_so_far).await,
            StorageBackend::Multipart(client) => client.upload_bytes(chunk, is_last, uploaded_so_far).await,
        }
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        match self {
            StorageBackend::Resumable(client) => client.set_timeout(timeout),
            StorageBackend::Multipart(client) => client.set_timeout(timeout),
        }
    }

    fn session_id(&self) -> String {
        match self {
            StorageBackend::Resumable(client) => client.session_id(),
            StorageBackend::Multipart(client) => client.session_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination(loc: StorageLocation) -> UploadDestination {
        UploadDestination {
            url: "https://storage.example.com/upload".to_string(),
            loc,
            ..Default::default()
        }
    }

    #[test]
    fn test_selects_backend_from_location() {
        let mut config = PipelineConfig::default();
        config.multipart.part_authority_url = Some("http://localhost:9000".to_string());

        let backend = StorageBackend::for_destination("v", &destination(StorageLocation::ResumableSession), &config);
        assert!(matches!(backend, Ok(StorageBackend::Resumable(_))));

        let backend = StorageBackend::for_destination("v", &destination(StorageLocation::Multipart), &config);
        assert!(matches!(backend, Ok(StorageBackend::Multipart(_))));
    }

    #[test]
    fn test_multipart_without_authority_is_invalid() {
        let result = StorageBackend::for_destination(
            "v",
            &destination(StorageLocation::Multipart),
            &PipelineConfig::default(),
        );
        assert!(matches!(result, Err(UploadError::InvalidDestination(_))));
    }

    #[test]
    fn test_filesystem_is_not_a_cloud_backend() {
        let result = StorageBackend::for_destination(
            "v",
            &destination(StorageLocation::FileSystem),
            &PipelineConfig::default(),
        );
        assert!(matches!(result, Err(UploadError::InvalidDestination(_))));
    }
}
