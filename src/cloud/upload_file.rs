use std::fs;
use std::path::PathBuf;

use log::info;
use serde::{Deserialize, Serialize};

use crate::cloud::engine::UploadEngine;
use crate::config::{resolve_local_path, PipelineConfig};
use crate::error::UploadError;
use crate::models::{ProgressFn, UploadDestination};
use crate::pipeline::Sink;

/// Request to upload a finished local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudUploadRequest {
    /// Identifier of the upload, also used as the stream id
    pub task: String,
    /// Local path, optionally as a `file://` URL
    pub file: String,
    pub destination: UploadDestination,
}

impl CloudUploadRequest {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn local_path(&self) -> PathBuf {
        resolve_local_path(&self.file)
    }
}

/// Outcome of a completed upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudUploadResult {
    pub session: String,
    pub segments: Vec<String>,
    pub uploaded_bytes: u64,
}

/// Stream a local file to its cloud destination and wait for completion.
///
/// The progress callback, when given, reports the file size as the expected
/// total.
pub fn upload_to_cloud(
    request: &CloudUploadRequest,
    config: &PipelineConfig,
    progress: Option<ProgressFn>,
) -> Result<CloudUploadResult, UploadError> {
    let path = request.local_path();
    let total = fs::metadata(&path)
        .map_err(|e| UploadError::Io(format!("Failed to stat {}: {}", path.display(), e)))?
        .len();

    info!("Uploading {} ({} bytes) for task {}", path.display(), total, request.task);

    let engine = UploadEngine::new(&request.task, &request.destination, config)?;
    if let Some(progress) = progress {
        engine.set_progress_callback(progress, Some(total));
    }

    let sink = Sink::Cloud(engine);
    if let Err(e) = sink.append_from_file(&path) {
        // An aborted upload reports its own cause from flush
        sink.flush()?;
        return Err(e);
    }
    sink.flush()?;

    Ok(CloudUploadResult {
        session: sink.session_id(),
        segments: sink.segment_ids(),
        uploaded_bytes: sink.uploaded_bytes(),
    })
}
