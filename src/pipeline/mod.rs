//! Output pipes: one named channel, one consumer thread and one sink.
//!
//! ## Usage Example
//!
//! ```no_run
//! use stream_uploader::config::PipelineConfig;
//! use stream_uploader::models::UploadDestination;
//! use stream_uploader::pipeline::create_output_pipe;
//!
//! # fn example() -> Result<(), stream_uploader::error::UploadError> {
//! let destination = UploadDestination::local("/tmp/vods/match-42.ts");
//! let mut pipe = create_output_pipe("match-42", &destination, &PipelineConfig::default())?;
//! println!("Recorder should write to {}", pipe.channel_path().display());
//!
//! pipe.start()?;
//! pipe.wait()?;
//! # Ok(())
//! # }
//! ```

mod consumer;
mod filesystem;
mod sink;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};

use crate::channel::{wake_channel, ByteChannel};
use crate::config::PipelineConfig;
use crate::error::UploadError;
use crate::models::{ProgressFn, UploadDestination};
use crate::security::safe_error_message;

pub use consumer::{consume, ConsumerControl, ConsumerState, StreamConsumer};
pub use filesystem::FilesystemSink;
pub use sink::Sink;

/// A named channel wired to a sink.
pub struct OutputPipe {
    id: String,
    channel_path: PathBuf,
    channel: Option<ByteChannel>,
    sink: Arc<Sink>,
    control: Arc<ConsumerControl>,
    consumer: Option<StreamConsumer>,
}

/// Create the channel `id` and the sink for `destination`.
///
/// Failing to create the channel is fatal.
pub fn create_output_pipe(
    id: &str,
    destination: &UploadDestination,
    config: &PipelineConfig,
) -> Result<OutputPipe, UploadError> {
    let channel = ByteChannel::create(id)?;
    let sink = Sink::for_destination(id, destination, config)?;
    info!("Output pipe {} -> {}", id, destination);

    Ok(OutputPipe {
        id: id.to_string(),
        channel_path: channel.path().to_path_buf(),
        channel: Some(channel),
        sink: Arc::new(sink),
        control: Arc::new(ConsumerControl::new(Duration::from_millis(config.channel.pause_poll_ms))),
        consumer: None,
    })
}

impl OutputPipe {
    /// Start consuming the channel on a background thread.
    pub fn start(&mut self) -> Result<(), UploadError> {
        let channel = self
            .channel
            .take()
            .ok_or_else(|| UploadError::Runtime(format!("Output pipe {} already started", self.id)))?;

        let consumer = StreamConsumer::start(&self.id, channel, Arc::clone(&self.sink), Arc::clone(&self.control))?;
        self.consumer = Some(consumer);
        Ok(())
    }

    /// Wait for the producer to finish and the sink to flush.
    pub fn wait(&mut self) -> Result<(), UploadError> {
        match self.consumer.as_mut() {
            Some(consumer) => consumer.join(),
            None => self.sink.flush(),
        }
    }

    /// Stop reading. A blocked connect or read is nudged so the consumer can
    /// drain.
    pub fn stop(&mut self) {
        debug!("Stopping output pipe {}", self.id);
        self.control.stop();
        if self.consumer.as_ref().map_or(false, |consumer| !consumer.is_finished()) {
            wake_channel(&self.channel_path);
        }
    }

    /// Stop without delivering what is still buffered.
    pub fn stop_and_skip_flush(&mut self) -> Result<(), UploadError> {
        let result = self.sink.stop_skipping_final_flush();
        self.stop();
        result
    }

    pub fn pause_processing(&self, paused: bool) {
        self.control.pause(paused);
    }

    /// Feed a local file through the sink.
    pub fn append_from_file(&self, path: &Path) -> Result<u64, UploadError> {
        self.sink.append_from_file(path)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn channel_path(&self) -> &Path {
        &self.channel_path
    }

    pub fn state(&self) -> ConsumerState {
        self.control.state()
    }

    pub fn session_id(&self) -> String {
        self.sink.session_id()
    }

    pub fn segment_ids(&self) -> Vec<String> {
        self.sink.segment_ids()
    }

    pub fn local_file(&self) -> Option<PathBuf> {
        self.sink.local_file()
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.sink.uploaded_bytes()
    }

    pub fn set_max_retries(&self, max_retries: u32) {
        self.sink.set_max_retries(max_retries);
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.sink.set_timeout(timeout);
    }

    pub fn set_max_upload_speed(&self, bytes_per_sec: Option<u64>) {
        self.sink.set_max_upload_speed(bytes_per_sec);
    }

    pub fn set_progress_callback(&self, callback: ProgressFn, total_bytes: Option<u64>) {
        self.sink.set_progress_callback(callback, total_bytes);
    }
}

impl Drop for OutputPipe {
    fn drop(&mut self) {
        if self.consumer.is_some() {
            self.stop();
            if let Err(e) = self.wait() {
                error!("{}", safe_error_message(&format!("Output pipe {} did not complete", self.id), &e));
            }
        }
    }
}
