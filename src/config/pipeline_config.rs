use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::constants::{
    BACKOFF_BASE_DELAY_MS, BACKOFF_JITTER_MS, BACKOFF_MAX_DELAY_MS, CLOUD_CHUNK_SIZE,
    CLOUD_CHUNK_SIZE_MULTIPLE, CLOUD_MAX_RETRIES, MULTIPART_MIN_TIMEOUT_SECS, MULTIPART_SEGMENT_RETRIES,
    MULTIPART_SEGMENT_RETRY_DELAY_MS, MULTIPART_THROUGHPUT_ESTIMATE, PAUSE_POLL_INTERVAL_MS,
    QUEUE_WARN_BYTES, UPLOAD_TICK_MS,
};

/// Upload engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Working buffer size that triggers a non-final chunk send
    pub chunk_size_bytes: usize,
    /// Interval between uploader ticks
    pub tick_interval_ms: u64,
    /// Attempts per chunk, capped at the provider limit
    pub max_retries: u32,
    /// Request timeout; `None` leaves the backend default in place
    pub timeout_secs: Option<u64>,
    pub max_upload_bytes_per_sec: Option<u64>,
    /// Pending queue size that raises a growth warning
    pub queue_warn_bytes: usize,
    /// Seed for the backoff jitter generator (OS entropy when absent)
    pub rng_seed: Option<u64>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            chunk_size_bytes: CLOUD_CHUNK_SIZE,
            tick_interval_ms: UPLOAD_TICK_MS,
            max_retries: CLOUD_MAX_RETRIES,
            timeout_secs: None,
            max_upload_bytes_per_sec: None,
            queue_warn_bytes: QUEUE_WARN_BYTES,
            rng_seed: None,
        }
    }
}

/// Truncated exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: BACKOFF_BASE_DELAY_MS,
            max_delay_ms: BACKOFF_MAX_DELAY_MS,
            jitter_ms: BACKOFF_JITTER_MS,
        }
    }
}

/// Multipart backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultipartSettings {
    /// Service that signs the endpoint for each subsequent part
    pub part_authority_url: Option<String>,
    pub segment_retries: u32,
    pub segment_retry_delay_ms: u64,
    pub min_timeout_secs: u64,
    pub throughput_estimate_bytes_per_sec: u64,
}

impl Default for MultipartSettings {
    fn default() -> Self {
        Self {
            part_authority_url: None,
            segment_retries: MULTIPART_SEGMENT_RETRIES,
            segment_retry_delay_ms: MULTIPART_SEGMENT_RETRY_DELAY_MS,
            min_timeout_secs: MULTIPART_MIN_TIMEOUT_SECS,
            throughput_estimate_bytes_per_sec: MULTIPART_THROUGHPUT_ESTIMATE,
        }
    }
}

impl MultipartSettings {
    /// Request timeout for a part of `num_bytes`: the floor plus the time the
    /// payload needs at the estimated throughput.
    pub fn part_timeout(&self, num_bytes: usize, floor: Option<Duration>) -> Duration {
        let floor = floor.unwrap_or(Duration::from_secs(self.min_timeout_secs));
        let throughput = self.throughput_estimate_bytes_per_sec.max(1);
        floor + Duration::from_millis(num_bytes as u64 * 1000 / throughput)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub pause_poll_ms: u64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            pause_poll_ms: PAUSE_POLL_INTERVAL_MS,
        }
    }
}

/// Complete pipeline configuration, loadable from YAML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub upload: UploadSettings,
    pub backoff: BackoffSettings,
    pub multipart: MultipartSettings,
    pub channel: ChannelSettings,
}

impl PipelineConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: PipelineConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML config")?;
        config.validate()?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .context("Failed to serialize config to YAML")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .context(format!("Failed to create config directory {}", parent.display()))?;
        }

        fs::write(path, yaml)
            .context(format!("Failed to write config to {}", path.display()))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Create a default configuration YAML file
    pub fn create_default_config_file(path: &Path) -> Result<()> {
        PipelineConfig::default().save_to_yaml_file(path)
    }

    /// Reject settings the uploader cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.upload.chunk_size_bytes == 0 {
            return Err(anyhow!("upload.chunk_size_bytes must be greater than zero"));
        }
        if self.upload.chunk_size_bytes % CLOUD_CHUNK_SIZE_MULTIPLE != 0 {
            return Err(anyhow!(
                "upload.chunk_size_bytes ({}) must be a multiple of {} bytes",
                self.upload.chunk_size_bytes,
                CLOUD_CHUNK_SIZE_MULTIPLE
            ));
        }
        if self.upload.tick_interval_ms == 0 {
            return Err(anyhow!("upload.tick_interval_ms must be greater than zero"));
        }
        if self.backoff.max_delay_ms < self.backoff.base_delay_ms {
            return Err(anyhow!(
                "backoff.max_delay_ms ({}) is below backoff.base_delay_ms ({})",
                self.backoff.max_delay_ms,
                self.backoff.base_delay_ms
            ));
        }
        Ok(())
    }
}

/// Load a configuration file or create a default one.
///
/// * A path that exists is loaded and validated.
/// * A path that does not exist receives the default configuration.
/// * No path means the built-in defaults.
pub fn load_or_create_config(config_path: Option<&Path>) -> Result<PipelineConfig> {
    match config_path {
        Some(path) if path.exists() => PipelineConfig::from_yaml_file(path),
        Some(path) => {
            info!("Creating default config at {}", path.display());
            let default_config = PipelineConfig::default();
            default_config.save_to_yaml_file(path)?;
            Ok(default_config)
        }
        None => {
            info!("No config path provided, using default configuration");
            Ok(PipelineConfig::default())
        }
    }
}
