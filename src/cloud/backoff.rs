use std::time::Duration;

use rand::Rng;

use crate::config::BackoffSettings;
use crate::constants::CLOUD_MAX_RETRIES;

/// Truncated exponential backoff with additive uniform jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_settings(&BackoffSettings::default(), CLOUD_MAX_RETRIES)
    }
}

impl BackoffPolicy {
    /// Build a policy; `max_retries` is capped at the provider limit.
    pub fn from_settings(settings: &BackoffSettings, max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.min(CLOUD_MAX_RETRIES),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter: Duration::from_millis(settings.jitter_ms),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.min(CLOUD_MAX_RETRIES);
        self
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-based):
    /// `min(base + 2^attempt ms + jitter, max)`.
    pub fn delay_for<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exponential = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rng.random_range(0..=jitter_ms)
        };

        let delay_ms = (self.base_delay.as_millis() as u64)
            .saturating_add(exponential)
            .saturating_add(jitter);
        Duration::from_millis(delay_ms).min(self.max_delay)
    }
}
