//! Execution engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Execution engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Venue used when an order carries no venue hint
    pub default_venue: String,

    /// Retry policy for venue submissions
    pub retry: RetryConfig,

    /// How long to wait for a submitted slice to finish (milliseconds)
    pub slice_timeout_ms: u64,

    /// How long to wait for a venue cancel confirmation (milliseconds)
    pub cancel_timeout_ms: u64,

    /// Consecutive zero-fill slices before a resting order stops
    /// resubmitting its remainder
    pub max_zero_fill_slices: u32,
}

/// Retry policy with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per slice before rolling forward
    pub max_attempts: u32,

    /// Initial delay between attempts (milliseconds)
    pub initial_delay_ms: u64,

    /// Ceiling on the delay (milliseconds)
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier
    pub backoff_multiplier: u32,
}

impl RetryConfig {
    /// Backoff delay before retry number `attempt` (zero-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_multiplier).saturating_pow(attempt);
        let delay = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 50,
            max_delay_ms: 1_000,
            backoff_multiplier: 2,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_venue: "mock".to_string(),
            retry: RetryConfig::default(),
            slice_timeout_ms: 2_000,
            cancel_timeout_ms: 2_000,
            max_zero_fill_slices: 3,
        }
    }
}

impl ExecutionConfig {
    /// Slice completion deadline as a [`Duration`]
    #[must_use]
    pub const fn slice_timeout(&self) -> Duration {
        Duration::from_millis(self.slice_timeout_ms)
    }

    /// Cancel confirmation deadline as a [`Duration`]
    #[must_use]
    pub const fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }
}
