use reelsync_core::MonitorConfig;
use std::time::Duration;

/// Cap for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Bounded exponential backoff for in-process upload retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.max_attempts, config.backoff_base())
    }

    /// Sleep after failed attempt number `attempt` (1-based): base, 2x base, 4x base...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(MAX_BACKOFF)
    }

    /// Whether another attempt follows attempt number `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    pub async fn backoff(&self, attempt: u32) {
        tokio::time::sleep(self.delay_for(attempt)).await;
    }
}
