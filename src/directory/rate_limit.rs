use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

use crate::config::RateLimitConfig;

/// Longest single backoff wait, whatever the attempt number.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Pacing policy applied around directory calls.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait that follows every remote call, successful or not.
    async fn pause(&self);

    /// Extra wait before retry number `attempt` (0-based).
    async fn backoff(&self, attempt: usize);
}

/// Fixed-interval gate: sleeps a random delay within `[min, max]` after each call
/// and doubles the backoff per retry.
#[derive(Debug, Clone)]
pub struct IntervalGate {
    min: Duration,
    max: Duration,
    backoff_base: Duration,
}

impl IntervalGate {
    pub fn new(min: Duration, max: Duration, backoff_base: Duration) -> Self {
        // inverted bounds collapse to min
        let max = max.max(min);
        Self { min, max, backoff_base }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.min_delay(), config.max_delay(), config.backoff_base())
    }

    /// Delay for the next pause, uniform within the bounds.
    pub fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
    }

    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}

#[async_trait]
impl RateLimiter for IntervalGate {
    async fn pause(&self) {
        let delay = self.next_delay();
        tokio::time::sleep(delay).await;
    }

    async fn backoff(&self, attempt: usize) {
        let delay = self.backoff_delay(attempt);
        log::debug!("Backing off {:?} before retry {}", delay, attempt + 1);
        tokio::time::sleep(delay).await;
    }
}

/// No waiting at all. For tests and offline tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl RateLimiter for NoDelay {
    async fn pause(&self) {}

    async fn backoff(&self, _attempt: usize) {}
}
