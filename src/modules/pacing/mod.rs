//! Request pacing and backoff windows.
//!
//! The executor waits on a [`RequestPacer`] before each attempt that has no
//! explicit timeout override, and asks a [`BackoffPolicy`] how long to wait
//! after a blocked response.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Self-imposed rate limit applied before network attempts.
#[async_trait]
pub trait RequestPacer: Send + Sync {
    async fn pace(&self);
}

/// Sleeps a fixed spacing before every attempt.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelayPacer {
    delay: Duration,
}

impl FixedDelayPacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for FixedDelayPacer {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl RequestPacer for FixedDelayPacer {
    async fn pace(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}

/// Disables pacing entirely.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPacer;

#[async_trait]
impl RequestPacer for NoopPacer {
    async fn pace(&self) {}
}

/// Backoff window applied after a blocked response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    min: Duration,
    max: Duration,
}

impl BackoffPolicy {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: if max < min { min } else { max },
        }
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Uniform draw from the window; a request with a timeout override waits
    /// exactly that long instead.
    pub fn next_delay(&self, timeout_override: Option<Duration>) -> Duration {
        if let Some(timeout) = timeout_override {
            return timeout;
        }
        if self.max <= self.min {
            return self.min;
        }
        let mut rng = rand::thread_rng();
        Duration::from_secs_f64(rng.gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64()))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(10))
    }
}
