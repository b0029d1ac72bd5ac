//! Retrying invoker for fallible remote calls.
//!
//! Every call to the ranking and email-discovery capabilities goes through
//! one [`BackoffExecutor`] rather than ad hoc per-caller retry loops.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::remote::RemoteError;

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Retries after the initial attempt (0 = try once).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Delay cap.
    pub max_delay: Duration,
    /// Exponential growth factor.
    pub multiplier: f64,
    /// Uniform jitter fraction applied to each delay (0.2 = ±20%).
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl BackoffConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Raw (pre-jitter) delay before the retry following `attempt`
    /// (0-indexed): `min(max_delay, initial_delay * multiplier^attempt)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let delay_ms = (base_ms * self.multiplier.powi(attempt as i32)).min(max_ms);
        Duration::from_millis(delay_ms as u64)
    }

    /// Apply uniform ±`jitter` to a base delay, avoiding synchronized retry
    /// storms across concurrent dispatches.
    pub fn jittered(&self, base: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = 1.0 + rand::rng().random_range(-self.jitter..=self.jitter);
        Duration::from_millis((base.as_millis() as f64 * factor).max(0.0) as u64)
    }
}

/// Generic retrying invoker for any fallible remote call.
///
/// Retries only transient failures ([`RemoteError::is_transient`]); permanent
/// rejections and exhausted budgets surface the last error to the caller.
#[derive(Debug, Clone, Default)]
pub struct BackoffExecutor {
    config: BackoffConfig,
}

impl BackoffExecutor {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Invoke `op`, retrying transient failures with jittered exponential
    /// backoff until success or `max_retries` is exhausted.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt, "remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.jittered(self.config.delay_for_attempt(attempt));
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient remote failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
