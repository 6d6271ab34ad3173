//! Exponential backoff for live subscriptions.
//!
//! When a job's socket drops while the job is still running, the
//! subscription waits [`ReconnectConfig::initial_delay`], then twice as
//! long after each further failure, until either a connection succeeds,
//! the attempt budget runs out or the subscription is cancelled.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Consecutive failed attempts before giving up. `0` never reconnects.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Backoff state for one subscription.
#[derive(Debug)]
pub struct Backoff {
    config: ReconnectConfig,
    delay: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            delay: config.initial_delay,
            config,
            attempts: 0,
        }
    }

    /// Number of retries consumed since the last successful connection.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Forget earlier failures after a successful connection.
    pub fn reset(&mut self) {
        self.delay = self.config.initial_delay;
        self.attempts = 0;
    }

    /// Wait before the next attempt.
    ///
    /// Returns `false` without waiting when the attempt budget is spent, or
    /// as soon as `cancel` fires.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        if self.attempts >= self.config.max_attempts {
            return false;
        }
        self.attempts += 1;

        let delay = self.delay;
        self.delay = next_delay(delay, &self.config);

        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
