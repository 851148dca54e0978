//! Reconnect backoff for the change feed
//!
//! Delays grow from `initial_delay` by `backoff_multiplier` after every
//! failure and are capped at `max_delay`. A successful connection resets
//! the sequence. There is no attempt limit: the adapter keeps retrying until
//! it is shut down.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Tracks the delay sequence for one adapter.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    next: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            next: config.initial_delay,
            config,
            failures: 0,
        }
    }

    /// Delay to wait before the next attempt; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next.min(self.config.max_delay);
        let grown = (delay.as_millis() as f64 * self.config.backoff_multiplier) as u64;
        self.next = Duration::from_millis(grown).min(self.config.max_delay);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Consecutive failures since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn reset(&mut self) {
        self.next = self.config.initial_delay;
        self.failures = 0;
    }
}
