//! Reset policy for abandoned conversations
//!
//! A conversation that started long enough ago is dropped from operational
//! lists whatever its status, even while the store still reports it open.

use chrono::{DateTime, Duration, Utc};

/// Default age, in hours, at which a conversation is reset.
pub const DEFAULT_RESET_AFTER_HOURS: i64 = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub reset_after: Duration,
}

impl StalenessPolicy {
    pub fn new(reset_after: Duration) -> Self {
        Self { reset_after }
    }

    /// True once `now - start_time` reaches the reset age.
    pub fn should_reset(&self, start_time: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - start_time >= self.reset_after
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_RESET_AFTER_HOURS))
    }
}
