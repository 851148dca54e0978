//! Rolling-window attendance metrics
//!
//! Each window is computed from scratch over the full conversation set.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::entities::ConversationSnapshot;

/// Reporting horizon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricsWindow {
    #[serde(rename = "24h")]
    Last24Hours,
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
}

impl MetricsWindow {
    pub const ALL: [MetricsWindow; 3] = [
        MetricsWindow::Last24Hours,
        MetricsWindow::Last7Days,
        MetricsWindow::Last30Days,
    ];

    pub fn duration(&self) -> Duration {
        match self {
            Self::Last24Hours => Duration::hours(24),
            Self::Last7Days => Duration::days(7),
            Self::Last30Days => Duration::days(30),
        }
    }

    /// First instant covered by the window ending at `now`
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }

    /// Card title on the dashboard
    pub fn label(&self) -> &'static str {
        match self {
            Self::Last24Hours => "Atendimentos 24h",
            Self::Last7Days => "Atendimentos 7 dias",
            Self::Last30Days => "Atendimentos 30 dias",
        }
    }
}

impl std::fmt::Display for MetricsWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Last24Hours => write!(f, "24h"),
            Self::Last7Days => write!(f, "7d"),
            Self::Last30Days => write!(f, "30d"),
        }
    }
}

/// Attendance counts for one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WindowStats {
    pub completed: usize,
    pub uncompleted: usize,
    /// Mean handling time of completed conversations, in whole minutes
    pub average_minutes: i64,
}

impl WindowStats {
    pub fn total(&self) -> usize {
        self.completed + self.uncompleted
    }
}

pub struct AttendanceAggregator;

impl AttendanceAggregator {
    /// Aggregate conversations that started at or after `window_start`.
    ///
    /// Handling time is `last customer message - start`. It is summed in
    /// seconds and rounded to the nearest minute only once, at the mean.
    /// Completed conversations with no customer message are counted but add
    /// no duration.
    pub fn aggregate<'a, I>(conversations: I, window_start: DateTime<Utc>) -> WindowStats
    where
        I: IntoIterator<Item = &'a ConversationSnapshot>,
    {
        let mut stats = WindowStats::default();
        let mut total_seconds: i64 = 0;
        let mut timed: i64 = 0;

        for conversation in conversations {
            if conversation.start_time < window_start {
                continue;
            }

            if conversation.is_open {
                stats.uncompleted += 1;
                continue;
            }

            stats.completed += 1;
            if let Some(last_customer) = conversation.last_customer_message_at {
                total_seconds += (last_customer - conversation.start_time).num_seconds().max(0);
                timed += 1;
            }
        }

        if timed > 0 {
            stats.average_minutes = (total_seconds as f64 / 60.0 / timed as f64).round() as i64;
        }

        stats
    }

    /// Aggregate the window that ends at `now`.
    pub fn aggregate_window<'a, I>(
        conversations: I,
        window: MetricsWindow,
        now: DateTime<Utc>,
    ) -> WindowStats
    where
        I: IntoIterator<Item = &'a ConversationSnapshot>,
    {
        Self::aggregate(conversations, window.start(now))
    }
}
