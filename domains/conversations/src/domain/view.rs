//! Dashboard view assembly
//!
//! `MonitorEngine` runs the classifier, the reset policy and the aggregator
//! over one snapshot set against a single `now`, producing an immutable
//! `DashboardView`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::entities::{ConversationId, ConversationSnapshot};
use super::metrics::{AttendanceAggregator, MetricsWindow, WindowStats};
use super::staleness::StalenessPolicy;
use super::status::{wait_minutes, Status, StatusClassifier};

/// One conversation as the dashboard shows it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationView {
    pub id: ConversationId,
    pub customer: String,
    pub phone: String,
    pub status: Status,
    pub status_label: String,
    pub wait_minutes: i64,
    pub last_message: Option<String>,
    pub attended_by: Option<String>,
    pub start_time: DateTime<Utc>,
    /// Old enough to be dropped from operational lists
    pub reset: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewCounts {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    /// Size of the active list
    pub active: usize,
    /// Open conversations hidden by the reset policy
    pub reset: usize,
    pub by_status: BTreeMap<Status, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowReport {
    pub window: MetricsWindow,
    pub label: String,
    #[serde(flatten)]
    pub stats: WindowStats,
}

/// Everything the dashboard renders, computed in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    /// Bumped by the publisher on every recompute; 0 before the first load
    pub revision: u64,
    pub generated_at: DateTime<Utc>,
    /// Every known conversation, ordered by id
    pub conversations: Vec<ConversationView>,
    /// Open, not reset, ordered by start time
    pub active: Vec<ConversationView>,
    pub counts: ViewCounts,
    pub windows: Vec<WindowReport>,
    /// 24h stats for the headline card
    pub headline: WindowStats,
}

impl DashboardView {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            revision: 0,
            generated_at: now,
            conversations: Vec::new(),
            active: Vec::new(),
            counts: ViewCounts::default(),
            windows: Vec::new(),
            headline: WindowStats::default(),
        }
    }

    pub fn conversation(&self, id: &str) -> Option<&ConversationView> {
        self.conversations
            .binary_search_by(|c| c.id.as_str().cmp(id))
            .ok()
            .map(|index| &self.conversations[index])
    }

    pub fn window(&self, window: MetricsWindow) -> Option<&WindowStats> {
        self.windows
            .iter()
            .find(|report| report.window == window)
            .map(|report| &report.stats)
    }
}

/// Classifier, reset policy and reporting windows bundled for one pass.
#[derive(Debug, Clone)]
pub struct MonitorEngine {
    classifier: StatusClassifier,
    staleness: StalenessPolicy,
    windows: Vec<MetricsWindow>,
}

impl Default for MonitorEngine {
    fn default() -> Self {
        Self::new(StatusClassifier::default(), StalenessPolicy::default())
    }
}

impl MonitorEngine {
    pub fn new(classifier: StatusClassifier, staleness: StalenessPolicy) -> Self {
        Self {
            classifier,
            staleness,
            windows: MetricsWindow::ALL.to_vec(),
        }
    }

    pub fn with_windows(mut self, windows: impl IntoIterator<Item = MetricsWindow>) -> Self {
        self.windows = windows.into_iter().collect();
        self
    }

    pub fn classifier(&self) -> &StatusClassifier {
        &self.classifier
    }

    pub fn staleness(&self) -> &StalenessPolicy {
        &self.staleness
    }

    /// Build the full view from scratch.
    pub fn evaluate<'a, I>(&self, conversations: I, now: DateTime<Utc>) -> DashboardView
    where
        I: IntoIterator<Item = &'a ConversationSnapshot>,
    {
        let mut snapshots: Vec<&ConversationSnapshot> = conversations.into_iter().collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));

        let mut counts = ViewCounts {
            total: snapshots.len(),
            ..ViewCounts::default()
        };
        let mut views = Vec::with_capacity(snapshots.len());

        for snapshot in &snapshots {
            let status = self.classifier.classify(snapshot, now);
            let reset = self.staleness.should_reset(snapshot.start_time, now);

            if snapshot.is_open {
                counts.open += 1;
                if reset {
                    counts.reset += 1;
                }
            } else {
                counts.closed += 1;
            }
            *counts.by_status.entry(status).or_insert(0) += 1;

            views.push(ConversationView {
                id: snapshot.id.clone(),
                customer: snapshot.customer_name.clone(),
                phone: snapshot.phone.clone(),
                status,
                status_label: status.label().to_string(),
                wait_minutes: wait_minutes(snapshot, now),
                last_message: snapshot.last_message().map(|m| m.content.clone()),
                attended_by: snapshot.attended_by.clone(),
                start_time: snapshot.start_time,
                reset,
            });
        }

        let mut active: Vec<ConversationView> = snapshots
            .iter()
            .zip(&views)
            .filter(|(snapshot, view)| snapshot.is_open && !view.reset)
            .map(|(_, view)| view.clone())
            .collect();
        active.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        counts.active = active.len();

        let windows = self
            .windows
            .iter()
            .map(|&window| WindowReport {
                window,
                label: window.label().to_string(),
                stats: AttendanceAggregator::aggregate_window(
                    snapshots.iter().copied(),
                    window,
                    now,
                ),
            })
            .collect();

        let headline = AttendanceAggregator::aggregate_window(
            snapshots.iter().copied(),
            MetricsWindow::Last24Hours,
            now,
        );

        DashboardView {
            revision: 0,
            generated_at: now,
            conversations: views,
            active,
            counts,
            windows,
            headline,
        }
    }
}
