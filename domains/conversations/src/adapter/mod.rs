//! Change-feed adapter
//!
//! Keeps the authoritative snapshot set in step with the external store and
//! republishes a complete [`DashboardView`] after every change. Views are
//! published as `Arc`s over a `watch` channel, so subscribers only ever see a
//! whole view and a failed feed leaves the last good one in place.

pub mod clock;
pub mod retry;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use pharmydash_feed::{ChangeEvent, ChangeOperation, ConversationFeed, FeedError, Subscription};

use crate::domain::entities::{ConversationId, ConversationSnapshot};
use crate::domain::view::{DashboardView, MonitorEngine};

pub use clock::{Clock, ManualClock, SystemClock};
pub use retry::{Backoff, RetryConfig};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdapterError {
    #[error("undecodable {table} {operation} payload: {reason}")]
    Decode {
        table: String,
        operation: ChangeOperation,
        reason: String,
    },
}

/// What applying one event did to the snapshot set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Older than what is already stored
    Stale,
    /// The event concerns another table; the set must be re-queried
    ResyncRequired,
}

#[derive(Debug, Clone)]
pub struct AdapterSettings {
    /// Table whose rows are conversation snapshots
    pub table: String,
    /// Re-query interval when the feed cannot push
    pub poll_interval: Duration,
    /// Recompute interval while idle; statuses depend on elapsed time
    pub refresh_interval: Duration,
    /// How far behind the newest commit a delete marker is still kept
    pub tombstone_retention: Duration,
    pub retry: RetryConfig,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            table: "conversations".to_string(),
            poll_interval: Duration::from_secs(30),
            refresh_interval: Duration::from_secs(30),
            tombstone_retention: Duration::from_secs(10 * 60),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    version: Option<DateTime<Utc>>,
    /// `None` marks a delete, kept so older upserts cannot resurrect the row
    snapshot: Option<ConversationSnapshot>,
}

#[derive(Deserialize)]
struct DeletedRecord {
    id: ConversationId,
}

pub struct ChangeFeedAdapter {
    feed: Arc<dyn ConversationFeed>,
    engine: MonitorEngine,
    clock: Arc<dyn Clock>,
    settings: AdapterSettings,
    entries: BTreeMap<ConversationId, Entry>,
    /// Newest `commit_timestamp` applied so far
    high_water: Option<DateTime<Utc>>,
    revision: u64,
    publisher: watch::Sender<Arc<DashboardView>>,
}

impl ChangeFeedAdapter {
    pub fn new(
        feed: Arc<dyn ConversationFeed>,
        engine: MonitorEngine,
        clock: Arc<dyn Clock>,
        settings: AdapterSettings,
    ) -> Self {
        let (publisher, _) = watch::channel(Arc::new(DashboardView::empty(clock.now())));
        Self {
            feed,
            engine,
            clock,
            settings,
            entries: BTreeMap::new(),
            high_water: None,
            revision: 0,
            publisher,
        }
    }

    /// Receive every view published from now on, starting with the current one.
    pub fn subscribe(&self) -> watch::Receiver<Arc<DashboardView>> {
        self.publisher.subscribe()
    }

    /// The most recently published view
    pub fn current_view(&self) -> Arc<DashboardView> {
        self.publisher.borrow().clone()
    }

    /// Live (not deleted) snapshots, ordered by id
    pub fn snapshots(&self) -> impl Iterator<Item = &ConversationSnapshot> {
        self.entries.values().filter_map(|entry| entry.snapshot.as_ref())
    }

    /// Replace the whole snapshot set with freshly queried records.
    ///
    /// Records that do not decode are logged and skipped. A reloaded row keeps
    /// the newest version seen for its id, so an event delayed past the query
    /// cannot roll it back. Returns how many snapshots were loaded.
    pub fn load(&mut self, records: Vec<serde_json::Value>) -> usize {
        let mut entries = BTreeMap::new();

        for record in records {
            match serde_json::from_value::<ConversationSnapshot>(record) {
                Ok(snapshot) => {
                    let version = self.entries.get(&snapshot.id).and_then(|e| e.version);
                    entries.insert(
                        snapshot.id.clone(),
                        Entry {
                            version,
                            snapshot: Some(snapshot),
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable conversation record");
                }
            }
        }

        let loaded = entries.len();
        self.entries = entries;
        loaded
    }

    /// Apply one change event, last write wins per conversation.
    ///
    /// With a `commit_timestamp`, an event older than the stored version is
    /// ignored; without one, arrival order decides. Re-applying an event
    /// leaves the set unchanged. Delete markers are dropped once they fall
    /// `tombstone_retention` behind the newest applied commit.
    pub fn apply(&mut self, event: &ChangeEvent) -> Result<ApplyOutcome, AdapterError> {
        if event.table != self.settings.table {
            return Ok(ApplyOutcome::ResyncRequired);
        }

        let decode_error = |e: serde_json::Error| AdapterError::Decode {
            table: event.table.clone(),
            operation: event.operation,
            reason: e.to_string(),
        };

        let (id, snapshot) = match event.operation {
            ChangeOperation::Insert | ChangeOperation::Update => {
                let snapshot: ConversationSnapshot =
                    serde_json::from_value(event.payload.clone()).map_err(decode_error)?;
                (snapshot.id.clone(), Some(snapshot))
            }
            ChangeOperation::Delete => {
                let deleted: DeletedRecord =
                    serde_json::from_value(event.payload.clone()).map_err(decode_error)?;
                (deleted.id, None)
            }
        };

        let stored_version = self.entries.get(&id).and_then(|entry| entry.version);
        if let (Some(incoming), Some(stored)) = (event.commit_timestamp, stored_version) {
            if incoming < stored {
                tracing::debug!(
                    conversation_id = %id,
                    %incoming,
                    %stored,
                    "Ignoring out-of-date change event"
                );
                return Ok(ApplyOutcome::Stale);
            }
        }

        let version = event.commit_timestamp.or(stored_version);
        if snapshot.is_none() && version.is_none() {
            // Nothing to order a later event against.
            self.entries.remove(&id);
        } else {
            self.entries.insert(id, Entry { version, snapshot });
        }

        if let Some(incoming) = event.commit_timestamp {
            if self.high_water.map_or(true, |newest| incoming > newest) {
                self.high_water = Some(incoming);
                self.prune_tombstones();
            }
        }

        Ok(ApplyOutcome::Applied)
    }

    fn prune_tombstones(&mut self) {
        let Some(newest) = self.high_water else {
            return;
        };
        let Some(cutoff) = chrono::Duration::from_std(self.settings.tombstone_retention)
            .ok()
            .and_then(|retention| newest.checked_sub_signed(retention))
        else {
            return;
        };

        self.entries.retain(|_, entry| {
            entry.snapshot.is_some() || entry.version.is_some_and(|version| version >= cutoff)
        });
    }

    /// Rebuild the view from the full snapshot set and publish it.
    pub fn recompute(&mut self) -> Arc<DashboardView> {
        let now = self.clock.now();
        let mut view = self.engine.evaluate(self.snapshots(), now);

        self.revision += 1;
        view.revision = self.revision;

        tracing::debug!(
            revision = view.revision,
            conversations = view.counts.total,
            active = view.counts.active,
            "Published dashboard view"
        );

        let view = Arc::new(view);
        self.publisher.send_replace(view.clone());
        view
    }

    /// Re-query the store, replace the set and republish.
    pub async fn resync(&mut self) -> Result<usize, FeedError> {
        let records = self.feed.fetch_conversations().await?;
        let loaded = self.load(records);
        self.recompute();
        Ok(loaded)
    }

    /// Drive the adapter until `shutdown` resolves.
    ///
    /// Each session subscribes (when the feed can push), loads the full set,
    /// then follows events or polls. Any feed failure ends the session and a
    /// new one starts after a backoff delay; the published view is left as is.
    pub async fn run<S>(mut self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut backoff = Backoff::new(self.settings.retry.clone());

        tracing::info!(provider = self.feed.provider(), "Change feed adapter started");

        loop {
            let error = tokio::select! {
                _ = &mut shutdown => break,
                error = self.session(&mut backoff) => error,
            };

            let delay = backoff.next_delay();
            tracing::warn!(
                error = %error,
                attempt = backoff.failures(),
                retry_in_ms = delay.as_millis() as u64,
                "Conversation feed failed, keeping last published view"
            );

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Change feed adapter stopped");
    }

    async fn session(&mut self, backoff: &mut Backoff) -> FeedError {
        let subscription = match self.feed.subscribe().await {
            Ok(subscription) => Some(subscription),
            Err(FeedError::Unsupported(reason)) => {
                tracing::info!(%reason, "Feed cannot push, polling instead");
                None
            }
            Err(e) => return e,
        };

        match self.resync().await {
            Ok(loaded) => tracing::info!(loaded, "Loaded conversation snapshot"),
            Err(e) => return e,
        }
        backoff.reset();

        match subscription {
            Some(subscription) => self.follow(subscription).await,
            None => self.poll().await,
        }
    }

    async fn follow(&mut self, mut subscription: Subscription) -> FeedError {
        let mut refresh = tokio::time::interval(self.settings.refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        refresh.tick().await;

        loop {
            tokio::select! {
                item = subscription.next() => match item {
                    Some(Ok(event)) => {
                        if let Err(e) = self.handle_event(&event).await {
                            return e;
                        }
                    }
                    Some(Err(FeedError::Decode(reason))) => {
                        tracing::warn!(%reason, "Skipping malformed change notification");
                    }
                    Some(Err(e)) => return e,
                    None => return FeedError::Closed("subscription ended".to_string()),
                },
                _ = refresh.tick() => {
                    self.recompute();
                }
            }
        }
    }

    async fn poll(&mut self) -> FeedError {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = self.resync().await {
                return e;
            }
        }
    }

    async fn handle_event(&mut self, event: &ChangeEvent) -> Result<(), FeedError> {
        match self.apply(event) {
            Ok(ApplyOutcome::Applied) => {
                self.recompute();
            }
            Ok(ApplyOutcome::Stale) => {}
            Ok(ApplyOutcome::ResyncRequired) => {
                tracing::debug!(table = %event.table, "Change on related table, resyncing");
                self.resync().await?;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Skipping change event");
            }
        }
        Ok(())
    }
}
