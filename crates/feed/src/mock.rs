//! Mock Conversation Feed Implementation
//!
//! Serves in-memory records and lets tests push change events or inject
//! failures. Thread-safe via `Arc<Mutex<>>`.

use crate::{ChangeEvent, ConversationFeed, FeedError, Subscription, EVENT_BUFFER};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

type EventSender = mpsc::Sender<Result<ChangeEvent, FeedError>>;

/// Mock feed that records calls and replays scripted data.
#[derive(Debug, Clone)]
pub struct MockConversationFeed {
    records: Arc<Mutex<Vec<serde_json::Value>>>,
    subscribers: Arc<Mutex<Vec<EventSender>>>,
    failing_fetches: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
    fetch_count: Arc<AtomicUsize>,
    push_supported: bool,
}

impl MockConversationFeed {
    /// Create a new, empty mock feed with push support.
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            failing_fetches: Arc::new(AtomicUsize::new(0)),
            unavailable: Arc::new(AtomicBool::new(false)),
            fetch_count: Arc::new(AtomicUsize::new(0)),
            push_supported: true,
        }
    }

    /// Create a mock feed that only supports polling.
    pub fn polling_only() -> Self {
        Self {
            push_supported: false,
            ..Self::new()
        }
    }

    /// Replace the records returned by `fetch_conversations`.
    pub fn set_records(&self, records: Vec<serde_json::Value>) {
        *self
            .records
            .lock()
            .expect("records lock poisoned: prior test panicked") = records;
    }

    /// Make the next `count` fetches fail with a request error.
    pub fn fail_next_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    /// Fail every fetch until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `fetch_conversations` calls, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Number of subscriptions still listening.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .expect("subscribers lock poisoned: prior test panicked");
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    /// Deliver an event to every live subscription. Returns how many received it.
    pub fn push_event(&self, event: ChangeEvent) -> usize {
        self.broadcast(Ok(event))
    }

    /// Deliver an error to every live subscription.
    pub fn push_error(&self, error: FeedError) -> usize {
        self.broadcast(Err(error))
    }

    /// Hang up on every subscription, as a dropped connection would.
    pub fn disconnect_subscribers(&self) {
        self.subscribers
            .lock()
            .expect("subscribers lock poisoned: prior test panicked")
            .clear();
    }

    fn broadcast(&self, item: Result<ChangeEvent, FeedError>) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .expect("subscribers lock poisoned: prior test panicked");
        subscribers.retain(|tx| !tx.is_closed());
        subscribers
            .iter()
            .filter(|tx| tx.try_send(item.clone()).is_ok())
            .count()
    }
}

impl Default for MockConversationFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConversationFeed for MockConversationFeed {
    fn provider(&self) -> &'static str {
        "mock"
    }

    async fn fetch_conversations(&self) -> Result<Vec<serde_json::Value>, FeedError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FeedError::Request("mock store unavailable".to_string()));
        }

        let remaining = self.failing_fetches.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_fetches.store(remaining - 1, Ordering::SeqCst);
            tracing::debug!(remaining = remaining - 1, "Mock feed: failing fetch");
            return Err(FeedError::Request("mock fetch failure".to_string()));
        }

        let records = self
            .records
            .lock()
            .map_err(|e| FeedError::Request(format!("records lock poisoned: {e}")))?
            .clone();
        tracing::debug!(count = records.len(), "Mock feed: serving records");
        Ok(records)
    }

    async fn subscribe(&self) -> Result<Subscription, FeedError> {
        if !self.push_supported {
            return Err(FeedError::Unsupported(
                "mock feed configured for polling only".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        self.subscribers
            .lock()
            .map_err(|e| FeedError::Request(format!("subscribers lock poisoned: {e}")))?
            .push(tx);
        tracing::debug!("Mock feed: subscription opened");
        Ok(Subscription::new(rx, None))
    }
}
