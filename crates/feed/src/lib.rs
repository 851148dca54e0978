//! PharmyDash Conversation Feed
//!
//! Read-only access to the external conversation store with support for:
//! - Postgres snapshot queries plus LISTEN/NOTIFY change events
//! - REST (PostgREST-style) polling when no push channel exists
//! - Mock feed for testing and development

pub mod mock;
pub mod postgres;
pub mod rest;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Buffered change events per subscription before the listener applies backpressure.
pub const EVENT_BUFFER: usize = 256;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("Feed configuration error: {0}")]
    Configuration(String),

    #[error("Feed request error: {0}")]
    Request(String),

    #[error("Feed response error: {0}")]
    Response(String),

    #[error("Feed decode error: {0}")]
    Decode(String),

    #[error("Feed operation unsupported: {0}")]
    Unsupported(String),

    #[error("Feed closed: {0}")]
    Closed(String),
}

/// Kind of change carried by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// A change notification emitted by the store.
///
/// For deletes the payload is the old row (at least its `id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub operation: ChangeOperation,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<DateTime<Utc>>,
}

impl ChangeEvent {
    pub fn new(table: impl Into<String>, operation: ChangeOperation, payload: serde_json::Value) -> Self {
        Self {
            table: table.into(),
            operation,
            payload,
            commit_timestamp: None,
        }
    }

    pub fn at(mut self, commit_timestamp: DateTime<Utc>) -> Self {
        self.commit_timestamp = Some(commit_timestamp);
        self
    }
}

/// A live stream of change events.
///
/// Dropping the subscription stops the listener task and releases its
/// connection to the store.
pub struct Subscription {
    events: mpsc::Receiver<Result<ChangeEvent, FeedError>>,
    listener: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        events: mpsc::Receiver<Result<ChangeEvent, FeedError>>,
        listener: Option<JoinHandle<()>>,
    ) -> Self {
        Self { events, listener }
    }

    /// Wait for the next event. `None` means the feed side hung up.
    pub async fn next(&mut self) -> Option<Result<ChangeEvent, FeedError>> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

/// Feed configuration.
#[derive(Clone)]
pub struct FeedConfig {
    /// Feed provider (postgres, rest, mock)
    pub provider: String,
    /// Postgres connection URL for the postgres provider
    pub database_url: Option<String>,
    /// Base URL of the REST endpoint for the rest provider
    pub rest_url: Option<String>,
    /// API key sent to the REST endpoint
    pub api_key: Option<String>,
    /// NOTIFY channel carrying change events
    pub channel: String,
    /// Conversation table name
    pub table: String,
}

impl std::fmt::Debug for FeedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedConfig")
            .field("provider", &self.provider)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("rest_url", &self.rest_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("channel", &self.channel)
            .field("table", &self.table)
            .finish()
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            database_url: None,
            rest_url: None,
            api_key: None,
            channel: "conversation_changes".to_string(),
            table: "conversations".to_string(),
        }
    }
}

impl FeedConfig {
    /// Create feed config from environment variables.
    pub fn from_env() -> Result<Self, FeedError> {
        let defaults = Self::default();

        let config = Self {
            provider: std::env::var("FEED_PROVIDER").unwrap_or(defaults.provider),
            database_url: std::env::var("DATABASE_URL").ok(),
            rest_url: std::env::var("FEED_REST_URL").ok(),
            api_key: std::env::var("FEED_API_KEY").ok(),
            channel: std::env::var("FEED_CHANNEL").unwrap_or(defaults.channel),
            table: std::env::var("FEED_TABLE").unwrap_or(defaults.table),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check provider requirements and identifier safety.
    pub fn validate(&self) -> Result<(), FeedError> {
        if !is_identifier(&self.table) {
            return Err(FeedError::Configuration(format!(
                "FEED_TABLE must be a plain identifier, got: {}",
                self.table
            )));
        }
        if !is_identifier(&self.channel) {
            return Err(FeedError::Configuration(format!(
                "FEED_CHANNEL must be a plain identifier, got: {}",
                self.channel
            )));
        }

        match self.provider.as_str() {
            "postgres" if self.database_url.as_deref().unwrap_or("").is_empty() => Err(
                FeedError::Configuration("DATABASE_URL is required for postgres provider".to_string()),
            ),
            "rest" if self.rest_url.as_deref().unwrap_or("").is_empty() => Err(
                FeedError::Configuration("FEED_REST_URL is required for rest provider".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !value.starts_with(|c: char| c.is_ascii_digit())
}

/// Conversation data source trait for different implementations.
#[async_trait::async_trait]
pub trait ConversationFeed: Send + Sync {
    /// Provider name, for diagnostics.
    fn provider(&self) -> &'static str;

    /// Query the current conversation set, each record with its messages nested.
    async fn fetch_conversations(&self) -> Result<Vec<serde_json::Value>, FeedError>;

    /// Open a change subscription. Returns `FeedError::Unsupported` when the
    /// source can only be polled.
    async fn subscribe(&self) -> Result<Subscription, FeedError>;
}

/// Factory for creating ConversationFeed implementations.
pub struct FeedServiceFactory;

impl FeedServiceFactory {
    /// Create a ConversationFeed based on configuration.
    pub async fn create(config: FeedConfig) -> Result<Box<dyn ConversationFeed>, FeedError> {
        config.validate()?;

        match config.provider.as_str() {
            "postgres" => {
                tracing::info!(channel = %config.channel, "Creating Postgres conversation feed");
                Ok(Box::new(postgres::PgConversationFeed::connect(&config).await?))
            }
            "rest" => {
                tracing::info!(table = %config.table, "Creating REST polling conversation feed");
                Ok(Box::new(rest::RestConversationFeed::new(&config)?))
            }
            "mock" => {
                tracing::info!("Creating mock conversation feed");
                Ok(Box::new(mock::MockConversationFeed::new()))
            }
            provider => Err(FeedError::Configuration(format!(
                "Unknown feed provider: {}. Supported providers: postgres, rest, mock",
                provider
            ))),
        }
    }
}
