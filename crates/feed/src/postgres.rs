//! Postgres Conversation Feed
//!
//! Snapshot queries nest each conversation's messages as JSON. Change events
//! arrive over LISTEN/NOTIFY: a trigger on the conversation and message
//! tables is expected to `pg_notify` the configured channel with a JSON
//! [`ChangeEvent`](crate::ChangeEvent) payload.

use crate::{ChangeEvent, ConversationFeed, FeedConfig, FeedError, Subscription, EVENT_BUFFER};
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use tokio::sync::mpsc;

const MAX_CONNECTIONS: u32 = 5;

/// Postgres-backed feed.
#[derive(Clone)]
pub struct PgConversationFeed {
    pool: PgPool,
    channel: String,
    snapshot_query: String,
}

impl PgConversationFeed {
    /// Connect a pool using the configured `database_url`.
    pub async fn connect(config: &FeedConfig) -> Result<Self, FeedError> {
        let url = config.database_url.as_deref().ok_or_else(|| {
            FeedError::Configuration("DATABASE_URL is required for postgres provider".to_string())
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await
            .map_err(|e| FeedError::Request(format!("failed to connect to database: {e}")))?;

        Ok(Self::new(pool, &config.channel, &config.table))
    }

    /// Wrap an existing pool. `table` and `channel` must already be validated identifiers.
    pub fn new(pool: PgPool, channel: &str, table: &str) -> Self {
        Self {
            pool,
            channel: channel.to_string(),
            snapshot_query: snapshot_query(table),
        }
    }
}

fn snapshot_query(table: &str) -> String {
    format!(
        r#"
        SELECT to_jsonb(c) || jsonb_build_object(
            'messages',
            COALESCE(
                (SELECT jsonb_agg(to_jsonb(m) ORDER BY m."timestamp")
                 FROM messages m
                 WHERE m.conversation_id = c.id),
                '[]'::jsonb
            )
        ) AS record
        FROM "{table}" c
        ORDER BY c.start_time
        "#
    )
}

#[async_trait::async_trait]
impl ConversationFeed for PgConversationFeed {
    fn provider(&self) -> &'static str {
        "postgres"
    }

    async fn fetch_conversations(&self) -> Result<Vec<serde_json::Value>, FeedError> {
        let records = sqlx::query_scalar::<_, serde_json::Value>(&self.snapshot_query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;

        tracing::debug!(count = records.len(), "Fetched conversation snapshot from Postgres");
        Ok(records)
    }

    async fn subscribe(&self) -> Result<Subscription, FeedError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| FeedError::Request(format!("failed to open listener: {e}")))?;
        listener
            .listen(&self.channel)
            .await
            .map_err(|e| FeedError::Request(format!("failed to LISTEN {}: {e}", self.channel)))?;

        tracing::info!(channel = %self.channel, "Listening for conversation changes");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let handle = tokio::spawn(async move {
            loop {
                // Ok(None): connection dropped, notifications may be missing.
                let item = match listener.try_recv().await {
                    Ok(Some(notification)) => {
                        serde_json::from_str::<ChangeEvent>(notification.payload())
                            .map_err(|e| FeedError::Decode(e.to_string()))
                    }
                    Ok(None) => {
                        let _ = tx
                            .send(Err(FeedError::Closed(
                                "listener connection lost".to_string(),
                            )))
                            .await;
                        break;
                    }
                    Err(e) => {
                        let _ = tx.send(Err(FeedError::Request(e.to_string()))).await;
                        break;
                    }
                };

                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(rx, Some(handle)))
    }
}
