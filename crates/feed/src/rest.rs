//! REST Conversation Feed
//!
//! Polls a PostgREST-style endpoint at `{rest_url}/rest/v1/{table}` with
//! messages embedded. There is no push channel; the adapter falls back to
//! polling on a fixed interval.

use crate::{ConversationFeed, FeedConfig, FeedError, Subscription};

/// HTTP polling feed.
pub struct RestConversationFeed {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl RestConversationFeed {
    /// Create a new REST feed from configuration.
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let base_url = config.rest_url.as_deref().ok_or_else(|| {
            FeedError::Configuration("FEED_REST_URL is required for rest provider".to_string())
        })?;

        let endpoint = format!(
            "{}/rest/v1/{}",
            base_url.trim_end_matches('/'),
            config.table
        );

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait::async_trait]
impl ConversationFeed for RestConversationFeed {
    fn provider(&self) -> &'static str {
        "rest"
    }

    async fn fetch_conversations(&self) -> Result<Vec<serde_json::Value>, FeedError> {
        let mut request = self
            .http
            .get(&self.endpoint)
            .query(&[("select", "*,messages(*)")]);

        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read response body".to_string());
            return Err(FeedError::Response(format!(
                "Conversation endpoint returned {}: {}",
                status, body
            )));
        }

        let records = response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()))?;

        tracing::debug!(count = records.len(), "Fetched conversation snapshot over REST");
        Ok(records)
    }

    async fn subscribe(&self) -> Result<Subscription, FeedError> {
        Err(FeedError::Unsupported(
            "REST feed has no push channel".to_string(),
        ))
    }
}
