//! PharmyDash application composition root
//!
//! Wires the conversation feed, the change-feed adapter and the dashboard
//! routes into a single application.

use axum::Router;
use chrono::Duration;
use pharmydash_common::config::DEFAULT_RUST_LOG;
use pharmydash_common::Config;
use pharmydash_conversations::{
    AdapterSettings, ChangeFeedAdapter, ClassifierPolicy, DashboardState, MonitorEngine,
    StalenessPolicy, StatusClassifier, SystemClock, DEFAULT_CLOSING_KEYWORDS,
};
use pharmydash_feed::{FeedConfig, FeedServiceFactory};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Log filter from the configured `RUST_LOG`, falling back to the default
/// when the directives do not parse.
pub fn log_filter(rust_log: &str) -> EnvFilter {
    EnvFilter::try_new(rust_log).unwrap_or_else(|e| {
        eprintln!("Ignoring invalid RUST_LOG {rust_log:?}: {e}");
        EnvFilter::new(DEFAULT_RUST_LOG)
    })
}

/// Build the classification and reporting engine from configuration
pub fn build_engine(config: &Config) -> MonitorEngine {
    let unresponded_after = Duration::seconds(config.unresponded_after_secs);
    let policy = match &config.closing_keywords {
        Some(keywords) => ClassifierPolicy::new(unresponded_after, keywords),
        None => ClassifierPolicy::new(unresponded_after, DEFAULT_CLOSING_KEYWORDS),
    };

    MonitorEngine::new(
        StatusClassifier::new(policy),
        StalenessPolicy::new(Duration::hours(config.reset_after_hours)),
    )
}

/// Adapter timing derived from configuration
pub fn adapter_settings(config: &Config, feed_config: &FeedConfig) -> AdapterSettings {
    AdapterSettings {
        table: feed_config.table.clone(),
        poll_interval: std::time::Duration::from_secs(config.poll_interval_secs),
        refresh_interval: std::time::Duration::from_secs(config.refresh_interval_secs),
        ..AdapterSettings::default()
    }
}

/// Connect the configured feed and build the adapter that drives the dashboard
pub async fn create_monitor(
    config: &Config,
    feed_config: FeedConfig,
) -> Result<ChangeFeedAdapter, anyhow::Error> {
    let settings = adapter_settings(config, &feed_config);
    let feed = FeedServiceFactory::create(feed_config).await?;

    tracing::info!(
        provider = feed.provider(),
        table = %settings.table,
        "Conversation feed ready"
    );

    Ok(ChangeFeedAdapter::new(
        Arc::from(feed),
        build_engine(config),
        Arc::new(SystemClock),
        settings,
    ))
}

/// Create the main application router with all routes
pub fn create_app(state: DashboardState) -> Router {
    Router::new()
        .route("/health", axum::routing::get(health_check))
        .route(
            "/",
            axum::routing::get(|| async { "PharmyDash Monitor v0.0.1-SNAPSHOT" }),
        )
        .merge(pharmydash_conversations::routes().with_state(state))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
