//! Common test utilities and fixtures for integration tests
//!
//! Runs a full monitor (mock feed, change-feed adapter, dashboard router)
//! against a manual clock so tests control both data and time.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use pharmydash_common::Config;
use pharmydash_conversations::{
    AdapterSettings, ChangeFeedAdapter, DashboardState, DashboardView, ManualClock, RetryConfig,
};
use pharmydash_feed::mock::MockConversationFeed;
use serde_json::{json, Value};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tower::ServiceExt;

/// Upper bound for anything a test waits on
pub const WAIT_LIMIT: StdDuration = StdDuration::from_secs(5);

/// Fixed instant the fixtures are built around
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 19, 10, 30, 0).unwrap()
}

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    base_time() - Duration::minutes(minutes)
}

/// A conversation row as the store returns it
pub fn conversation(id: &str, customer: &str, started: DateTime<Utc>) -> Value {
    json!({
        "id": id,
        "customer": customer,
        "phone": "5511999999999",
        "start_time": started,
        "messages": [],
        "is_open": true,
    })
}

/// Append a message and keep the denormalised last-message times in step.
pub fn with_message(mut row: Value, origin: &str, content: &str, at: DateTime<Utc>) -> Value {
    row["messages"]
        .as_array_mut()
        .expect("messages array")
        .push(json!({"content": content, "timestamp": at, "origin": origin}));
    let field = match origin {
        "customer" => "last_customer_message_time",
        _ => "last_agent_message_time",
    };
    row[field] = json!(at);
    row
}

pub fn closed(mut row: Value, at: DateTime<Utc>, resolution: &str) -> Value {
    row["is_open"] = json!(false);
    row["closed_at"] = json!(at);
    row["resolution"] = json!(resolution);
    row
}

/// Five conversations covering every dashboard state at `base_time()`
pub fn monitor_sample() -> Vec<Value> {
    vec![
        with_message(
            conversation("1", "Maria Silva", minutes_ago(30)),
            "customer",
            "Gostaria de saber o preço do medicamento",
            minutes_ago(15),
        ),
        with_message(
            with_message(
                with_message(
                    conversation("2", "João Santos", minutes_ago(60)),
                    "customer",
                    "Vocês têm disponível?",
                    minutes_ago(30),
                ),
                "agent",
                "Vou verificar",
                minutes_ago(29),
            ),
            "customer",
            "Alguma novidade?",
            minutes_ago(20),
        ),
        {
            let mut row = with_message(
                with_message(
                    conversation("3", "Ana Oliveira", minutes_ago(15)),
                    "customer",
                    "Tem genérico?",
                    minutes_ago(6),
                ),
                "agent",
                "Temos sim",
                minutes_ago(2),
            );
            row["attended_by"] = json!("Carlos");
            row
        },
        closed(
            with_message(
                conversation("4", "Pedro Costa", minutes_ago(150)),
                "customer",
                "Compra finalizada com sucesso",
                minutes_ago(105),
            ),
            minutes_ago(105),
            "sale",
        ),
        with_message(
            conversation("5", "Lucas Lima", base_time() - Duration::hours(37)),
            "customer",
            "Oi?",
            base_time() - Duration::hours(37),
        ),
    ]
}

pub fn config(vars: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|key| vars.get(key).cloned()).expect("valid test config")
}

/// Fast timings so reconnects and polls happen within a test
pub fn fast_settings() -> AdapterSettings {
    AdapterSettings {
        poll_interval: StdDuration::from_millis(20),
        refresh_interval: StdDuration::from_secs(3600),
        retry: RetryConfig {
            initial_delay: StdDuration::from_millis(10),
            max_delay: StdDuration::from_millis(40),
            backoff_multiplier: 2.0,
        },
        ..AdapterSettings::default()
    }
}

/// A running monitor wired to a mock feed
pub struct TestMonitor {
    pub feed: MockConversationFeed,
    pub clock: ManualClock,
    pub views: watch::Receiver<Arc<DashboardView>>,
    pub app: Router,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TestMonitor {
    pub fn start(feed: MockConversationFeed) -> Self {
        Self::start_with(feed, &config(&[]), fast_settings())
    }

    pub fn start_with(feed: MockConversationFeed, config: &Config, settings: AdapterSettings) -> Self {
        let clock = ManualClock::new(base_time());
        let adapter = ChangeFeedAdapter::new(
            Arc::new(feed.clone()),
            pharmydash_app::build_engine(config),
            Arc::new(clock.clone()),
            settings,
        );

        let views = adapter.subscribe();
        let app = pharmydash_app::create_app(DashboardState::new(adapter.subscribe()));

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(adapter.run(async {
            let _ = stopped.await;
        }));

        Self {
            feed,
            clock,
            views,
            app,
            stop: Some(stop),
            task: Some(task),
        }
    }

    /// Wait until a published view satisfies `predicate`.
    pub async fn wait_for<F>(&mut self, predicate: F) -> Arc<DashboardView>
    where
        F: Fn(&DashboardView) -> bool,
    {
        let views = &mut self.views;
        tokio::time::timeout(WAIT_LIMIT, async {
            loop {
                {
                    let view = views.borrow_and_update();
                    if predicate(&view) {
                        return view.clone();
                    }
                }
                views.changed().await.expect("adapter dropped its publisher");
            }
        })
        .await
        .expect("timed out waiting for dashboard view")
    }

    /// Wait for the first full load.
    pub async fn loaded(&mut self) -> Arc<DashboardView> {
        self.wait_for(|view| view.revision > 0).await
    }

    /// Wait until the feed has been queried at least `count` times.
    pub async fn wait_for_fetches(&self, count: usize) {
        tokio::time::timeout(WAIT_LIMIT, async {
            while self.feed.fetch_count() < count {
                tokio::time::sleep(StdDuration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for feed queries");
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    /// Stop the adapter and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            tokio::time::timeout(WAIT_LIMIT, task)
                .await
                .expect("adapter did not stop")
                .expect("adapter task panicked");
        }
    }
}

impl Drop for TestMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
