//! End-to-end monitor tests: feed records in, dashboard JSON out

use std::time::Duration as StdDuration;

use axum::http::StatusCode;
use chrono::Duration;
use pharmydash_conversations::{AdapterSettings, Status};
use pharmydash_feed::mock::MockConversationFeed;
use pharmydash_feed::{ChangeEvent, ChangeOperation};
use serde_json::json;

use crate::common::*;

fn sample_feed() -> MockConversationFeed {
    let feed = MockConversationFeed::new();
    feed.set_records(monitor_sample());
    feed
}

fn refreshing_settings() -> AdapterSettings {
    AdapterSettings {
        refresh_interval: StdDuration::from_millis(20),
        ..fast_settings()
    }
}

fn update(row: serde_json::Value) -> ChangeEvent {
    ChangeEvent::new("conversations", ChangeOperation::Update, row)
}

#[test_log::test(tokio::test)]
async fn test_dashboard_reflects_loaded_conversations() {
    let mut monitor = TestMonitor::start(sample_feed());
    monitor.loaded().await;

    let (status, body) = monitor.get("/v1/dashboard").await;
    assert_eq!(status, StatusCode::OK);

    let statuses: Vec<(&str, &str)> = body["conversations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| (c["id"].as_str().unwrap(), c["status"].as_str().unwrap()))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("1", "unresponded"),
            ("2", "unresponded"),
            ("3", "waiting"),
            ("4", "closed"),
            ("5", "unresponded"),
        ]
    );

    assert_eq!(body["counts"]["total"], 5);
    assert_eq!(body["counts"]["reset"], 1);
    assert_eq!(body["headline"]["completed"], 1);
    assert_eq!(body["headline"]["uncompleted"], 3);
    assert_eq!(body["headline"]["average_minutes"], 45);

    let (_, active) = monitor.get("/v1/dashboard/active").await;
    let ids: Vec<&str> = active["conversations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["2", "1", "3"]);

    monitor.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn test_agent_reply_moves_conversation_to_waiting() {
    let mut monitor = TestMonitor::start(sample_feed());
    monitor.loaded().await;

    let replied = with_message(
        monitor_sample().remove(0),
        "agent",
        "O medicamento custa R$ 25,90",
        minutes_ago(1),
    );
    monitor.feed.push_event(update(replied));

    let view = monitor
        .wait_for(|v| v.conversation("1").map(|c| c.status) == Some(Status::Waiting))
        .await;
    let maria = view.conversation("1").unwrap();
    assert_eq!(maria.wait_minutes, 0);
    assert_eq!(maria.last_message.as_deref(), Some("O medicamento custa R$ 25,90"));

    let (status, body) = monitor.get("/v1/dashboard/conversations/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status_label"], "Aguardando");

    monitor.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn test_customer_sign_off_reads_as_closed() {
    let mut monitor = TestMonitor::start(sample_feed());
    monitor.loaded().await;

    let signed_off = with_message(
        monitor_sample().remove(1),
        "customer",
        "Muito obrigada!",
        minutes_ago(1),
    );
    monitor.feed.push_event(update(signed_off));

    let view = monitor
        .wait_for(|v| v.conversation("2").map(|c| c.status) == Some(Status::Closed))
        .await;
    assert_eq!(view.counts.open, 4);
    assert_eq!(view.counts.by_status.get(&Status::Closed), Some(&2));

    monitor.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn test_time_passing_flips_status_without_feed_activity() {
    let feed = MockConversationFeed::new();
    feed.set_records(vec![with_message(
        conversation("10", "Beatriz Souza", minutes_ago(3)),
        "customer",
        "Vocês entregam?",
        minutes_ago(2),
    )]);
    let mut monitor = TestMonitor::start_with(feed, &config(&[]), refreshing_settings());

    let view = monitor.loaded().await;
    assert_eq!(view.conversation("10").unwrap().status, Status::Active);

    monitor.clock.advance(Duration::minutes(10));

    let view = monitor
        .wait_for(|v| v.conversation("10").map(|c| c.status) == Some(Status::Unresponded))
        .await;
    assert_eq!(view.conversation("10").unwrap().wait_minutes, 12);
    assert_eq!(monitor.feed.fetch_count(), 1);

    monitor.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn test_abandoned_conversations_leave_the_active_list() {
    let mut monitor = TestMonitor::start_with(sample_feed(), &config(&[]), refreshing_settings());
    monitor.loaded().await;

    monitor.clock.advance(Duration::hours(36));

    let view = monitor.wait_for(|v| v.active.is_empty()).await;
    assert_eq!(view.counts.open, 4);
    assert_eq!(view.counts.reset, 4);

    let (_, body) = monitor.get("/v1/dashboard/active").await;
    assert_eq!(body["conversations"], json!([]));

    monitor.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn test_configured_thresholds_apply() {
    let feed = MockConversationFeed::new();
    feed.set_records(vec![
        with_message(
            conversation("20", "Rafael Alves", minutes_ago(4)),
            "customer",
            "Boa tarde",
            minutes_ago(3),
        ),
        with_message(
            conversation("21", "Julia Rocha", minutes_ago(4)),
            "customer",
            "Até mais",
            minutes_ago(3),
        ),
    ]);
    let config = config(&[
        ("UNRESPONDED_AFTER_SECS", "120"),
        ("CLOSING_KEYWORDS", "até mais"),
    ]);
    let mut monitor = TestMonitor::start_with(feed, &config, fast_settings());

    let view = monitor.loaded().await;
    assert_eq!(view.conversation("20").unwrap().status, Status::Unresponded);
    assert_eq!(view.conversation("21").unwrap().status, Status::Closed);

    monitor.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn test_deleted_conversation_is_not_found() {
    let mut monitor = TestMonitor::start(sample_feed());
    monitor.loaded().await;

    monitor.feed.push_event(ChangeEvent::new(
        "conversations",
        ChangeOperation::Delete,
        json!({"id": 4}),
    ));
    monitor.wait_for(|v| v.counts.total == 4).await;

    let (status, body) = monitor.get("/v1/dashboard/conversations/4").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (_, metrics) = monitor.get("/v1/dashboard/metrics?window=24h").await;
    assert_eq!(metrics["windows"][0]["completed"], 0);
    assert_eq!(metrics["windows"][0]["average_minutes"], 0);

    monitor.shutdown().await;
}

mod common;
