//! Change-feed behaviour under outages, reordering and polling

use axum::http::StatusCode;
use chrono::Duration;
use pharmydash_conversations::Status;
use pharmydash_feed::mock::MockConversationFeed;
use pharmydash_feed::{ChangeEvent, ChangeOperation, FeedError};
use serde_json::json;

use crate::common::*;

fn event(operation: ChangeOperation, row: serde_json::Value) -> ChangeEvent {
    ChangeEvent::new("conversations", operation, row)
}

#[test_log::test(tokio::test)]
async fn test_feed_outage_keeps_last_view() {
    let feed = MockConversationFeed::new();
    feed.set_records(monitor_sample());
    let mut monitor = TestMonitor::start(feed);
    let before = monitor.loaded().await;
    assert_eq!(monitor.feed.fetch_count(), 1);

    monitor
        .feed
        .set_records(vec![conversation("6", "Fernanda Dias", minutes_ago(1))]);
    monitor.feed.set_unavailable(true);
    monitor.feed.disconnect_subscribers();

    // Three failed reconnects, each one leaving the last good view in place.
    monitor.wait_for_fetches(4).await;
    let (status, body) = monitor.get("/v1/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counts"]["total"], 5);
    assert_eq!(body["revision"], before.revision);

    monitor.feed.set_unavailable(false);

    let after = monitor.wait_for(|v| v.revision > before.revision).await;
    assert_eq!(after.counts.total, 1);
    assert_eq!(after.conversation("6").unwrap().customer, "Fernanda Dias");
    assert!(monitor.feed.fetch_count() >= 5);
    assert_eq!(monitor.feed.subscriber_count(), 1);

    monitor.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn test_out_of_order_events_keep_newest_version() {
    let feed = MockConversationFeed::new();
    let mut monitor = TestMonitor::start(feed);
    monitor.loaded().await;

    let row = conversation("7", "Gabriel Nunes", minutes_ago(20));
    let newer = with_message(row.clone(), "agent", "Posso ajudar?", minutes_ago(1));
    let older = with_message(row, "customer", "Olá", minutes_ago(10));

    monitor
        .feed
        .push_event(event(ChangeOperation::Update, newer).at(base_time()));
    monitor
        .feed
        .push_event(event(ChangeOperation::Update, older).at(base_time() - Duration::seconds(30)));
    monitor.feed.push_event(
        event(
            ChangeOperation::Insert,
            conversation("8", "Helena Prado", minutes_ago(2)),
        )
        .at(base_time()),
    );

    // Events are applied in order, so once "8" shows up "7" has settled.
    let view = monitor.wait_for(|v| v.conversation("8").is_some()).await;
    let gabriel = view.conversation("7").unwrap();
    assert_eq!(gabriel.status, Status::Waiting);
    assert_eq!(gabriel.last_message.as_deref(), Some("Posso ajudar?"));

    monitor.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn test_delete_is_not_undone_by_late_update() {
    let feed = MockConversationFeed::new();
    let mut monitor = TestMonitor::start(feed);
    monitor.loaded().await;

    let row = conversation("9", "Igor Ramos", minutes_ago(5));
    monitor
        .feed
        .push_event(event(ChangeOperation::Insert, row.clone()).at(base_time() - Duration::seconds(20)));
    monitor
        .feed
        .push_event(event(ChangeOperation::Delete, json!({"id": "9"})).at(base_time()));
    monitor
        .feed
        .push_event(event(ChangeOperation::Update, row).at(base_time() - Duration::seconds(10)));
    monitor.feed.push_event(event(
        ChangeOperation::Insert,
        conversation("10", "Joana Reis", minutes_ago(1)),
    ));

    let view = monitor.wait_for(|v| v.conversation("10").is_some()).await;
    assert!(view.conversation("9").is_none());
    assert_eq!(view.counts.total, 1);

    monitor.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn test_message_table_change_triggers_resync() {
    let feed = MockConversationFeed::new();
    feed.set_records(vec![conversation("11", "Karina Melo", minutes_ago(10))]);
    let mut monitor = TestMonitor::start(feed);
    monitor.loaded().await;
    assert_eq!(monitor.feed.fetch_count(), 1);

    monitor.feed.set_records(vec![with_message(
        conversation("11", "Karina Melo", minutes_ago(10)),
        "customer",
        "Ainda estão aí?",
        minutes_ago(8),
    )]);
    monitor.feed.push_event(ChangeEvent::new(
        "messages",
        ChangeOperation::Insert,
        json!({"conversation_id": "11", "content": "Ainda estão aí?"}),
    ));

    let view = monitor
        .wait_for(|v| v.conversation("11").map(|c| c.status) == Some(Status::Unresponded))
        .await;
    assert_eq!(view.conversation("11").unwrap().wait_minutes, 8);
    assert_eq!(monitor.feed.fetch_count(), 2);

    monitor.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn test_malformed_notification_is_skipped() {
    let feed = MockConversationFeed::new();
    let mut monitor = TestMonitor::start(feed);
    monitor.loaded().await;

    monitor
        .feed
        .push_error(FeedError::Decode("expected value at line 1 column 1".to_string()));
    monitor.feed.push_event(event(
        ChangeOperation::Insert,
        json!({"id": "12", "customer": "Sem data"}),
    ));
    monitor.feed.push_event(event(
        ChangeOperation::Insert,
        conversation("13", "Lara Campos", minutes_ago(1)),
    ));

    let view = monitor.wait_for(|v| v.conversation("13").is_some()).await;
    assert!(view.conversation("12").is_none());
    assert_eq!(monitor.feed.fetch_count(), 1);
    assert_eq!(monitor.feed.subscriber_count(), 1);

    monitor.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn test_polling_feed_picks_up_changes() {
    let feed = MockConversationFeed::polling_only();
    feed.set_records(vec![conversation("14", "Mateus Pires", minutes_ago(3))]);
    let mut monitor = TestMonitor::start(feed);
    monitor.loaded().await;

    monitor.feed.set_records(vec![
        conversation("14", "Mateus Pires", minutes_ago(3)),
        conversation("15", "Nina Barros", minutes_ago(2)),
    ]);

    let view = monitor.wait_for(|v| v.counts.total == 2).await;
    assert_eq!(view.active.len(), 2);
    assert_eq!(monitor.feed.subscriber_count(), 0);

    monitor.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn test_polling_failure_keeps_last_view_until_recovery() {
    let feed = MockConversationFeed::polling_only();
    feed.set_records(vec![conversation("16", "Otávio Luz", minutes_ago(3))]);
    let mut monitor = TestMonitor::start(feed);
    let first = monitor.loaded().await;

    monitor.feed.fail_next_fetches(2);
    monitor.feed.set_records(Vec::new());

    let (_, body) = monitor.get("/v1/dashboard/conversations/16").await;
    assert_eq!(body["customer"], "Otávio Luz");

    let view = monitor
        .wait_for(|v| v.revision > first.revision && v.counts.total == 0)
        .await;
    assert!(view.conversation("16").is_none());

    monitor.shutdown().await;
}

mod common;
