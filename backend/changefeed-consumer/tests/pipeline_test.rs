mod common;

use change_publisher::{ChangeRecorder, Operation, PublishOutcome};
use changefeed_consumer::RecordKind;
use common::{envelope_json, service, standard_router, MemoryTopic, RecordLog, TopicSink};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;

/// Push everything, close the topic, run the loop to exhaustion
async fn consume_all(messages: Vec<(&str, Vec<u8>)>) -> (Arc<RecordLog>, Vec<i64>) {
    let (topic, source) = MemoryTopic::new();
    for (key, payload) in &messages {
        topic.push_raw(key, payload);
    }
    drop(topic);

    let log = Arc::new(RecordLog::default());
    let service = service(source, standard_router(), log.clone());
    let (_tx, rx) = watch::channel(false);
    service.run(rx).await;

    let acked = service.source().acked();
    (log, acked)
}

#[tokio::test]
async fn test_todo_insert_end_to_end() {
    let (topic, source) = MemoryTopic::new();
    let recorder = ChangeRecorder::new(TopicSink(topic.clone()));

    let outcome = recorder
        .record_and_wait(
            Operation::Insert,
            "todos",
            json!({"id": 42, "title": "Buy milk", "priority": "medium", "status": "pending", "user_id": 7}),
            Some(7),
        )
        .await;
    assert_eq!(outcome, PublishOutcome::Delivered);
    drop(recorder);
    drop(topic);

    let log = Arc::new(RecordLog::default());
    let service = service(source, standard_router(), log.clone());
    let (_tx, rx) = watch::channel(false);
    service.run(rx).await;

    let processed = log.of_kind(RecordKind::ProcessedDbChange);
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].get("messageType"), &json!("DATABASE_CHANGE_PROCESSED"));
    assert_eq!(processed[0].get("table"), &json!("todos"));

    let created = log.of_kind(RecordKind::TodoCreated);
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].get("todoId"), &json!(42));
    assert_eq!(created[0].get("title"), &json!("Buy milk"));

    assert_eq!(
        log.kinds(),
        vec![
            RecordKind::ProcessedDbChange,
            RecordKind::TodoCreated,
            RecordKind::AnalyticsProcessing
        ]
    );
    assert_eq!(service.status().messages_processed(), 1);
}

#[tokio::test]
async fn test_wire_example_payload() {
    let payload = br#"{"operation":"INSERT","table":"todos","data":{"id":42,"title":"Buy milk","priority":"medium","status":"pending","user_id":7},"userId":7,"timestamp":"2024-01-01T00:00:00Z"}"#;
    let (log, acked) = consume_all(vec![("todos-INSERT", payload.to_vec())]).await;

    let created = log.of_kind(RecordKind::TodoCreated);
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].get("timestamp"), &json!("2024-01-01T00:00:00Z"));
    assert_eq!(acked, vec![0]);
}

#[tokio::test]
async fn test_producer_timestamp_is_echoed_unchanged() {
    let millis = br#"{"timestamp":"2024-01-01T00:00:00.000Z","operation":"INSERT","table":"todos","data":{"id":1,"title":"a"},"userId":1}"#;
    let local = br#"{"timestamp":"2024-01-01T00:00:00","operation":"INSERT","table":"users","data":{"id":2},"userId":null}"#;
    let (log, acked) = consume_all(vec![
        ("todos-INSERT", millis.to_vec()),
        ("users-INSERT", local.to_vec()),
    ])
    .await;

    let processed = log.of_kind(RecordKind::ProcessedDbChange);
    assert_eq!(processed.len(), 2);
    assert_eq!(processed[0].get("timestamp"), &json!("2024-01-01T00:00:00.000Z"));
    assert_eq!(processed[1].get("timestamp"), &json!("2024-01-01T00:00:00"));

    assert_eq!(
        log.of_kind(RecordKind::TodoCreated)[0].get("timestamp"),
        &json!("2024-01-01T00:00:00.000Z")
    );
    assert_eq!(
        log.of_kind(RecordKind::UserRegistered)[0].get("timestamp"),
        &json!("2024-01-01T00:00:00")
    );
    assert_eq!(acked, vec![0, 1]);
}

#[tokio::test]
async fn test_routing_never_drops_tables() {
    let (log, _) = consume_all(vec![
        ("todos-INSERT", envelope_json("INSERT", "todos", json!({"id": 1}), Some(1))),
        ("users-INSERT", envelope_json("INSERT", "users", json!({"id": 2}), None)),
        ("user_tokens-INSERT", envelope_json("INSERT", "user_tokens", json!({"id": 3, "user_id": 2}), Some(2))),
        ("comments-INSERT", envelope_json("INSERT", "comments", json!({"id": 4}), Some(2))),
    ])
    .await;

    assert_eq!(log.of_kind(RecordKind::ProcessedDbChange).len(), 4);
    assert_eq!(log.of_kind(RecordKind::TodoCreated).len(), 1);
    assert_eq!(log.of_kind(RecordKind::UserRegistered).len(), 1);
    assert_eq!(log.of_kind(RecordKind::UserTokenCreated).len(), 1);

    let generic = log.of_kind(RecordKind::GenericDbChange);
    assert_eq!(generic.len(), 1);
    assert_eq!(generic[0].get("table"), &json!("comments"));
}

#[tokio::test]
async fn test_redelivered_insert_has_identical_shape() {
    let payload = envelope_json(
        "INSERT",
        "todos",
        json!({"id": 42, "title": "Buy milk", "priority": "medium", "status": "pending", "user_id": 7}),
        Some(7),
    );
    let (log, _) = consume_all(vec![
        ("todos-INSERT", payload.clone()),
        ("todos-INSERT", payload),
    ])
    .await;

    let created = log.of_kind(RecordKind::TodoCreated);
    assert_eq!(created.len(), 2);
    assert_eq!(created[0], created[1]);

    let analytics = log.of_kind(RecordKind::AnalyticsProcessing);
    assert_eq!(analytics.len(), 2);
    assert_eq!(analytics[0].field_names(), analytics[1].field_names());
    assert_eq!(analytics[0].get("action"), analytics[1].get("action"));
}

#[tokio::test]
async fn test_bad_message_does_not_stall_batch() {
    let (log, acked) = consume_all(vec![
        ("todos-INSERT", envelope_json("INSERT", "todos", json!({"id": 1, "title": "a"}), Some(1))),
        ("todos-DELETE", envelope_json("DELETE", "todos", json!({}), Some(1))),
        ("todos-INSERT", envelope_json("INSERT", "todos", json!({"id": 3, "title": "c"}), Some(1))),
    ])
    .await;

    let created = log.of_kind(RecordKind::TodoCreated);
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].get("todoId"), &json!(1));
    assert_eq!(created[1].get("todoId"), &json!(3));

    // The dropped message leaves no partial trail
    assert_eq!(log.of_kind(RecordKind::ProcessedDbChange).len(), 2);
    assert!(log.of_kind(RecordKind::TodoDeleted).is_empty());

    // Every message is acked, including the dropped one
    assert_eq!(acked, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_malformed_json_is_skipped() {
    let (log, acked) = consume_all(vec![
        ("todos-INSERT", b"{\"operation\": \"INSERT\", ".to_vec()),
        ("users-UPDATE", envelope_json("UPDATE", "users", json!({"id": 5, "email": "e@x.io"}), Some(5))),
    ])
    .await;

    assert_eq!(log.kinds(), vec![RecordKind::ProcessedDbChange, RecordKind::UserProfileUpdated]);
    assert_eq!(acked, vec![0, 1]);
}

#[tokio::test]
async fn test_unknown_operation_is_decode_error() {
    let (log, acked) = consume_all(vec![(
        "todos-UPSERT",
        br#"{"timestamp":"2024-01-01T00:00:00Z","operation":"UPSERT","table":"todos","data":{"id":1},"userId":null}"#.to_vec(),
    )])
    .await;

    assert!(log.all().is_empty());
    assert_eq!(acked, vec![0]);
}

#[tokio::test]
async fn test_token_delete_is_single_revocation() {
    let (log, _) = consume_all(vec![(
        "user_tokens-DELETE",
        envelope_json("DELETE", "user_tokens", json!({"id": 9, "user_id": 7, "is_revoked": true}), Some(7)),
    )])
    .await;

    let revoked = log.of_kind(RecordKind::UserTokenRevoked);
    assert_eq!(revoked.len(), 1);
    assert_eq!(revoked[0].get("isRevoked"), &json!(true));
    assert!(log.of_kind(RecordKind::UserTokenCreated).is_empty());
}

#[tokio::test]
async fn test_message_sequence_increases() {
    let (log, _) = consume_all(vec![
        ("users-INSERT", envelope_json("INSERT", "users", json!({"id": 1}), None)),
        ("bad", b"not json".to_vec()),
        ("users-INSERT", envelope_json("INSERT", "users", json!({"id": 2}), None)),
    ])
    .await;

    let sequences: Vec<_> = log
        .of_kind(RecordKind::ProcessedDbChange)
        .iter()
        .map(|r| r.get("messageSequence").clone())
        .collect();
    assert_eq!(sequences, vec![json!(1), json!(3)]);
}
