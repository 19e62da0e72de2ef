use domain::LogDirection;
use pond_storage::{InMemoryMessageLogStore, MessageLogRecord, MessageLogStore};

#[tokio::test]
async fn append_and_list_recent() {
    let store = InMemoryMessageLogStore::new();
    for ts in [1_000, 2_000, 3_000] {
        store
            .append(MessageLogRecord::new(
                "ff/AA:BB:CC:DD:EE:FF/sensors",
                LogDirection::Inbound,
                serde_json::json!({"temperature": 26.0, "ts": ts}),
                ts,
            ))
            .await
            .expect("append");
    }

    let recent = store.list_recent(2).await.expect("list");
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].created_at_ms, 3_000);
    assert_eq!(recent[1].created_at_ms, 2_000);
}

#[tokio::test]
async fn prune_removes_old_entries() {
    let store = InMemoryMessageLogStore::new();
    for ts in [1_000, 2_000, 3_000] {
        store
            .append(MessageLogRecord::new(
                "ff/AA:BB:CC:DD:EE:FF/heartbeat",
                LogDirection::Inbound,
                serde_json::json!({}),
                ts,
            ))
            .await
            .expect("append");
    }

    let removed = store.prune_older_than(2_500).await.expect("prune");
    assert_eq!(removed, 2);
    let remaining = store.list_recent(10).await.expect("list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].created_at_ms, 3_000);
}

#[tokio::test]
async fn payload_size_is_recorded() {
    let payload = serde_json::json!({"command_id": "cmd-1"});
    let record = MessageLogRecord::new(
        "ff/AA:BB:CC:DD:EE:FF/commands",
        LogDirection::Outbound,
        payload.clone(),
        1_000,
    );
    assert_eq!(record.payload_size, payload.to_string().len() as i64);
}
