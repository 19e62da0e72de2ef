use pond_mqtt::{InMemoryBus, InboundFrame, MessageBus, TopicCategory};

fn frame() -> InboundFrame {
    InboundFrame {
        topic: "ff/AA:BB:CC:DD:EE:FF/heartbeat".to_string(),
        category: TopicCategory::Heartbeat,
        device_address: "AA:BB:CC:DD:EE:FF".to_string(),
        payload: serde_json::json!({"firmware_version": "1.0.0"}),
        received_at_ms: 1_000,
    }
}

#[tokio::test]
async fn in_memory_bus_delivers_to_subscriber() {
    let bus = InMemoryBus::new();
    let mut rx = bus.subscribe().await.expect("subscribe");

    bus.publish(&frame()).await.expect("publish");
    let received = rx.recv().await.expect("frame");
    assert_eq!(received, frame());
}

#[tokio::test]
async fn publish_without_subscriber_fails() {
    let bus = InMemoryBus::new();
    assert!(bus.publish(&frame()).await.is_err());
}

#[tokio::test]
async fn frames_survive_json_round_trip() {
    // Redis 通道以 JSON 传帧，形状必须稳定
    let encoded = serde_json::to_string(&frame()).expect("encode");
    let decoded: InboundFrame = serde_json::from_str(&encoded).expect("decode");
    assert_eq!(decoded, frame());
}
