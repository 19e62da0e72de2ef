use pond_storage::{InMemorySensorReadingStore, SensorReadingRecord, SensorReadingStore};

fn reading(device: &str, ts_ms: i64, temperature: f64) -> SensorReadingRecord {
    SensorReadingRecord {
        reading_id: uuid::Uuid::new_v4().to_string(),
        device_address: device.to_string(),
        temperature: Some(temperature),
        water_level: None,
        water_level2: None,
        feed_level: None,
        feed_level2: None,
        dissolved_oxygen: None,
        ph: None,
        battery: None,
        signal_strength: Some(-60),
        device_timestamp: None,
        received_at_ms: ts_ms,
    }
}

#[tokio::test]
async fn list_recent_scopes_by_device() {
    let store = InMemorySensorReadingStore::new();
    store
        .create_reading(reading("AA:BB:CC:DD:EE:01", 1_000, 25.0))
        .await
        .expect("create");
    store
        .create_reading(reading("AA:BB:CC:DD:EE:01", 2_000, 26.0))
        .await
        .expect("create");
    store
        .create_reading(reading("AA:BB:CC:DD:EE:02", 3_000, 27.0))
        .await
        .expect("create");

    let readings = store
        .list_recent("AA:BB:CC:DD:EE:01", 10)
        .await
        .expect("list");
    assert_eq!(readings.len(), 2);
    assert_eq!(readings[0].received_at_ms, 2_000);
    assert_eq!(readings[0].temperature, Some(26.0));
}
