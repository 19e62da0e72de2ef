use domain::{DeviceMetadata, DeviceState};
use pond_storage::{DeviceRecord, DeviceStore, InMemoryDeviceStore};

const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

#[tokio::test]
async fn create_and_find() {
    let store = InMemoryDeviceStore::new();
    store
        .create_device(DeviceRecord::new(ADDRESS, "Pond 1", 1_000))
        .await
        .expect("create");

    let device = store
        .find_device(ADDRESS)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(device.state, DeviceState::Offline);
    assert!(device.active);

    let err = store
        .create_device(DeviceRecord::new(ADDRESS, "Dup", 2_000))
        .await
        .expect_err("duplicate");
    assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn invalid_address_is_rejected() {
    let store = InMemoryDeviceStore::new();
    let result = store
        .create_device(DeviceRecord::new("not-an-address", "Bad", 1_000))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn metadata_merge_is_non_destructive() {
    let store = InMemoryDeviceStore::new();
    store
        .create_device(DeviceRecord::new(ADDRESS, "Pond 1", 1_000))
        .await
        .expect("create");

    let first = DeviceMetadata {
        firmware_version: Some("1.0.0".to_string()),
        ip_address: Some("10.0.0.5".to_string()),
        ..DeviceMetadata::default()
    };
    store
        .apply_metadata(ADDRESS, &first, 2_000)
        .await
        .expect("apply")
        .expect("exists");

    // 第二帧缺失 ip_address，既有值应保留
    let second = DeviceMetadata {
        firmware_version: Some("1.1.0".to_string()),
        ..DeviceMetadata::default()
    };
    let device = store
        .apply_metadata(ADDRESS, &second, 3_000)
        .await
        .expect("apply")
        .expect("exists");
    assert_eq!(device.metadata.firmware_version.as_deref(), Some("1.1.0"));
    assert_eq!(device.metadata.ip_address.as_deref(), Some("10.0.0.5"));
    assert_eq!(device.state, DeviceState::Online);
    assert_eq!(device.last_seen_at_ms, Some(3_000));
}

#[tokio::test]
async fn mark_offline_only_from_online() {
    let store = InMemoryDeviceStore::new();
    store
        .create_device(DeviceRecord::new(ADDRESS, "Pond 1", 1_000))
        .await
        .expect("create");

    // 初始即离线，不应流转
    assert!(!store.mark_offline(ADDRESS).await.expect("offline"));

    store.touch(ADDRESS, 2_000).await.expect("touch");
    assert!(store.mark_offline(ADDRESS).await.expect("offline"));

    let device = store
        .find_device(ADDRESS)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(device.state, DeviceState::Offline);
}

#[tokio::test]
async fn record_error_increments_and_flags() {
    let store = InMemoryDeviceStore::new();
    store
        .create_device(DeviceRecord::new(ADDRESS, "Pond 1", 1_000))
        .await
        .expect("create");

    store
        .record_error(ADDRESS, "sensor fault", 2_000)
        .await
        .expect("error");
    store
        .record_error(ADDRESS, "sensor fault again", 3_000)
        .await
        .expect("error");

    let device = store
        .find_device(ADDRESS)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(device.error_count, 2);
    assert_eq!(device.state, DeviceState::Error);
    assert_eq!(device.last_error.as_deref(), Some("sensor fault again"));
}

#[tokio::test]
async fn deactivated_devices_drop_out_of_state_lists() {
    let store = InMemoryDeviceStore::new();
    store
        .create_device(DeviceRecord::new(ADDRESS, "Pond 1", 1_000))
        .await
        .expect("create");
    store.touch(ADDRESS, 2_000).await.expect("touch");

    let online = store
        .list_by_state(DeviceState::Online)
        .await
        .expect("list");
    assert_eq!(online.len(), 1);

    store.deactivate_device(ADDRESS).await.expect("deactivate");
    let online = store
        .list_by_state(DeviceState::Online)
        .await
        .expect("list");
    assert!(online.is_empty());
}
