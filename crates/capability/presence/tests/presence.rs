use domain::{DeviceMetadata, DeviceState};
use pond_presence::PresenceTracker;
use pond_storage::{DeviceRecord, DeviceStore, InMemoryDeviceStore};
use std::sync::Arc;

const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";
const THRESHOLD_MS: i64 = 30_000;

async fn tracker_with_device() -> (PresenceTracker, Arc<InMemoryDeviceStore>) {
    let store = Arc::new(InMemoryDeviceStore::new());
    store
        .create_device(DeviceRecord::new(ADDRESS, "Pond 1", 0))
        .await
        .expect("create");
    (PresenceTracker::new(store.clone(), THRESHOLD_MS), store)
}

#[tokio::test]
async fn touch_marks_online_and_tracks() {
    let (tracker, store) = tracker_with_device().await;

    assert!(tracker.touch(ADDRESS, 1_000).await.expect("touch"));
    assert_eq!(tracker.tracked_len().await, 1);

    let device = store
        .find_device(ADDRESS)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(device.state, DeviceState::Online);
    assert_eq!(device.last_seen_at_ms, Some(1_000));
}

#[tokio::test]
async fn unknown_device_is_dropped() {
    let (tracker, _store) = tracker_with_device().await;

    assert!(!tracker.touch("11:22:33:44:55:66", 1_000).await.expect("touch"));
    assert!(
        !tracker
            .mark_online("11:22:33:44:55:66", &DeviceMetadata::default(), 1_000)
            .await
            .expect("mark")
    );
    assert_eq!(tracker.tracked_len().await, 0);
}

#[tokio::test]
async fn mark_online_merges_metadata() {
    let (tracker, store) = tracker_with_device().await;

    let metadata = DeviceMetadata {
        firmware_version: Some("2.1.0".to_string()),
        wifi_signal_strength: Some(-55),
        ..DeviceMetadata::default()
    };
    assert!(tracker.mark_online(ADDRESS, &metadata, 1_000).await.expect("mark"));

    let device = store
        .find_device(ADDRESS)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(device.state, DeviceState::Online);
    assert_eq!(device.metadata.firmware_version.as_deref(), Some("2.1.0"));
    assert_eq!(device.metadata.wifi_signal_strength, Some(-55));
}

#[tokio::test]
async fn sweep_flips_silent_devices_offline() {
    let (tracker, store) = tracker_with_device().await;
    tracker.touch(ADDRESS, 1_000).await.expect("touch");

    // 阈值内：不流转
    let flipped = tracker.sweep_offline(1_000 + THRESHOLD_MS).await.expect("sweep");
    assert_eq!(flipped, 0);

    let flipped = tracker
        .sweep_offline(1_000 + THRESHOLD_MS + 1_000)
        .await
        .expect("sweep");
    assert_eq!(flipped, 1);
    assert_eq!(tracker.tracked_len().await, 0);

    let device = store
        .find_device(ADDRESS)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(device.state, DeviceState::Offline);
}

#[tokio::test]
async fn sweep_reconciles_online_devices_missing_from_map() {
    let (tracker, store) = tracker_with_device().await;
    // 直接置为在线，模拟进程重启后丢失的心跳表
    store.touch(ADDRESS, 1_000).await.expect("touch");
    assert_eq!(tracker.tracked_len().await, 0);

    let flipped = tracker
        .sweep_offline(1_000 + THRESHOLD_MS + 1_000)
        .await
        .expect("sweep");
    assert_eq!(flipped, 1);

    let device = store
        .find_device(ADDRESS)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(device.state, DeviceState::Offline);
}

#[tokio::test]
async fn record_error_flags_device() {
    let (tracker, store) = tracker_with_device().await;

    assert!(
        tracker
            .record_error(ADDRESS, "pump stalled", 1_000)
            .await
            .expect("error")
    );
    let device = store
        .find_device(ADDRESS)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(device.state, DeviceState::Error);
    assert_eq!(device.error_count, 1);
}

#[tokio::test]
async fn online_devices_lists_active_online() {
    let (tracker, _store) = tracker_with_device().await;
    tracker.touch(ADDRESS, 1_000).await.expect("touch");

    let online = tracker.online_devices().await.expect("online");
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].address, ADDRESS);
}
