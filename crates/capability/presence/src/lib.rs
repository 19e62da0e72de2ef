//! 设备在线状态追踪。
//!
//! 以心跳表记录每台设备最近一次入站帧时间，静默超过阈值的设备
//! 由离线扫描流转为 OFFLINE。未注册设备的帧一律告警丢弃。

use domain::{DeviceMetadata, DeviceState};
use pond_storage::{DeviceRecord, DeviceStore};
use pond_telemetry::record_device_marked_offline;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// 在线追踪错误。
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// 设备在线追踪器。
pub struct PresenceTracker {
    device_store: Arc<dyn DeviceStore>,
    heartbeats: Mutex<HashMap<String, i64>>,
    offline_threshold_ms: i64,
    // 离线扫描串行化；扫描仍在进行时跳过本轮
    sweep_guard: Mutex<()>,
}

impl PresenceTracker {
    pub fn new(device_store: Arc<dyn DeviceStore>, offline_threshold_ms: i64) -> Self {
        Self {
            device_store,
            heartbeats: Mutex::new(HashMap::new()),
            offline_threshold_ms,
            sweep_guard: Mutex::new(()),
        }
    }

    /// 任意入站帧刷新设备活跃时间。
    ///
    /// 返回设备是否已注册；未注册的地址告警后丢弃。
    pub async fn touch(&self, address: &str, now_ms: i64) -> Result<bool, PresenceError> {
        let known = self
            .device_store
            .touch(address, now_ms)
            .await
            .map_err(|err| PresenceError::Storage(err.to_string()))?;
        if !known {
            warn!(
                target: "pond.presence",
                device_address = %address,
                "frame_from_unknown_device"
            );
            return Ok(false);
        }
        self.heartbeats
            .lock()
            .await
            .insert(address.to_string(), now_ms);
        Ok(true)
    }

    /// 心跳/启动帧：合并元信息并置为在线。
    ///
    /// 非破坏性合并，只覆盖报文中出现的字段。
    pub async fn mark_online(
        &self,
        address: &str,
        metadata: &DeviceMetadata,
        now_ms: i64,
    ) -> Result<bool, PresenceError> {
        let device = self
            .device_store
            .apply_metadata(address, metadata, now_ms)
            .await
            .map_err(|err| PresenceError::Storage(err.to_string()))?;
        let Some(device) = device else {
            warn!(
                target: "pond.presence",
                device_address = %address,
                "heartbeat_from_unknown_device"
            );
            return Ok(false);
        };
        self.heartbeats
            .lock()
            .await
            .insert(address.to_string(), now_ms);
        info!(
            target: "pond.presence",
            device_address = %address,
            state = %device.state,
            "device_online"
        );
        Ok(true)
    }

    /// 记录设备侧错误（错误计数 +1，状态置为 ERROR）。
    pub async fn record_error(
        &self,
        address: &str,
        message: &str,
        now_ms: i64,
    ) -> Result<bool, PresenceError> {
        let known = self
            .device_store
            .record_error(address, message, now_ms)
            .await
            .map_err(|err| PresenceError::Storage(err.to_string()))?;
        if known {
            warn!(
                target: "pond.presence",
                device_address = %address,
                error = %message,
                "device_error_recorded"
            );
        }
        Ok(known)
    }

    /// 离线扫描：静默超过阈值的设备流转为 OFFLINE 并移出心跳表。
    ///
    /// 同时对账存储中在线但心跳表缺失且 last_seen 已越期的设备
    /// （进程重启丢失心跳表）。上一轮仍在进行时跳过本轮。
    /// 返回流转为离线的设备数。
    pub async fn sweep_offline(&self, now_ms: i64) -> Result<usize, PresenceError> {
        let Ok(_guard) = self.sweep_guard.try_lock() else {
            return Ok(0);
        };
        let cutoff = now_ms - self.offline_threshold_ms;

        let mut silent: Vec<String> = {
            let heartbeats = self.heartbeats.lock().await;
            heartbeats
                .iter()
                .filter(|(_, last_seen)| **last_seen < cutoff)
                .map(|(address, _)| address.clone())
                .collect()
        };

        let online = self
            .device_store
            .list_by_state(DeviceState::Online)
            .await
            .map_err(|err| PresenceError::Storage(err.to_string()))?;
        {
            let heartbeats = self.heartbeats.lock().await;
            for device in online {
                if heartbeats.contains_key(&device.address) {
                    continue;
                }
                if device.last_seen_at_ms.is_none_or(|seen| seen < cutoff) {
                    silent.push(device.address);
                }
            }
        }

        let mut flipped = 0usize;
        for address in silent {
            let changed = self
                .device_store
                .mark_offline(&address)
                .await
                .map_err(|err| PresenceError::Storage(err.to_string()))?;
            self.heartbeats.lock().await.remove(&address);
            if changed {
                flipped += 1;
                record_device_marked_offline();
                warn!(
                    target: "pond.presence",
                    device_address = %address,
                    threshold_ms = self.offline_threshold_ms,
                    "device_marked_offline"
                );
            }
        }
        Ok(flipped)
    }

    /// 当前在线设备列表。
    pub async fn online_devices(&self) -> Result<Vec<DeviceRecord>, PresenceError> {
        self.device_store
            .list_by_state(DeviceState::Online)
            .await
            .map_err(|err| PresenceError::Storage(err.to_string()))
    }

    /// 单台设备当前状态。
    pub async fn device_status(
        &self,
        address: &str,
    ) -> Result<Option<DeviceRecord>, PresenceError> {
        self.device_store
            .find_device(address)
            .await
            .map_err(|err| PresenceError::Storage(err.to_string()))
    }

    /// 心跳表大小（观测用）。
    pub async fn tracked_len(&self) -> usize {
        self.heartbeats.lock().await.len()
    }
}
