//! 设备存储内存实现

use crate::error::StorageError;
use crate::models::DeviceRecord;
use crate::traits::DeviceStore;
use crate::validation::ensure_address;
use domain::{DeviceMetadata, DeviceState};
use std::collections::HashMap;
use std::sync::RwLock;

/// 设备内存存储
pub struct InMemoryDeviceStore {
    devices: RwLock<HashMap<String, DeviceRecord>>,
}

impl InMemoryDeviceStore {
    /// 创建空的设备存储
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn create_device(&self, record: DeviceRecord) -> Result<DeviceRecord, StorageError> {
        ensure_address(&record.address)?;
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if devices.contains_key(&record.address) {
            return Err(StorageError::new("device already exists"));
        }
        devices.insert(record.address.clone(), record.clone());
        Ok(record)
    }

    async fn find_device(&self, address: &str) -> Result<Option<DeviceRecord>, StorageError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(devices.get(address).cloned())
    }

    async fn list_devices(&self) -> Result<Vec<DeviceRecord>, StorageError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<DeviceRecord> = devices.values().cloned().collect();
        items.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(items)
    }

    async fn list_by_state(&self, state: DeviceState) -> Result<Vec<DeviceRecord>, StorageError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<DeviceRecord> = devices
            .values()
            .filter(|item| item.state == state && item.active)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(items)
    }

    async fn apply_metadata(
        &self,
        address: &str,
        metadata: &DeviceMetadata,
        ts_ms: i64,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(device) = devices.get_mut(address) else {
            return Ok(None);
        };
        device.merge_metadata(metadata);
        device.state = DeviceState::Online;
        device.last_seen_at_ms = Some(ts_ms);
        device.updated_at_ms = ts_ms;
        Ok(Some(device.clone()))
    }

    async fn touch(&self, address: &str, ts_ms: i64) -> Result<bool, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(device) = devices.get_mut(address) else {
            return Ok(false);
        };
        device.state = DeviceState::Online;
        device.last_seen_at_ms = Some(ts_ms);
        device.updated_at_ms = ts_ms;
        Ok(true)
    }

    async fn mark_offline(&self, address: &str) -> Result<bool, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(device) = devices.get_mut(address) else {
            return Ok(false);
        };
        if device.state != DeviceState::Online {
            return Ok(false);
        }
        device.state = DeviceState::Offline;
        Ok(true)
    }

    async fn record_error(
        &self,
        address: &str,
        message: &str,
        ts_ms: i64,
    ) -> Result<bool, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(device) = devices.get_mut(address) else {
            return Ok(false);
        };
        device.error_count += 1;
        device.last_error = Some(message.to_string());
        device.last_error_at_ms = Some(ts_ms);
        device.state = DeviceState::Error;
        device.updated_at_ms = ts_ms;
        Ok(true)
    }

    async fn deactivate_device(&self, address: &str) -> Result<bool, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(device) = devices.get_mut(address) else {
            return Ok(false);
        };
        device.active = false;
        Ok(true)
    }
}
