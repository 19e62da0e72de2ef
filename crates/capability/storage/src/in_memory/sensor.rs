//! 传感器读数内存实现

use crate::error::StorageError;
use crate::models::SensorReadingRecord;
use crate::traits::SensorReadingStore;
use crate::validation::clamp_limit;
use std::sync::RwLock;

/// 传感器读数内存存储
pub struct InMemorySensorReadingStore {
    readings: RwLock<Vec<SensorReadingRecord>>,
}

impl InMemorySensorReadingStore {
    pub fn new() -> Self {
        Self {
            readings: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemorySensorReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SensorReadingStore for InMemorySensorReadingStore {
    async fn create_reading(
        &self,
        record: SensorReadingRecord,
    ) -> Result<SensorReadingRecord, StorageError> {
        let mut readings = self
            .readings
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        readings.push(record.clone());
        Ok(record)
    }

    async fn list_recent(
        &self,
        address: &str,
        limit: i64,
    ) -> Result<Vec<SensorReadingRecord>, StorageError> {
        let readings = self
            .readings
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<SensorReadingRecord> = readings
            .iter()
            .filter(|item| item.device_address == address)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.received_at_ms.cmp(&a.received_at_ms));
        items.truncate(clamp_limit(limit));
        Ok(items)
    }
}
