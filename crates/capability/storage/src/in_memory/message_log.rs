//! 报文日志内存实现

use crate::error::StorageError;
use crate::models::MessageLogRecord;
use crate::traits::MessageLogStore;
use crate::validation::clamp_limit;
use std::sync::RwLock;

/// 报文日志内存存储
pub struct InMemoryMessageLogStore {
    entries: RwLock<Vec<MessageLogRecord>>,
}

impl InMemoryMessageLogStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryMessageLogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MessageLogStore for InMemoryMessageLogStore {
    async fn append(&self, record: MessageLogRecord) -> Result<MessageLogRecord, StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        entries.push(record.clone());
        Ok(record)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<MessageLogRecord>, StorageError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<MessageLogRecord> = entries.iter().cloned().collect();
        items.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        items.truncate(clamp_limit(limit));
        Ok(items)
    }

    async fn prune_older_than(&self, cutoff_ms: i64) -> Result<u64, StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let before = entries.len();
        entries.retain(|item| item.created_at_ms >= cutoff_ms);
        Ok((before - entries.len()) as u64)
    }
}
