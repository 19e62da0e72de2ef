//! 命令存储内存实现

use crate::error::StorageError;
use crate::models::CommandRecord;
use crate::traits::CommandStore;
use crate::validation::clamp_limit;
use domain::CommandStatus;
use std::sync::RwLock;

/// 命令内存存储
pub struct InMemoryCommandStore {
    commands: RwLock<Vec<CommandRecord>>,
}

impl InMemoryCommandStore {
    /// 创建空的命令存储
    pub fn new() -> Self {
        Self {
            commands: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryCommandStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CommandStore for InMemoryCommandStore {
    async fn create_command(&self, record: CommandRecord) -> Result<CommandRecord, StorageError> {
        let mut commands = self
            .commands
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if commands
            .iter()
            .any(|item| item.command_id == record.command_id)
        {
            return Err(StorageError::new("command already exists"));
        }
        commands.push(record.clone());
        Ok(record)
    }

    async fn find_command(&self, command_id: &str) -> Result<Option<CommandRecord>, StorageError> {
        let commands = self
            .commands
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(commands
            .iter()
            .find(|item| item.command_id == command_id)
            .cloned())
    }

    async fn mark_sent(&self, command_id: &str, ts_ms: i64) -> Result<bool, StorageError> {
        let mut commands = self
            .commands
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(command) = commands.iter_mut().find(|item| item.command_id == command_id) else {
            return Ok(false);
        };
        if command.status != CommandStatus::Pending {
            return Ok(false);
        }
        command.status = CommandStatus::Sent;
        command.sent_at_ms = Some(ts_ms);
        Ok(true)
    }

    async fn acknowledge(&self, command_id: &str, ts_ms: i64) -> Result<bool, StorageError> {
        let mut commands = self
            .commands
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(command) = commands.iter_mut().find(|item| item.command_id == command_id) else {
            return Ok(false);
        };
        if command.status != CommandStatus::Sent {
            return Ok(false);
        }
        command.status = CommandStatus::Acknowledged;
        command.acknowledged_at_ms = Some(ts_ms);
        Ok(true)
    }

    async fn begin_retry(&self, command_id: &str) -> Result<bool, StorageError> {
        let mut commands = self
            .commands
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(command) = commands.iter_mut().find(|item| item.command_id == command_id) else {
            return Ok(false);
        };
        if command.status != CommandStatus::Sent {
            return Ok(false);
        }
        command.status = CommandStatus::Pending;
        command.retry_count += 1;
        command.sent_at_ms = None;
        command.acknowledged_at_ms = None;
        Ok(true)
    }

    async fn finalize_timeout(&self, command_id: &str, ts_ms: i64) -> Result<bool, StorageError> {
        let mut commands = self
            .commands
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(command) = commands.iter_mut().find(|item| item.command_id == command_id) else {
            return Ok(false);
        };
        if command.status != CommandStatus::Sent {
            return Ok(false);
        }
        command.status = CommandStatus::Timeout;
        command.completed_at_ms = Some(ts_ms);
        Ok(true)
    }

    async fn complete(
        &self,
        command_id: &str,
        success: bool,
        message: &str,
        error_code: Option<&str>,
        error_details: Option<&str>,
        ts_ms: i64,
    ) -> Result<bool, StorageError> {
        let mut commands = self
            .commands
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(command) = commands.iter_mut().find(|item| item.command_id == command_id) else {
            return Ok(false);
        };
        if command.status.is_terminal() {
            return Ok(false);
        }
        command.status = if success {
            CommandStatus::Completed
        } else {
            CommandStatus::Failed
        };
        command.success = Some(success);
        command.result_message = Some(message.to_string());
        command.error_code = error_code.map(str::to_string);
        command.error_details = error_details.map(str::to_string);
        command.completed_at_ms = Some(ts_ms);
        Ok(true)
    }

    async fn list_by_status(
        &self,
        status: CommandStatus,
        limit: i64,
    ) -> Result<Vec<CommandRecord>, StorageError> {
        let commands = self
            .commands
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<CommandRecord> = commands
            .iter()
            .filter(|item| item.status == status)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        items.truncate(clamp_limit(limit));
        Ok(items)
    }

    async fn list_expired_sent(&self, now_ms: i64) -> Result<Vec<CommandRecord>, StorageError> {
        let commands = self
            .commands
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<CommandRecord> = commands
            .iter()
            .filter(|item| {
                item.status == CommandStatus::Sent
                    && item.deadline_ms().is_some_and(|deadline| deadline <= now_ms)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms));
        Ok(items)
    }
}
