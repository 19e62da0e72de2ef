//! 命令生命周期管理。
//!
//! 负责命令的创建、下发、确认与超时重试：
//! `PENDING → SENT → ACKNOWLEDGED → COMPLETED`，失败路径为 `FAILED` / `TIMEOUT`。
//! 存储流转全部走守卫式 compare-and-set，确认与超时竞争时先到者生效，
//! 一条命令恰好进入一次终态。

use async_trait::async_trait;
use domain::{AckFrame, CommandStatus, CommandType, LogDirection, Position, wire::CommandEnvelope};
use pond_storage::{CommandRecord, CommandStore, MessageLogRecord, MessageLogStore};
use pond_telemetry::{
    record_ack_unknown, record_command_completed, record_command_failed, record_command_issued,
    record_command_publish_failure, record_command_publish_success, record_command_retry,
    record_command_timed_out,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// 控制链路错误。
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("transport not connected")]
    NotConnected,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("dispatch error: {0}")]
    Dispatch(String),
    #[error("payload error: {0}")]
    Payload(String),
}

/// 命令下发请求。
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub device_address: String,
    pub position: u8,
    pub command_type: CommandType,
    pub parameters: serde_json::Value,
    /// 未指定时使用配置默认值。
    pub timeout_seconds: Option<u32>,
    pub max_retries: Option<u32>,
    pub execution_id: Option<String>,
    pub issued_by: Option<String>,
}

/// 命令发布抽象（由传输层实现）。
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    /// 传输会话当前是否可用。
    fn is_connected(&self) -> bool;

    /// 向设备命令主题发布报文（QoS 2），返回实际发布的主题。
    async fn publish_command(
        &self,
        device_address: &str,
        envelope: &CommandEnvelope,
    ) -> Result<String, ControlError>;
}

/// 命令终态观察者（自动化执行等外部协作方）。
#[async_trait]
pub trait ExecutionObserver: Send + Sync {
    async fn command_resolved(&self, command: &CommandRecord);
}

/// 空观察者。
#[derive(Debug, Default)]
pub struct NoopObserver;

#[async_trait]
impl ExecutionObserver for NoopObserver {
    async fn command_resolved(&self, _command: &CommandRecord) {}
}

/// 挂起索引条目（在途命令及其当前截止时间）。
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub command_id: String,
    pub device_address: String,
    pub envelope: CommandEnvelope,
    pub deadline_ms: i64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timeout_seconds: u32,
}

/// 生命周期配置。
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub default_timeout_seconds: u32,
    pub default_max_retries: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 10,
            default_max_retries: 3,
        }
    }
}

/// 命令生命周期管理器。
pub struct CommandLifecycle {
    command_store: Arc<dyn CommandStore>,
    message_log: Arc<dyn MessageLogStore>,
    publisher: Arc<dyn CommandPublisher>,
    observer: Arc<dyn ExecutionObserver>,
    config: LifecycleConfig,
    pending: Mutex<HashMap<String, PendingCommand>>,
    // 超时扫描串行化；扫描仍在进行时跳过本轮
    sweep_guard: Mutex<()>,
}

impl CommandLifecycle {
    pub fn new(
        command_store: Arc<dyn CommandStore>,
        message_log: Arc<dyn MessageLogStore>,
        publisher: Arc<dyn CommandPublisher>,
        observer: Arc<dyn ExecutionObserver>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            command_store,
            message_log,
            publisher,
            observer,
            config,
            pending: Mutex::new(HashMap::new()),
            sweep_guard: Mutex::new(()),
        }
    }

    /// 创建并下发一条命令。
    ///
    /// 持久化 PENDING → 发布 → 持久化 SENT → 写入挂起索引。
    /// 发布失败直接进入终态 FAILED，从不入索引；会话断开时立即报错，不落库。
    pub async fn send(&self, request: CommandRequest) -> Result<CommandRecord, ControlError> {
        if !self.publisher.is_connected() {
            warn!(
                target: "pond.control",
                device_address = %request.device_address,
                command_type = %request.command_type,
                "command_rejected_not_connected"
            );
            return Err(ControlError::NotConnected);
        }
        // 控制端点只有 1/2 两个取值，越界请求在落库前拒绝
        let position = Position::from_u8(request.position).ok_or_else(|| {
            warn!(
                target: "pond.control",
                device_address = %request.device_address,
                position = request.position,
                "command_rejected_invalid_position"
            );
            ControlError::Payload(format!("invalid position: {}", request.position))
        })?;

        record_command_issued();
        let now_ms = now_epoch_ms();
        let command_id = uuid::Uuid::new_v4().to_string();
        let timeout_seconds = request
            .timeout_seconds
            .unwrap_or(self.config.default_timeout_seconds);
        let max_retries = request
            .max_retries
            .unwrap_or(self.config.default_max_retries);
        let record = CommandRecord {
            command_id: command_id.clone(),
            device_address: request.device_address.clone(),
            position: position.as_u8(),
            command_type: request.command_type,
            parameters: request.parameters.clone(),
            status: CommandStatus::Pending,
            timeout_seconds,
            max_retries,
            retry_count: 0,
            success: None,
            result_message: None,
            error_code: None,
            error_details: None,
            execution_id: request.execution_id.clone(),
            issued_by: request.issued_by.clone(),
            created_at_ms: now_ms,
            sent_at_ms: None,
            acknowledged_at_ms: None,
            completed_at_ms: None,
        };
        let record = self
            .command_store
            .create_command(record)
            .await
            .map_err(|err| ControlError::Storage(err.to_string()))?;
        info!(
            target: "pond.control",
            command_id = %record.command_id,
            device_address = %record.device_address,
            command_type = %record.command_type,
            position = record.position,
            "command_created"
        );

        let envelope = envelope_for(&record, now_ms);
        let topic = match self
            .publisher
            .publish_command(&record.device_address, &envelope)
            .await
        {
            Ok(topic) => topic,
            Err(err) => {
                record_command_publish_failure();
                let detail = err.to_string();
                let _ = self
                    .command_store
                    .complete(
                        &record.command_id,
                        false,
                        "publish failed",
                        Some("E_PUBLISH"),
                        Some(&detail),
                        now_epoch_ms(),
                    )
                    .await;
                warn!(
                    target: "pond.control",
                    command_id = %record.command_id,
                    device_address = %record.device_address,
                    error = %detail,
                    "command_publish_failed"
                );
                return Err(err);
            }
        };
        record_command_publish_success();

        let sent_at_ms = now_epoch_ms();
        let sent = self
            .command_store
            .mark_sent(&record.command_id, sent_at_ms)
            .await
            .map_err(|err| ControlError::Storage(err.to_string()))?;
        if sent {
            let entry = PendingCommand {
                command_id: record.command_id.clone(),
                device_address: record.device_address.clone(),
                envelope: envelope.clone(),
                deadline_ms: sent_at_ms + (timeout_seconds as i64) * 1000,
                retry_count: 0,
                max_retries,
                timeout_seconds,
            };
            self.pending
                .lock()
                .await
                .insert(record.command_id.clone(), entry);
        }
        self.log_outbound_frame(
            &record.command_id,
            &record.device_address,
            &envelope,
            &topic,
            sent_at_ms,
        )
        .await;
        info!(
            target: "pond.control",
            command_id = %record.command_id,
            device_address = %record.device_address,
            timeout_seconds = timeout_seconds,
            "command_sent"
        );

        Ok(CommandRecord {
            status: CommandStatus::Sent,
            sent_at_ms: Some(sent_at_ms),
            ..record
        })
    }

    /// 处理设备确认帧。
    ///
    /// 未知或已终态的命令记为 no-op；成功确认先流转 ACKNOWLEDGED 再 COMPLETED，
    /// 失败确认带错误详情进入 FAILED。
    pub async fn on_ack(&self, ack: &AckFrame) -> Result<(), ControlError> {
        let record = self
            .command_store
            .find_command(&ack.command_id)
            .await
            .map_err(|err| ControlError::Storage(err.to_string()))?;
        let Some(record) = record else {
            record_ack_unknown();
            warn!(
                target: "pond.control",
                command_id = %ack.command_id,
                "ack_unknown_command"
            );
            return Ok(());
        };
        if record.status.is_terminal() {
            info!(
                target: "pond.control",
                command_id = %record.command_id,
                status = %record.status,
                "ack_after_terminal_ignored"
            );
            return Ok(());
        }

        let now_ms = now_epoch_ms();
        if ack.success {
            let _ = self
                .command_store
                .acknowledge(&record.command_id, now_ms)
                .await
                .map_err(|err| ControlError::Storage(err.to_string()))?;
        }
        let resolved = self
            .command_store
            .complete(
                &record.command_id,
                ack.success,
                &ack.message,
                ack.error_code.as_deref(),
                ack.error_details
                    .as_ref()
                    .map(|value| value.to_string())
                    .as_deref(),
                now_ms,
            )
            .await
            .map_err(|err| ControlError::Storage(err.to_string()))?;
        if !resolved {
            // 确认与超时竞争：对方先流转，本次为 no-op
            info!(
                target: "pond.control",
                command_id = %record.command_id,
                "ack_lost_race_ignored"
            );
            return Ok(());
        }

        self.pending.lock().await.remove(&record.command_id);
        if ack.success {
            record_command_completed();
        } else {
            record_command_failed();
        }
        info!(
            target: "pond.control",
            command_id = %record.command_id,
            device_address = %record.device_address,
            success = ack.success,
            message = %ack.message,
            error_code = ?ack.error_code,
            "command_resolved"
        );
        self.notify_resolved(&record.command_id).await;
        Ok(())
    }

    /// 超时扫描。
    ///
    /// 对越过截止时间的在途命令重试（同一命令 ID、同一载荷），重试预算
    /// 耗尽后进入 TIMEOUT。同时对账持久层中不在索引内的孤儿 SENT 命令
    /// （进程重启丢失缓存），从记录重建载荷并适用同一策略。
    /// 上一轮仍在进行时跳过本轮。返回处理的命令数。
    pub async fn sweep_timeouts(&self, now_ms: i64) -> Result<usize, ControlError> {
        let Ok(_guard) = self.sweep_guard.try_lock() else {
            return Ok(0);
        };

        let mut due: Vec<PendingCommand> = {
            let pending = self.pending.lock().await;
            pending
                .values()
                .filter(|entry| entry.deadline_ms <= now_ms)
                .cloned()
                .collect()
        };

        // 孤儿对账：持久层已越期的 SENT 命令缺失于索引时重建条目
        let expired = self
            .command_store
            .list_expired_sent(now_ms)
            .await
            .map_err(|err| ControlError::Storage(err.to_string()))?;
        {
            let pending = self.pending.lock().await;
            for record in expired {
                if pending.contains_key(&record.command_id) {
                    continue;
                }
                info!(
                    target: "pond.control",
                    command_id = %record.command_id,
                    device_address = %record.device_address,
                    "orphaned_sent_command_reconciled"
                );
                due.push(PendingCommand {
                    command_id: record.command_id.clone(),
                    device_address: record.device_address.clone(),
                    envelope: envelope_for(&record, record.created_at_ms),
                    deadline_ms: record.deadline_ms().unwrap_or(now_ms),
                    retry_count: record.retry_count,
                    max_retries: record.max_retries,
                    timeout_seconds: record.timeout_seconds,
                });
            }
        }

        let mut processed = 0usize;
        for entry in due {
            processed += 1;
            if entry.retry_count < entry.max_retries {
                self.retry_command(entry).await?;
            } else {
                self.timeout_command(entry).await?;
            }
        }
        Ok(processed)
    }

    /// 当前在途命令条目。
    pub async fn pending_commands(&self) -> Vec<PendingCommand> {
        self.pending.lock().await.values().cloned().collect()
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn retry_command(&self, entry: PendingCommand) -> Result<(), ControlError> {
        let began = self
            .command_store
            .begin_retry(&entry.command_id)
            .await
            .map_err(|err| ControlError::Storage(err.to_string()))?;
        if !began {
            // 确认已先行流转，放弃重试
            self.pending.lock().await.remove(&entry.command_id);
            return Ok(());
        }
        record_command_retry();
        info!(
            target: "pond.control",
            command_id = %entry.command_id,
            device_address = %entry.device_address,
            retry = entry.retry_count + 1,
            max_retries = entry.max_retries,
            "command_retrying"
        );

        let topic = match self
            .publisher
            .publish_command(&entry.device_address, &entry.envelope)
            .await
        {
            Ok(topic) => topic,
            Err(err) => {
                record_command_publish_failure();
                let detail = err.to_string();
                let _ = self
                    .command_store
                    .complete(
                        &entry.command_id,
                        false,
                        "retry publish failed",
                        Some("E_PUBLISH"),
                        Some(&detail),
                        now_epoch_ms(),
                    )
                    .await;
                self.pending.lock().await.remove(&entry.command_id);
                record_command_failed();
                warn!(
                    target: "pond.control",
                    command_id = %entry.command_id,
                    error = %detail,
                    "command_retry_publish_failed"
                );
                self.notify_resolved(&entry.command_id).await;
                return Ok(());
            }
        };
        record_command_publish_success();

        let sent_at_ms = now_epoch_ms();
        self.log_outbound_frame(
            &entry.command_id,
            &entry.device_address,
            &entry.envelope,
            &topic,
            sent_at_ms,
        )
        .await;
        let sent = self
            .command_store
            .mark_sent(&entry.command_id, sent_at_ms)
            .await
            .map_err(|err| ControlError::Storage(err.to_string()))?;
        if sent {
            let mut pending = self.pending.lock().await;
            pending.insert(
                entry.command_id.clone(),
                PendingCommand {
                    deadline_ms: sent_at_ms + (entry.timeout_seconds as i64) * 1000,
                    retry_count: entry.retry_count + 1,
                    ..entry
                },
            );
        }
        Ok(())
    }

    async fn timeout_command(&self, entry: PendingCommand) -> Result<(), ControlError> {
        let timed_out = self
            .command_store
            .finalize_timeout(&entry.command_id, now_epoch_ms())
            .await
            .map_err(|err| ControlError::Storage(err.to_string()))?;
        self.pending.lock().await.remove(&entry.command_id);
        if !timed_out {
            return Ok(());
        }
        record_command_timed_out();
        warn!(
            target: "pond.control",
            command_id = %entry.command_id,
            device_address = %entry.device_address,
            retries = entry.retry_count,
            "command_timed_out"
        );
        self.notify_resolved(&entry.command_id).await;
        Ok(())
    }

    async fn notify_resolved(&self, command_id: &str) {
        match self.command_store.find_command(command_id).await {
            Ok(Some(record)) => self.observer.command_resolved(&record).await,
            Ok(None) => {}
            Err(err) => warn!(
                target: "pond.control",
                command_id = %command_id,
                error = %err,
                "resolved_command_reload_failed"
            ),
        }
    }

    async fn log_outbound_frame(
        &self,
        command_id: &str,
        device_address: &str,
        envelope: &CommandEnvelope,
        topic: &str,
        ts_ms: i64,
    ) {
        let payload = match serde_json::to_value(envelope) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(target: "pond.control", error = %err, "outbound_log_encode_failed");
                return;
            }
        };
        let mut log = MessageLogRecord::new(topic, LogDirection::Outbound, payload, ts_ms);
        log.device_address = Some(device_address.to_string());
        log.correlation_id = Some(command_id.to_string());
        if let Err(err) = self.message_log.append(log).await {
            warn!(target: "pond.control", error = %err, "outbound_log_append_failed");
        }
    }
}

/// 由命令记录构建线上报文（重试与孤儿对账复用同一载荷）。
fn envelope_for(record: &CommandRecord, ts_ms: i64) -> CommandEnvelope {
    CommandEnvelope {
        command_id: record.command_id.clone(),
        command_type: record.command_type.as_str().to_string(),
        position: record.position,
        parameters: record.parameters.clone(),
        timestamp: iso_timestamp(ts_ms),
    }
}

fn iso_timestamp(ts_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts_ms)
        .unwrap_or_else(chrono::Utc::now)
        .to_rfc3339()
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
