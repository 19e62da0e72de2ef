//! 存储接口 Trait 定义
//!
//! 定义协议层所有资源存储的异步接口：
//! - DeviceStore：设备存储（状态/元信息/错误计数）
//! - CommandStore：命令存储（带守卫的状态流转）
//! - MessageLogStore：报文日志存储（追加 + 按龄裁剪）
//! - SensorReadingStore：传感器读数存储
//!
//! 设计原则：
//! - 状态流转接口采用 compare-and-set 语义（`from` 状态不匹配即返回 false），
//!   保证一条命令恰好被解析一次（确认与超时竞争时先到者生效）
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use crate::models::{CommandRecord, DeviceRecord, MessageLogRecord, SensorReadingRecord};
use async_trait::async_trait;
use domain::{CommandStatus, DeviceMetadata, DeviceState};

/// 设备存储接口
///
/// 设备由带外流程注册；协议层只更新状态与元信息，从不删除。
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// 注册新设备
    async fn create_device(&self, record: DeviceRecord) -> Result<DeviceRecord, StorageError>;

    /// 按地址查找设备
    async fn find_device(&self, address: &str) -> Result<Option<DeviceRecord>, StorageError>;

    /// 列出所有设备
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>, StorageError>;

    /// 列出指定状态的设备
    async fn list_by_state(&self, state: DeviceState) -> Result<Vec<DeviceRecord>, StorageError>;

    /// 合并元信息并置为在线（非破坏性：只覆盖报文出现的字段）
    async fn apply_metadata(
        &self,
        address: &str,
        metadata: &DeviceMetadata,
        ts_ms: i64,
    ) -> Result<Option<DeviceRecord>, StorageError>;

    /// 刷新最后活跃时间并置为在线
    async fn touch(&self, address: &str, ts_ms: i64) -> Result<bool, StorageError>;

    /// 将在线设备置为离线（仅 ONLINE → OFFLINE）
    async fn mark_offline(&self, address: &str) -> Result<bool, StorageError>;

    /// 记录设备错误（错误计数 +1，状态置为 ERROR）
    async fn record_error(
        &self,
        address: &str,
        message: &str,
        ts_ms: i64,
    ) -> Result<bool, StorageError>;

    /// 停用设备（不删除）
    async fn deactivate_device(&self, address: &str) -> Result<bool, StorageError>;
}

/// 命令存储接口
///
/// 所有流转接口都是守卫式更新：当前状态不满足前置条件时返回 false，
/// 调用方据此将第二次解析视为 no-op。
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// 创建新命令（初始 PENDING）
    async fn create_command(&self, record: CommandRecord) -> Result<CommandRecord, StorageError>;

    /// 按命令 ID 查找
    async fn find_command(&self, command_id: &str) -> Result<Option<CommandRecord>, StorageError>;

    /// PENDING → SENT，记录发送时间
    async fn mark_sent(&self, command_id: &str, ts_ms: i64) -> Result<bool, StorageError>;

    /// SENT → ACKNOWLEDGED，记录确认时间
    async fn acknowledge(&self, command_id: &str, ts_ms: i64) -> Result<bool, StorageError>;

    /// SENT → PENDING，重试计数 +1，清除发送/确认时间
    async fn begin_retry(&self, command_id: &str) -> Result<bool, StorageError>;

    /// SENT → TIMEOUT（重试耗尽），记录完成时间
    async fn finalize_timeout(&self, command_id: &str, ts_ms: i64) -> Result<bool, StorageError>;

    /// 非终态 → COMPLETED / FAILED，写入结果与错误详情
    async fn complete(
        &self,
        command_id: &str,
        success: bool,
        message: &str,
        error_code: Option<&str>,
        error_details: Option<&str>,
        ts_ms: i64,
    ) -> Result<bool, StorageError>;

    /// 按状态列出命令（按创建时间倒序）
    async fn list_by_status(
        &self,
        status: CommandStatus,
        limit: i64,
    ) -> Result<Vec<CommandRecord>, StorageError>;

    /// 列出已越过截止时间的 SENT 命令（供超时扫描对账）
    async fn list_expired_sent(&self, now_ms: i64) -> Result<Vec<CommandRecord>, StorageError>;
}

/// 报文日志存储接口
#[async_trait]
pub trait MessageLogStore: Send + Sync {
    /// 追加一条日志
    async fn append(&self, record: MessageLogRecord) -> Result<MessageLogRecord, StorageError>;

    /// 最近的日志（按创建时间倒序）
    async fn list_recent(&self, limit: i64) -> Result<Vec<MessageLogRecord>, StorageError>;

    /// 裁剪早于截止时间的日志，返回删除条数
    async fn prune_older_than(&self, cutoff_ms: i64) -> Result<u64, StorageError>;
}

/// 传感器读数存储接口
#[async_trait]
pub trait SensorReadingStore: Send + Sync {
    /// 写入一条读数
    async fn create_reading(
        &self,
        record: SensorReadingRecord,
    ) -> Result<SensorReadingRecord, StorageError>;

    /// 指定设备最近的读数（按接收时间倒序）
    async fn list_recent(
        &self,
        address: &str,
        limit: i64,
    ) -> Result<Vec<SensorReadingRecord>, StorageError>;
}
