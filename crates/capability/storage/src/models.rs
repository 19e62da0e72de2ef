//! 数据模型
//!
//! 定义协议层持久化的数据模型：
//! - 设备模型：DeviceRecord（地址、状态、元信息、错误计数）
//! - 命令模型：CommandRecord（生命周期状态、超时/重试预算、结果）
//! - 报文日志模型：MessageLogRecord（入站/出站帧审计，按龄裁剪）
//! - 传感器读数模型：SensorReadingRecord（一帧一行，不可变）

use domain::{CommandStatus, CommandType, DeviceMetadata, DeviceState, LogDirection};

/// 设备记录（以规范化硬件地址为主键，只停用不删除）。
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub address: String,
    pub name: String,
    pub state: DeviceState,
    pub last_seen_at_ms: Option<i64>,
    pub metadata: DeviceMetadata,
    pub error_count: i32,
    pub last_error: Option<String>,
    pub last_error_at_ms: Option<i64>,
    pub active: bool,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl DeviceRecord {
    /// 以默认值创建新设备记录（初始离线、无元信息）。
    pub fn new(address: impl Into<String>, name: impl Into<String>, ts_ms: i64) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            state: DeviceState::Offline,
            last_seen_at_ms: None,
            metadata: DeviceMetadata::default(),
            error_count: 0,
            last_error: None,
            last_error_at_ms: None,
            active: true,
            created_at_ms: ts_ms,
            updated_at_ms: ts_ms,
        }
    }

    /// 非破坏性合并元信息：只覆盖报文中出现的字段。
    pub fn merge_metadata(&mut self, incoming: &DeviceMetadata) {
        if let Some(value) = &incoming.firmware_version {
            self.metadata.firmware_version = Some(value.clone());
        }
        if let Some(value) = &incoming.hardware_version {
            self.metadata.hardware_version = Some(value.clone());
        }
        if let Some(value) = &incoming.device_name {
            self.metadata.device_name = Some(value.clone());
        }
        if let Some(value) = &incoming.ip_address {
            self.metadata.ip_address = Some(value.clone());
        }
        if let Some(value) = &incoming.wifi_ssid {
            self.metadata.wifi_ssid = Some(value.clone());
        }
        if let Some(value) = incoming.wifi_signal_strength {
            self.metadata.wifi_signal_strength = Some(value);
        }
        if let Some(value) = incoming.free_heap {
            self.metadata.free_heap = Some(value);
        }
        if let Some(value) = incoming.cpu_frequency {
            self.metadata.cpu_frequency = Some(value);
        }
    }
}

/// 命令记录。
///
/// 命令 ID 在整个生命周期内唯一；进入终态后记录不可变，
/// 仅作为审计痕迹保留（不删除）。
#[derive(Debug, Clone)]
pub struct CommandRecord {
    pub command_id: String,
    pub device_address: String,
    pub position: u8,
    pub command_type: CommandType,
    pub parameters: serde_json::Value,
    pub status: CommandStatus,
    pub timeout_seconds: u32,
    pub max_retries: u32,
    pub retry_count: u32,
    pub success: Option<bool>,
    pub result_message: Option<String>,
    pub error_code: Option<String>,
    pub error_details: Option<String>,
    /// 触发本命令的自动化执行（外部协作方的回溯引用）。
    pub execution_id: Option<String>,
    pub issued_by: Option<String>,
    pub created_at_ms: i64,
    pub sent_at_ms: Option<i64>,
    pub acknowledged_at_ms: Option<i64>,
    pub completed_at_ms: Option<i64>,
}

impl CommandRecord {
    /// 当前发送轮次的截止时间（未发送时为 None）。
    pub fn deadline_ms(&self) -> Option<i64> {
        self.sent_at_ms
            .map(|sent| sent + (self.timeout_seconds as i64) * 1000)
    }
}

/// 报文日志记录（仅追加，按保留期裁剪）。
#[derive(Debug, Clone)]
pub struct MessageLogRecord {
    pub message_id: String,
    pub device_address: Option<String>,
    pub topic: String,
    pub direction: LogDirection,
    pub payload: serde_json::Value,
    pub payload_size: i64,
    pub success: bool,
    pub error_message: Option<String>,
    /// 关联的命令 ID（命令下发与确认帧）。
    pub correlation_id: Option<String>,
    pub created_at_ms: i64,
}

impl MessageLogRecord {
    pub fn new(
        topic: impl Into<String>,
        direction: LogDirection,
        payload: serde_json::Value,
        ts_ms: i64,
    ) -> Self {
        let payload_size = payload.to_string().len() as i64;
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            device_address: None,
            topic: topic.into(),
            direction,
            payload,
            payload_size,
            success: true,
            error_message: None,
            correlation_id: None,
            created_at_ms: ts_ms,
        }
    }
}

/// 传感器读数记录（写入后不可变）。
#[derive(Debug, Clone)]
pub struct SensorReadingRecord {
    pub reading_id: String,
    pub device_address: String,
    pub temperature: Option<f64>,
    pub water_level: Option<f64>,
    pub water_level2: Option<f64>,
    pub feed_level: Option<f64>,
    pub feed_level2: Option<f64>,
    pub dissolved_oxygen: Option<f64>,
    pub ph: Option<f64>,
    pub battery: Option<f64>,
    pub signal_strength: Option<i32>,
    /// 设备侧上报时间（原样保留）。
    pub device_timestamp: Option<String>,
    pub received_at_ms: i64,
}
