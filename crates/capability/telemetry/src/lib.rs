//! 追踪初始化与协议层基础指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_dropped_invalid: u64,
    pub frames_relayed: u64,
    pub frames_relay_fallback: u64,
    pub commands_issued: u64,
    pub command_publish_success: u64,
    pub command_publish_failure: u64,
    pub command_retries: u64,
    pub commands_completed: u64,
    pub commands_failed: u64,
    pub commands_timed_out: u64,
    pub acks_unknown: u64,
    pub readings_stored: u64,
    pub threshold_dispatches: u64,
    pub devices_marked_offline: u64,
    pub reconnects: u64,
}

/// 基础指标。
pub struct TelemetryMetrics {
    frames_received: AtomicU64,
    frames_dropped_invalid: AtomicU64,
    frames_relayed: AtomicU64,
    frames_relay_fallback: AtomicU64,
    commands_issued: AtomicU64,
    command_publish_success: AtomicU64,
    command_publish_failure: AtomicU64,
    command_retries: AtomicU64,
    commands_completed: AtomicU64,
    commands_failed: AtomicU64,
    commands_timed_out: AtomicU64,
    acks_unknown: AtomicU64,
    readings_stored: AtomicU64,
    threshold_dispatches: AtomicU64,
    devices_marked_offline: AtomicU64,
    reconnects: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            frames_dropped_invalid: AtomicU64::new(0),
            frames_relayed: AtomicU64::new(0),
            frames_relay_fallback: AtomicU64::new(0),
            commands_issued: AtomicU64::new(0),
            command_publish_success: AtomicU64::new(0),
            command_publish_failure: AtomicU64::new(0),
            command_retries: AtomicU64::new(0),
            commands_completed: AtomicU64::new(0),
            commands_failed: AtomicU64::new(0),
            commands_timed_out: AtomicU64::new(0),
            acks_unknown: AtomicU64::new(0),
            readings_stored: AtomicU64::new(0),
            threshold_dispatches: AtomicU64::new(0),
            devices_marked_offline: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped_invalid: self.frames_dropped_invalid.load(Ordering::Relaxed),
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            frames_relay_fallback: self.frames_relay_fallback.load(Ordering::Relaxed),
            commands_issued: self.commands_issued.load(Ordering::Relaxed),
            command_publish_success: self.command_publish_success.load(Ordering::Relaxed),
            command_publish_failure: self.command_publish_failure.load(Ordering::Relaxed),
            command_retries: self.command_retries.load(Ordering::Relaxed),
            commands_completed: self.commands_completed.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            commands_timed_out: self.commands_timed_out.load(Ordering::Relaxed),
            acks_unknown: self.acks_unknown.load(Ordering::Relaxed),
            readings_stored: self.readings_stored.load(Ordering::Relaxed),
            threshold_dispatches: self.threshold_dispatches.load(Ordering::Relaxed),
            devices_marked_offline: self.devices_marked_offline.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录收到入站帧。
pub fn record_frame_received() {
    metrics().frames_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录非法帧丢弃。
pub fn record_frame_dropped_invalid() {
    metrics()
        .frames_dropped_invalid
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录帧经消息总线转发。
pub fn record_frame_relayed() {
    metrics().frames_relayed.fetch_add(1, Ordering::Relaxed);
}

/// 记录总线不可用时的本地回退处理。
pub fn record_frame_relay_fallback() {
    metrics()
        .frames_relay_fallback
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录新命令创建。
pub fn record_command_issued() {
    metrics().commands_issued.fetch_add(1, Ordering::Relaxed);
}

/// 记录命令发布成功。
pub fn record_command_publish_success() {
    metrics()
        .command_publish_success
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录命令发布失败。
pub fn record_command_publish_failure() {
    metrics()
        .command_publish_failure
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录命令重试。
pub fn record_command_retry() {
    metrics().command_retries.fetch_add(1, Ordering::Relaxed);
}

/// 记录命令完成。
pub fn record_command_completed() {
    metrics().commands_completed.fetch_add(1, Ordering::Relaxed);
}

/// 记录命令失败。
pub fn record_command_failed() {
    metrics().commands_failed.fetch_add(1, Ordering::Relaxed);
}

/// 记录命令超时。
pub fn record_command_timed_out() {
    metrics().commands_timed_out.fetch_add(1, Ordering::Relaxed);
}

/// 记录未知命令确认。
pub fn record_ack_unknown() {
    metrics().acks_unknown.fetch_add(1, Ordering::Relaxed);
}

/// 记录传感器读数入库。
pub fn record_reading_stored() {
    metrics().readings_stored.fetch_add(1, Ordering::Relaxed);
}

/// 记录阈值评估转交。
pub fn record_threshold_dispatch() {
    metrics()
        .threshold_dispatches
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录设备被判离线。
pub fn record_device_marked_offline() {
    metrics()
        .devices_marked_offline
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录传输层重连。
pub fn record_reconnect() {
    metrics().reconnects.fetch_add(1, Ordering::Relaxed);
}
