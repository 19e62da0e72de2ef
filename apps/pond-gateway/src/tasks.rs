//! 常驻后台任务：超时扫描、离线扫描、日志裁剪。
//!
//! 每个任务都是可取消的 tokio 任务，订阅关闭信号后干净退出。

use pond_control::CommandLifecycle;
use pond_presence::PresenceTracker;
use pond_storage::MessageLogStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 命令超时扫描任务。
pub fn spawn_timeout_sweep(
    lifecycle: Arc<CommandLifecycle>,
    interval_seconds: u64,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match lifecycle.sweep_timeouts(now_epoch_ms()).await {
                        Ok(processed) if processed > 0 => {
                            info!(
                                target: "pond.gateway",
                                processed = processed,
                                "timeout_sweep_completed"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(target: "pond.gateway", error = %err, "timeout_sweep_failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    })
}

/// 设备离线扫描任务。
pub fn spawn_offline_sweep(
    presence: Arc<PresenceTracker>,
    interval_seconds: u64,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match presence.sweep_offline(now_epoch_ms()).await {
                        Ok(flipped) if flipped > 0 => {
                            info!(
                                target: "pond.gateway",
                                flipped = flipped,
                                "offline_sweep_completed"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(target: "pond.gateway", error = %err, "offline_sweep_failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    })
}

/// 报文日志按龄裁剪任务。
pub fn spawn_log_prune(
    message_log: Arc<dyn MessageLogStore>,
    retention_days: u64,
    interval_seconds: u64,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(60)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cutoff_ms =
                        now_epoch_ms() - (retention_days as i64) * 24 * 60 * 60 * 1000;
                    match message_log.prune_older_than(cutoff_ms).await {
                        Ok(removed) if removed > 0 => {
                            info!(
                                target: "pond.gateway",
                                removed = removed,
                                retention_days = retention_days,
                                "message_log_pruned"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(target: "pond.gateway", error = %err, "log_prune_failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    })
}

pub fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
