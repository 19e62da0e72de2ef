//! 传输会话。
//!
//! 持有唯一的 MQTT 连接：状态机 `Disconnected → Connecting → Connected`，
//! 事件循环内做指数退避重连，退避预算耗尽进入 `Failed` 终态并停止服务
//! （运维可见的致命信号）。接收路径不做任何阻塞工作，入站帧全部交给
//! 调度器处理。

use crate::error::SessionError;
use crate::topics::subscription_filters;
use async_trait::async_trait;
use pond_telemetry::record_reconnect;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// 会话状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    /// 重连预算耗尽，会话停止服务。
    Failed,
}

/// 会话配置。
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub topic_prefix: String,
    pub keepalive_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub max_reconnect_attempts: u32,
}

/// 入站帧处理器（由调度器实现；必须立即返回，不做阻塞工作）。
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, topic: &str, payload: &[u8]);
}

/// MQTT 传输会话。
pub struct MqttSession {
    client: AsyncClient,
    state_rx: watch::Receiver<SessionState>,
    shutdown_tx: watch::Sender<bool>,
}

impl MqttSession {
    /// 建立会话并有界等待 broker ConnAck。
    ///
    /// 等待超时返回错误；事件循环仍在后台按退避策略重连，
    /// 调用方可通过 `watch_state` 观察后续状态。
    pub async fn connect(
        config: SessionConfig,
        handler: Arc<dyn InboundHandler>,
    ) -> Result<Self, SessionError> {
        let client_id = format!("pond-gateway-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keepalive_seconds.max(5)));
        if let (Some(username), Some(password)) =
            (config.username.clone(), config.password.clone())
        {
            options.set_credentials(username, password);
        }
        if config.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, eventloop) = AsyncClient::new(options, 64);
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            handler,
            config.clone(),
            state_tx,
            shutdown_rx,
        ));

        let session = Self {
            client,
            state_rx,
            shutdown_tx,
        };
        let connected = session
            .wait_for_state(
                SessionState::Connected,
                Duration::from_secs(config.connect_timeout_seconds.max(1)),
            )
            .await;
        if !connected {
            return Err(SessionError::Connect(format!(
                "no ConnAck from {}:{} within {}s",
                config.host, config.port, config.connect_timeout_seconds
            )));
        }
        Ok(session)
    }

    /// 当前会话状态。
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// 状态观察句柄。
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// 发布一帧；断开时立即返回 `NotConnected`。
    ///
    /// 返回的是本地入队结果，投递保证由所选 QoS 承担。
    pub async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.client
            .publish(topic, qos, retain, payload)
            .await
            .map_err(|err| SessionError::Publish(err.to_string()))
    }

    /// 干净停止会话（幂等）。
    pub async fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.client.disconnect().await;
    }

    async fn wait_for_state(&self, target: SessionState, timeout: Duration) -> bool {
        let mut state_rx = self.state_rx.clone();
        if *state_rx.borrow() == target {
            return true;
        }
        let wait = async {
            while state_rx.changed().await.is_ok() {
                let current = *state_rx.borrow();
                if current == target || current == SessionState::Failed {
                    return current == target;
                }
            }
            false
        };
        tokio::time::timeout(timeout, wait).await.unwrap_or(false)
    }
}

async fn run_event_loop(
    mut eventloop: rumqttc::EventLoop,
    client: AsyncClient,
    handler: Arc<dyn InboundHandler>,
    config: SessionConfig,
    state_tx: watch::Sender<SessionState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    loop {
        let event = tokio::select! {
            event = eventloop.poll() => event,
            _ = wait_shutdown(&mut shutdown_rx) => {
                let _ = state_tx.send(SessionState::Disconnected);
                info!(target: "pond.mqtt", "session_stopped");
                return;
            }
        };
        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                attempt = 0;
                let _ = state_tx.send(SessionState::Connected);
                info!(
                    target: "pond.mqtt",
                    host = %config.host,
                    port = config.port,
                    "session_connected"
                );
                for (filter, qos) in subscription_filters(&config.topic_prefix) {
                    if let Err(err) = client.subscribe(filter.clone(), qos).await {
                        warn!(
                            target: "pond.mqtt",
                            filter = %filter,
                            error = %err,
                            "subscribe_failed"
                        );
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handler.handle(&publish.topic, &publish.payload).await;
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                let _ = state_tx.send(SessionState::Disconnected);
                warn!(target: "pond.mqtt", "broker_disconnect");
            }
            Ok(_) => {}
            Err(err) => {
                attempt += 1;
                if attempt > config.max_reconnect_attempts {
                    let _ = state_tx.send(SessionState::Failed);
                    error!(
                        target: "pond.mqtt",
                        attempts = attempt - 1,
                        error = %err,
                        "reconnect_budget_exhausted"
                    );
                    return;
                }
                let _ = state_tx.send(SessionState::Connecting);
                record_reconnect();
                let delay_ms = backoff_delay_ms(&config, attempt);
                warn!(
                    target: "pond.mqtt",
                    attempt = attempt,
                    delay_ms = delay_ms,
                    error = %err,
                    "session_reconnecting"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// 等待关闭信号；发送端被丢弃（会话句柄未经 disconnect 即被释放）视同关闭。
async fn wait_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
        if *shutdown_rx.borrow() {
            return;
        }
    }
}

/// 第 attempt 次重连前的退避延迟：`min(base * 2^(attempt-1), max)`。
fn backoff_delay_ms(config: &SessionConfig, attempt: u32) -> u64 {
    config
        .reconnect_base_delay_ms
        .saturating_mul(1u64 << (attempt - 1).min(16))
        .min(config.reconnect_max_delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = SessionConfig {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            use_tls: false,
            topic_prefix: "ff".to_string(),
            keepalive_seconds: 60,
            connect_timeout_seconds: 10,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 120_000,
            max_reconnect_attempts: 10,
        };
        assert_eq!(backoff_delay_ms(&config, 1), 1_000);
        assert_eq!(backoff_delay_ms(&config, 2), 2_000);
        assert_eq!(backoff_delay_ms(&config, 7), 64_000);
        assert_eq!(backoff_delay_ms(&config, 8), 120_000);
        assert_eq!(backoff_delay_ms(&config, 10), 120_000);
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_counts_as_shutdown() {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_millis(100), wait_shutdown(&mut shutdown_rx))
            .await
            .expect("closed channel resolves the wait");
    }

    #[tokio::test]
    async fn shutdown_wait_ignores_false_updates() {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        shutdown_tx.send(false).expect("send");
        assert!(
            tokio::time::timeout(Duration::from_millis(50), wait_shutdown(&mut shutdown_rx))
                .await
                .is_err()
        );
        shutdown_tx.send(true).expect("send");
        tokio::time::timeout(Duration::from_millis(100), wait_shutdown(&mut shutdown_rx))
            .await
            .expect("true resolves the wait");
    }
}
