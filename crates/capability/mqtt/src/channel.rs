//! 命令发布通道。
//!
//! 生命周期管理层的 `CommandPublisher` 实现：命令报文以 QoS 2 发布到
//! 设备命令主题。会话在装配后期建立，先创建通道再绑定会话。

use crate::codec::encode_envelope;
use crate::session::MqttSession;
use crate::topics::{TopicCategory, topic_for};
use async_trait::async_trait;
use domain::wire::CommandEnvelope;
use pond_control::{CommandPublisher, ControlError};
use rumqttc::QoS;
use std::sync::{Arc, OnceLock};

/// MQTT 命令发布通道。
pub struct CommandChannel {
    topic_prefix: String,
    session: OnceLock<Arc<MqttSession>>,
}

impl CommandChannel {
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self {
            topic_prefix: topic_prefix.into(),
            session: OnceLock::new(),
        }
    }

    /// 绑定传输会话（只绑定一次）。
    pub fn bind(&self, session: Arc<MqttSession>) {
        let _ = self.session.set(session);
    }
}

#[async_trait]
impl CommandPublisher for CommandChannel {
    fn is_connected(&self) -> bool {
        self.session
            .get()
            .map(|session| session.is_connected())
            .unwrap_or(false)
    }

    async fn publish_command(
        &self,
        device_address: &str,
        envelope: &CommandEnvelope,
    ) -> Result<String, ControlError> {
        let Some(session) = self.session.get() else {
            return Err(ControlError::NotConnected);
        };
        let topic = topic_for(&self.topic_prefix, device_address, TopicCategory::Commands);
        let payload =
            encode_envelope(envelope).map_err(|err| ControlError::Payload(err.to_string()))?;
        session
            .publish(&topic, QoS::ExactlyOnce, false, payload)
            .await
            .map_err(|err| match err {
                crate::error::SessionError::NotConnected => ControlError::NotConnected,
                other => ControlError::Dispatch(other.to_string()),
            })?;
        Ok(topic)
    }
}
