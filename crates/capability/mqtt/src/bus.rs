//! 消息总线抽象。
//!
//! 入站帧经总线转发给消费端做状态变更（主路径）；总线不可用时由
//! 调度器本地回退处理同一帧。内存实现为默认，Redis 发布/订阅实现
//! 用于多进程部署。

use crate::error::BusError;
use crate::topics::TopicCategory;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// 解码后的入站帧（解码一次，两条投递路径共用）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    pub topic: String,
    pub category: TopicCategory,
    pub device_address: String,
    pub payload: serde_json::Value,
    pub received_at_ms: i64,
}

/// 消息总线接口。
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// 转发一帧给消费端。
    async fn publish(&self, frame: &InboundFrame) -> Result<(), BusError>;

    /// 订阅帧流。
    async fn subscribe(&self) -> Result<mpsc::Receiver<InboundFrame>, BusError>;
}

const BUS_CHANNEL_CAPACITY: usize = 1024;

/// 进程内总线（mpsc）。
pub struct InMemoryBus {
    senders: Mutex<Vec<mpsc::Sender<InboundFrame>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, frame: &InboundFrame) -> Result<(), BusError> {
        let senders: Vec<mpsc::Sender<InboundFrame>> = {
            let mut guard = self
                .senders
                .lock()
                .map_err(|_| BusError::Publish("lock failed".to_string()))?;
            guard.retain(|sender| !sender.is_closed());
            guard.clone()
        };
        if senders.is_empty() {
            return Err(BusError::Publish("no subscribers".to_string()));
        }
        for sender in senders {
            sender
                .send(frame.clone())
                .await
                .map_err(|err| BusError::Publish(err.to_string()))?;
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<InboundFrame>, BusError> {
        let (tx, rx) = mpsc::channel(BUS_CHANNEL_CAPACITY);
        self.senders
            .lock()
            .map_err(|_| BusError::Subscribe("lock failed".to_string()))?
            .push(tx);
        Ok(rx)
    }
}

/// Redis 发布/订阅总线（帧以 JSON 编码）。
pub struct RedisBus {
    client: redis::Client,
    channel: String,
}

impl RedisBus {
    pub fn connect(redis_url: &str, channel: impl Into<String>) -> Result<Self, BusError> {
        let client =
            redis::Client::open(redis_url).map_err(|err| BusError::Subscribe(err.to_string()))?;
        Ok(Self {
            client,
            channel: channel.into(),
        })
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, frame: &InboundFrame) -> Result<(), BusError> {
        let payload =
            serde_json::to_string(frame).map_err(|err| BusError::Encode(err.to_string()))?;
        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| BusError::Publish(err.to_string()))?;
        let receivers = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(payload)
            .query_async::<_, i64>(&mut connection)
            .await
            .map_err(|err| BusError::Publish(err.to_string()))?;
        ensure_delivered(receivers)
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<InboundFrame>, BusError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|err| BusError::Subscribe(err.to_string()))?;
        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|err| BusError::Subscribe(err.to_string()))?;

        let (tx, rx) = mpsc::channel(BUS_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(message) = stream.next().await {
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(target: "pond.mqtt", error = %err, "bus_payload_read_failed");
                        continue;
                    }
                };
                let frame: InboundFrame = match serde_json::from_str(&payload) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(target: "pond.mqtt", error = %err, "bus_frame_decode_failed");
                        continue;
                    }
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

/// PUBLISH 回执为接收端数量；无人订阅视为投递失败，交由调度器本地回退。
fn ensure_delivered(receivers: i64) -> Result<(), BusError> {
    if receivers > 0 {
        Ok(())
    } else {
        Err(BusError::Publish("no subscribers".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_receivers_is_a_publish_failure() {
        assert!(matches!(ensure_delivered(0), Err(BusError::Publish(_))));
        assert!(ensure_delivered(1).is_ok());
        assert!(ensure_delivered(3).is_ok());
    }
}
