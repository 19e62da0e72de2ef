//! 入站帧调度。
//!
//! 每帧解码一次，经主题路由分类后提交给有界工作池：
//! 主路径转发到消息总线（消费端做状态变更），总线失败时用同一帧
//! 本地回退处理。畸形载荷告警丢弃。

use crate::bus::{InboundFrame, MessageBus};
use crate::codec;
use crate::session::InboundHandler;
use crate::topics::{TopicCategory, parse_topic};
use async_trait::async_trait;
use domain::LogDirection;
use pond_control::CommandLifecycle;
use pond_ingest::SensorIngest;
use pond_presence::PresenceTracker;
use pond_storage::{MessageLogRecord, MessageLogStore};
use pond_telemetry::{
    record_frame_dropped_invalid, record_frame_received, record_frame_relay_fallback,
    record_frame_relayed,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// 帧处理器：按类别对入站帧做状态变更。
///
/// 总线消费端与本地回退路径共用同一实现。
pub struct FrameProcessor {
    presence: Arc<PresenceTracker>,
    ingest: Arc<SensorIngest>,
    control: Arc<CommandLifecycle>,
    message_log: Arc<dyn MessageLogStore>,
}

impl FrameProcessor {
    pub fn new(
        presence: Arc<PresenceTracker>,
        ingest: Arc<SensorIngest>,
        control: Arc<CommandLifecycle>,
        message_log: Arc<dyn MessageLogStore>,
    ) -> Self {
        Self {
            presence,
            ingest,
            control,
            message_log,
        }
    }

    /// 处理一帧。
    pub async fn process(&self, frame: &InboundFrame) {
        self.append_log(frame).await;

        // 后端侧回流帧（命令下发与阈值联动经通配订阅回流）只留审计，
        // 不计入设备活跃：静默设备不能被自己收到的重试帧续命
        if matches!(
            frame.category,
            TopicCategory::Commands | TopicCategory::Threshold
        ) {
            return;
        }

        // 设备侧入站帧刷新设备活跃时间
        let known = match self
            .presence
            .touch(&frame.device_address, frame.received_at_ms)
            .await
        {
            Ok(known) => known,
            Err(err) => {
                warn!(
                    target: "pond.mqtt",
                    device_address = %frame.device_address,
                    error = %err,
                    "presence_touch_failed"
                );
                return;
            }
        };
        if !known {
            return;
        }

        match frame.category {
            TopicCategory::Heartbeat | TopicCategory::Startup => {
                match codec::metadata_from_value(&frame.payload) {
                    Ok(metadata) => {
                        if let Err(err) = self
                            .presence
                            .mark_online(&frame.device_address, &metadata, frame.received_at_ms)
                            .await
                        {
                            warn!(
                                target: "pond.mqtt",
                                device_address = %frame.device_address,
                                error = %err,
                                "heartbeat_apply_failed"
                            );
                        }
                    }
                    Err(err) => {
                        record_frame_dropped_invalid();
                        warn!(
                            target: "pond.mqtt",
                            topic = %frame.topic,
                            error = %err,
                            "heartbeat_frame_invalid"
                        );
                    }
                }
            }
            TopicCategory::Sensors => match codec::sensor_from_value(&frame.payload) {
                Ok(sensor) => {
                    if let Err(err) = self
                        .ingest
                        .ingest(&frame.device_address, &sensor, frame.received_at_ms)
                        .await
                    {
                        warn!(
                            target: "pond.mqtt",
                            device_address = %frame.device_address,
                            error = %err,
                            "sensor_ingest_failed"
                        );
                    }
                }
                Err(err) => {
                    record_frame_dropped_invalid();
                    warn!(
                        target: "pond.mqtt",
                        topic = %frame.topic,
                        error = %err,
                        "sensor_frame_invalid"
                    );
                }
            },
            TopicCategory::Ack | TopicCategory::Complete => {
                match codec::ack_from_value(&frame.payload) {
                    Ok(ack) => {
                        if let Err(err) = self.control.on_ack(&ack).await {
                            warn!(
                                target: "pond.mqtt",
                                command_id = %ack.command_id,
                                error = %err,
                                "ack_processing_failed"
                            );
                        }
                    }
                    Err(err) => {
                        record_frame_dropped_invalid();
                        warn!(
                            target: "pond.mqtt",
                            topic = %frame.topic,
                            error = %err,
                            "ack_frame_invalid"
                        );
                    }
                }
            }
            TopicCategory::Status => {
                // 设备上报的错误进入设备错误计数，其余状态帧仅留审计
                match frame.payload.get("error").and_then(|value| value.as_str()) {
                    Some(message) => {
                        if let Err(err) = self
                            .presence
                            .record_error(&frame.device_address, message, frame.received_at_ms)
                            .await
                        {
                            warn!(
                                target: "pond.mqtt",
                                device_address = %frame.device_address,
                                error = %err,
                                "status_error_record_failed"
                            );
                        }
                    }
                    None => {
                        info!(
                            target: "pond.mqtt",
                            device_address = %frame.device_address,
                            "status_frame"
                        );
                    }
                }
            }
            TopicCategory::Commands | TopicCategory::Threshold => {}
        }
    }

    async fn append_log(&self, frame: &InboundFrame) {
        let mut log = MessageLogRecord::new(
            frame.topic.clone(),
            LogDirection::Inbound,
            frame.payload.clone(),
            frame.received_at_ms,
        );
        log.device_address = Some(frame.device_address.clone());
        if matches!(frame.category, TopicCategory::Ack | TopicCategory::Complete) {
            log.correlation_id = frame
                .payload
                .get("command_id")
                .and_then(|value| value.as_str())
                .map(str::to_string);
        }
        if let Err(err) = self.message_log.append(log).await {
            warn!(target: "pond.mqtt", error = %err, "inbound_log_append_failed");
        }
    }
}

/// 入站帧调度器。
pub struct Dispatcher {
    topic_prefix: String,
    bus: Arc<dyn MessageBus>,
    processor: Arc<FrameProcessor>,
    workers: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        topic_prefix: impl Into<String>,
        bus: Arc<dyn MessageBus>,
        processor: Arc<FrameProcessor>,
        worker_pool_size: usize,
    ) -> Self {
        Self {
            topic_prefix: topic_prefix.into(),
            bus,
            processor,
            workers: Arc::new(Semaphore::new(worker_pool_size.max(1))),
        }
    }

    /// 消费总线帧流（主路径消费端，gateway 内作为常驻任务运行）。
    pub async fn run_bus_consumer(processor: Arc<FrameProcessor>, bus: Arc<dyn MessageBus>) {
        let mut rx = match bus.subscribe().await {
            Ok(rx) => rx,
            Err(err) => {
                warn!(target: "pond.mqtt", error = %err, "bus_subscribe_failed");
                return;
            }
        };
        while let Some(frame) = rx.recv().await {
            processor.process(&frame).await;
        }
    }
}

#[async_trait]
impl InboundHandler for Dispatcher {
    async fn handle(&self, topic: &str, payload: &[u8]) {
        record_frame_received();
        let Some((device_address, category)) = parse_topic(&self.topic_prefix, topic) else {
            record_frame_dropped_invalid();
            warn!(target: "pond.mqtt", topic = %topic, "topic_unroutable");
            return;
        };
        // 单次解码，两条投递路径共用
        let payload = match codec::decode_json(payload) {
            Ok(payload) => payload,
            Err(err) => {
                record_frame_dropped_invalid();
                warn!(
                    target: "pond.mqtt",
                    topic = %topic,
                    error = %err,
                    "frame_payload_invalid"
                );
                return;
            }
        };
        let frame = InboundFrame {
            topic: topic.to_string(),
            category,
            device_address,
            payload,
            received_at_ms: now_epoch_ms(),
        };

        let Ok(permit) = self.workers.clone().acquire_owned().await else {
            return;
        };
        let bus = self.bus.clone();
        let processor = self.processor.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match bus.publish(&frame).await {
                Ok(()) => record_frame_relayed(),
                Err(err) => {
                    record_frame_relay_fallback();
                    warn!(
                        target: "pond.mqtt",
                        topic = %frame.topic,
                        error = %err,
                        "bus_publish_failed_local_fallback"
                    );
                    processor.process(&frame).await;
                }
            }
        });
    }
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
