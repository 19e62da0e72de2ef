//! 传感器读数入库与阈值触发转交。
//!
//! 一帧一条读数：越界测量值从读数中剔除并告警，帧内其余测量值照常入库。
//! 入库后对每个有效测量值做一次异步阈值转交（短延迟保证写入先提交）。

use async_trait::async_trait;
use domain::wire::{SensorFrame, in_valid_range};
use pond_storage::{DeviceStore, SensorReadingRecord, SensorReadingStore};
use pond_telemetry::{record_reading_stored, record_threshold_dispatch};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 入库链路错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// 阈值评估协作方（自动化层注入）。
#[async_trait]
pub trait ThresholdEvaluator: Send + Sync {
    async fn evaluate(&self, device_address: &str, parameter: &str, value: f64);
}

/// 空评估器。
#[derive(Debug, Default)]
pub struct NoopEvaluator;

#[async_trait]
impl ThresholdEvaluator for NoopEvaluator {
    async fn evaluate(&self, _device_address: &str, _parameter: &str, _value: f64) {}
}

/// 传感器入库器。
pub struct SensorIngest {
    device_store: Arc<dyn DeviceStore>,
    sensor_store: Arc<dyn SensorReadingStore>,
    evaluator: Arc<dyn ThresholdEvaluator>,
    dispatch_delay_ms: u64,
}

impl SensorIngest {
    pub fn new(
        device_store: Arc<dyn DeviceStore>,
        sensor_store: Arc<dyn SensorReadingStore>,
        evaluator: Arc<dyn ThresholdEvaluator>,
        dispatch_delay_ms: u64,
    ) -> Self {
        Self {
            device_store,
            sensor_store,
            evaluator,
            dispatch_delay_ms,
        }
    }

    /// 处理一帧传感器报文。
    ///
    /// 未注册设备的帧告警丢弃（返回 None）。返回入库的读数记录。
    pub async fn ingest(
        &self,
        address: &str,
        frame: &SensorFrame,
        now_ms: i64,
    ) -> Result<Option<SensorReadingRecord>, IngestError> {
        let device = self
            .device_store
            .find_device(address)
            .await
            .map_err(|err| IngestError::Storage(err.to_string()))?;
        if device.is_none() {
            warn!(
                target: "pond.ingest",
                device_address = %address,
                "sensor_frame_from_unknown_device"
            );
            return Ok(None);
        }

        let mut valid: Vec<(&'static str, f64)> = Vec::new();
        for (parameter, value) in frame.parameters() {
            if in_valid_range(parameter, value) {
                valid.push((parameter, value));
            } else {
                warn!(
                    target: "pond.ingest",
                    device_address = %address,
                    parameter = %parameter,
                    value = value,
                    "measurement_out_of_range_dropped"
                );
            }
        }

        let reading = build_reading(address, &valid, frame, now_ms);
        let reading = self
            .sensor_store
            .create_reading(reading)
            .await
            .map_err(|err| IngestError::Storage(err.to_string()))?;
        record_reading_stored();
        info!(
            target: "pond.ingest",
            device_address = %address,
            reading_id = %reading.reading_id,
            measurements = valid.len(),
            "reading_stored"
        );

        for (parameter, value) in valid {
            record_threshold_dispatch();
            let evaluator = self.evaluator.clone();
            let address = address.to_string();
            let delay_ms = self.dispatch_delay_ms;
            tokio::spawn(async move {
                // 写入已提交后再评估
                if delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                evaluator.evaluate(&address, parameter, value).await;
            });
        }

        Ok(Some(reading))
    }
}

fn build_reading(
    address: &str,
    valid: &[(&'static str, f64)],
    frame: &SensorFrame,
    now_ms: i64,
) -> SensorReadingRecord {
    let get = |name: &str| {
        valid
            .iter()
            .find(|(parameter, _)| *parameter == name)
            .map(|(_, value)| *value)
    };
    SensorReadingRecord {
        reading_id: uuid::Uuid::new_v4().to_string(),
        device_address: address.to_string(),
        temperature: get("temperature"),
        water_level: get("water_level"),
        water_level2: get("water_level2"),
        feed_level: get("feed_level"),
        feed_level2: get("feed_level2"),
        dissolved_oxygen: get("dissolved_oxygen"),
        ph: get("ph"),
        battery: get("battery"),
        signal_strength: frame.signal_strength,
        device_timestamp: frame.timestamp.clone(),
        received_at_ms: now_ms,
    }
}
