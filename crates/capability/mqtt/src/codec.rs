//! 线上报文编解码（UTF-8 JSON）。

use domain::wire::{AckFrame, CommandEnvelope, SensorFrame};
use domain::DeviceMetadata;

/// 编解码错误。
#[derive(Debug, thiserror::Error)]
#[error("codec error: {0}")]
pub struct CodecError(String);

/// 解码入站载荷为 JSON 值（每帧只做一次）。
pub fn decode_json(payload: &[u8]) -> Result<serde_json::Value, CodecError> {
    serde_json::from_slice(payload).map_err(|err| CodecError(err.to_string()))
}

/// 编码出站命令报文。
pub fn encode_envelope(envelope: &CommandEnvelope) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(envelope).map_err(|err| CodecError(err.to_string()))
}

/// 从已解码的 JSON 值取确认帧。
pub fn ack_from_value(value: &serde_json::Value) -> Result<AckFrame, CodecError> {
    serde_json::from_value(value.clone()).map_err(|err| CodecError(err.to_string()))
}

/// 从已解码的 JSON 值取传感器帧。
pub fn sensor_from_value(value: &serde_json::Value) -> Result<SensorFrame, CodecError> {
    serde_json::from_value(value.clone()).map_err(|err| CodecError(err.to_string()))
}

/// 从已解码的 JSON 值取设备元信息（心跳/启动帧；未知字段忽略）。
pub fn metadata_from_value(value: &serde_json::Value) -> Result<DeviceMetadata, CodecError> {
    serde_json::from_value(value.clone()).map_err(|err| CodecError(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_malformed_payload() {
        assert!(decode_json(b"{not json").is_err());
        assert!(decode_json(b"").is_err());
    }

    #[test]
    fn ack_frame_from_value() {
        let value = decode_json(br#"{"command_id":"cmd-1","success":false,"message":"jammed"}"#)
            .expect("json");
        let ack = ack_from_value(&value).expect("ack");
        assert_eq!(ack.command_id, "cmd-1");
        assert!(!ack.success);
        assert_eq!(ack.message, "jammed");
    }

    #[test]
    fn metadata_ignores_unknown_fields() {
        let value = decode_json(br#"{"firmware_version":"1.2.0","uptime":12345}"#).expect("json");
        let metadata = metadata_from_value(&value).expect("metadata");
        assert_eq!(metadata.firmware_version.as_deref(), Some("1.2.0"));
        assert!(metadata.device_name.is_none());
    }
}
