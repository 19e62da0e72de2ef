//! 线上报文形状（UTF-8 JSON）。
//!
//! 出站命令与入站确认/传感器/心跳报文的结构定义，
//! 编解码的 serde 载体由 mqtt 能力层使用。

use serde::{Deserialize, Serialize};

/// 出站命令报文。
///
/// 形如 `{command_id, command_type, position, parameters, timestamp}`，
/// `timestamp` 为 ISO-8601 字符串。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command_id: String,
    pub command_type: String,
    pub position: u8,
    #[serde(default)]
    pub parameters: serde_json::Value,
    pub timestamp: String,
}

/// 入站命令确认报文。
///
/// 缺省 `success` 视为成功（设备兼容性），`message` 缺省为空串。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckFrame {
    pub command_id: String,
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_details: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

/// 入站传感器报文（所有测量项可选，设备按装配情况上报）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    pub temperature: Option<f64>,
    pub water_level: Option<f64>,
    pub water_level2: Option<f64>,
    pub feed_level: Option<f64>,
    pub feed_level2: Option<f64>,
    pub dissolved_oxygen: Option<f64>,
    pub ph: Option<f64>,
    pub battery: Option<f64>,
    pub signal_strength: Option<i32>,
    /// 设备侧上报时间（原样保留，接收时间另行记录）。
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl SensorFrame {
    /// 报文中出现的测量项 `(参数名, 数值)` 列表，用于阈值评估转交。
    pub fn parameters(&self) -> Vec<(&'static str, f64)> {
        let mut items = Vec::new();
        if let Some(value) = self.temperature {
            items.push(("temperature", value));
        }
        if let Some(value) = self.water_level {
            items.push(("water_level", value));
        }
        if let Some(value) = self.water_level2 {
            items.push(("water_level2", value));
        }
        if let Some(value) = self.feed_level {
            items.push(("feed_level", value));
        }
        if let Some(value) = self.feed_level2 {
            items.push(("feed_level2", value));
        }
        if let Some(value) = self.dissolved_oxygen {
            items.push(("dissolved_oxygen", value));
        }
        if let Some(value) = self.ph {
            items.push(("ph", value));
        }
        if let Some(value) = self.battery {
            items.push(("battery", value));
        }
        items
    }
}

/// 测量参数的有效数值范围（含端点）。
pub fn valid_range(parameter: &str) -> Option<(f64, f64)> {
    match parameter {
        "temperature" => Some((0.0, 50.0)),
        "water_level" | "water_level2" => Some((0.0, 100.0)),
        "feed_level" | "feed_level2" => Some((0.0, 100.0)),
        "dissolved_oxygen" => Some((0.0, 20.0)),
        "ph" => Some((0.0, 14.0)),
        "battery" => Some((0.0, 100.0)),
        _ => None,
    }
}

/// 判断测量值是否在参数的有效范围内（未声明范围的参数放行）。
pub fn in_valid_range(parameter: &str, value: f64) -> bool {
    match valid_range(parameter) {
        Some((min, max)) => value.is_finite() && value >= min && value <= max,
        None => value.is_finite(),
    }
}

/// 报文日志方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogDirection {
    Inbound,
    Outbound,
}

impl LogDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogDirection::Inbound => "INBOUND",
            LogDirection::Outbound => "OUTBOUND",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INBOUND" => Some(LogDirection::Inbound),
            "OUTBOUND" => Some(LogDirection::Outbound),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_defaults_apply() {
        let ack: AckFrame = serde_json::from_str(r#"{"command_id":"cmd-1"}"#).expect("parse");
        assert!(ack.success);
        assert_eq!(ack.message, "");
        assert!(ack.error_code.is_none());
        assert!(ack.error_details.is_none());
    }

    #[test]
    fn sensor_parameters_lists_present_fields() {
        let frame = SensorFrame {
            temperature: Some(27.5),
            ph: Some(7.2),
            ..SensorFrame::default()
        };
        let params = frame.parameters();
        assert_eq!(params, vec![("temperature", 27.5), ("ph", 7.2)]);
    }

    #[test]
    fn ranges_bound_measurements() {
        assert!(in_valid_range("temperature", 27.5));
        assert!(!in_valid_range("temperature", 51.0));
        assert!(!in_valid_range("ph", -1.0));
        assert!(in_valid_range("ph", 14.0));
        assert!(!in_valid_range("battery", f64::NAN));
        // 未声明范围的参数只要求为有限值
        assert!(in_valid_range("signal_quality", 1234.0));
    }
}
