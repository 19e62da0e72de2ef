//! 主题路由。
//!
//! 主题形如 `<prefix>/<device_address>/<category>`，按类别路由入站帧、
//! 生成出站主题与订阅过滤器。

use rumqttc::QoS;
use serde::{Deserialize, Serialize};

/// 主题类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopicCategory {
    Heartbeat,
    Startup,
    Sensors,
    Commands,
    Ack,
    Complete,
    Threshold,
    Status,
}

impl TopicCategory {
    pub const ALL: [TopicCategory; 8] = [
        TopicCategory::Heartbeat,
        TopicCategory::Startup,
        TopicCategory::Sensors,
        TopicCategory::Commands,
        TopicCategory::Ack,
        TopicCategory::Complete,
        TopicCategory::Threshold,
        TopicCategory::Status,
    ];

    pub fn segment(&self) -> &'static str {
        match self {
            TopicCategory::Heartbeat => "heartbeat",
            TopicCategory::Startup => "startup",
            TopicCategory::Sensors => "sensors",
            TopicCategory::Commands => "commands",
            TopicCategory::Ack => "ack",
            TopicCategory::Complete => "complete",
            TopicCategory::Threshold => "threshold",
            TopicCategory::Status => "status",
        }
    }

    pub fn parse(segment: &str) -> Option<Self> {
        match segment {
            "heartbeat" => Some(TopicCategory::Heartbeat),
            "startup" => Some(TopicCategory::Startup),
            "sensors" => Some(TopicCategory::Sensors),
            "commands" => Some(TopicCategory::Commands),
            "ack" => Some(TopicCategory::Ack),
            "complete" => Some(TopicCategory::Complete),
            "threshold" => Some(TopicCategory::Threshold),
            "status" => Some(TopicCategory::Status),
            _ => None,
        }
    }
}

impl std::fmt::Display for TopicCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.segment())
    }
}

/// 指定设备与类别的完整主题。
pub fn topic_for(prefix: &str, device_address: &str, category: TopicCategory) -> String {
    format!(
        "{}/{}/{}",
        prefix.trim_end_matches('/'),
        device_address,
        category.segment()
    )
}

/// 解析入站主题为（设备地址，类别）。
///
/// 前缀不匹配、段数不符或类别未知时返回 None，调用方丢弃该帧。
pub fn parse_topic(prefix: &str, topic: &str) -> Option<(String, TopicCategory)> {
    let prefix = prefix.trim_matches('/');
    let rest = topic.trim_matches('/').strip_prefix(prefix)?;
    let rest = rest.strip_prefix('/')?;
    let mut parts = rest.split('/');
    let address = parts.next()?;
    let segment = parts.next()?;
    if address.is_empty() || parts.next().is_some() {
        return None;
    }
    let category = TopicCategory::parse(segment)?;
    Some((address.to_string(), category))
}

/// 全类别通配订阅过滤器 `<prefix>/+/<category>`。
pub fn subscription_filters(prefix: &str) -> Vec<(String, QoS)> {
    TopicCategory::ALL
        .iter()
        .map(|category| {
            (
                format!("{}/+/{}", prefix.trim_end_matches('/'), category.segment()),
                QoS::AtLeastOnce,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_round_trips() {
        let topic = topic_for("ff", "AA:BB:CC:DD:EE:FF", TopicCategory::Commands);
        assert_eq!(topic, "ff/AA:BB:CC:DD:EE:FF/commands");
        let (address, category) = parse_topic("ff", &topic).expect("parse");
        assert_eq!(address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(category, TopicCategory::Commands);
    }

    #[test]
    fn unknown_category_is_rejected() {
        assert!(parse_topic("ff", "ff/AA:BB:CC:DD:EE:FF/mystery").is_none());
        assert!(parse_topic("ff", "ff/AA:BB:CC:DD:EE:FF/ack/extra").is_none());
        assert!(parse_topic("ff", "other/AA:BB:CC:DD:EE:FF/ack").is_none());
        assert!(parse_topic("ff", "ff/ack").is_none());
    }

    #[test]
    fn filters_cover_all_categories() {
        let filters = subscription_filters("ff");
        assert_eq!(filters.len(), TopicCategory::ALL.len());
        assert!(filters.iter().any(|(f, _)| f == "ff/+/heartbeat"));
        assert!(filters.iter().any(|(f, _)| f == "ff/+/ack"));
    }
}
