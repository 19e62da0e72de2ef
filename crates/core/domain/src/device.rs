/// 设备在线状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Online,
    Offline,
    Error,
    Maintenance,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Online => "ONLINE",
            DeviceState::Offline => "OFFLINE",
            DeviceState::Error => "ERROR",
            DeviceState::Maintenance => "MAINTENANCE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ONLINE" => Some(DeviceState::Online),
            "OFFLINE" => Some(DeviceState::Offline),
            "ERROR" => Some(DeviceState::Error),
            "MAINTENANCE" => Some(DeviceState::Maintenance),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 设备随心跳/启动报文上报的元信息。
///
/// 所有字段可选：合并进设备记录时只覆盖报文中出现的字段，
/// 缺失字段保留既有值（非破坏性合并）。
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DeviceMetadata {
    pub firmware_version: Option<String>,
    pub hardware_version: Option<String>,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub wifi_ssid: Option<String>,
    pub wifi_signal_strength: Option<i32>,
    pub free_heap: Option<i64>,
    pub cpu_frequency: Option<i32>,
}

impl DeviceMetadata {
    /// 是否没有任何待合并字段。
    pub fn is_empty(&self) -> bool {
        self.firmware_version.is_none()
            && self.hardware_version.is_none()
            && self.device_name.is_none()
            && self.ip_address.is_none()
            && self.wifi_ssid.is_none()
            && self.wifi_signal_strength.is_none()
            && self.free_heap.is_none()
            && self.cpu_frequency.is_none()
    }
}
