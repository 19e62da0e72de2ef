pub mod command;
pub mod device;
pub mod wire;

pub use command::{CommandStatus, CommandType};
pub use device::{DeviceMetadata, DeviceState};
pub use wire::{AckFrame, CommandEnvelope, LogDirection, SensorFrame};

/// 设备地址解析错误。
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("invalid length: expected 17 characters, got {0}")]
    Length(usize),
    #[error("invalid format: expected XX:XX:XX:XX:XX:XX")]
    Format,
}

/// 设备硬件地址（MAC 形式，规范形态为大写 `XX:XX:XX:XX:XX:XX`）。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// 解析并规范化设备地址（小写十六进制会被转为大写）。
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let raw = raw.trim();
        if raw.len() != 17 {
            return Err(AddressError::Length(raw.len()));
        }
        let mut canonical = String::with_capacity(17);
        for (index, ch) in raw.chars().enumerate() {
            if index % 3 == 2 {
                if ch != ':' {
                    return Err(AddressError::Format);
                }
                canonical.push(':');
            } else {
                if !ch.is_ascii_hexdigit() {
                    return Err(AddressError::Format);
                }
                canonical.push(ch.to_ascii_uppercase());
            }
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 设备的逻辑控制端点（一个物理设备最多复用两个端点）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    One,
    Two,
}

impl Position {
    pub fn as_u8(&self) -> u8 {
        match self {
            Position::One => 1,
            Position::Two => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Position::One),
            2 => Some(Position::Two),
            _ => None,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::One
    }
}
