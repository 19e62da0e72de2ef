/// 命令类型（下发给设备的指令种类）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    Feed,
    WaterDrain,
    WaterFill,
    WaterFlush,
    WaterInletOpen,
    WaterInletClose,
    WaterOutletOpen,
    WaterOutletClose,
    SetThreshold,
    FirmwareUpdate,
    Restart,
    ConfigUpdate,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Feed => "FEED",
            CommandType::WaterDrain => "WATER_DRAIN",
            CommandType::WaterFill => "WATER_FILL",
            CommandType::WaterFlush => "WATER_FLUSH",
            CommandType::WaterInletOpen => "WATER_INLET_OPEN",
            CommandType::WaterInletClose => "WATER_INLET_CLOSE",
            CommandType::WaterOutletOpen => "WATER_OUTLET_OPEN",
            CommandType::WaterOutletClose => "WATER_OUTLET_CLOSE",
            CommandType::SetThreshold => "SET_THRESHOLD",
            CommandType::FirmwareUpdate => "FIRMWARE_UPDATE",
            CommandType::Restart => "RESTART",
            CommandType::ConfigUpdate => "CONFIG_UPDATE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FEED" => Some(CommandType::Feed),
            "WATER_DRAIN" => Some(CommandType::WaterDrain),
            "WATER_FILL" => Some(CommandType::WaterFill),
            "WATER_FLUSH" => Some(CommandType::WaterFlush),
            "WATER_INLET_OPEN" => Some(CommandType::WaterInletOpen),
            "WATER_INLET_CLOSE" => Some(CommandType::WaterInletClose),
            "WATER_OUTLET_OPEN" => Some(CommandType::WaterOutletOpen),
            "WATER_OUTLET_CLOSE" => Some(CommandType::WaterOutletClose),
            "SET_THRESHOLD" => Some(CommandType::SetThreshold),
            "FIRMWARE_UPDATE" => Some(CommandType::FirmwareUpdate),
            "RESTART" => Some(CommandType::Restart),
            "CONFIG_UPDATE" => Some(CommandType::ConfigUpdate),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 命令状态机。
///
/// `Pending → Sent → Acknowledged → Completed`；
/// `Sent` 可因设备上报失败流转为 `Failed`，或因重试耗尽流转为 `Timeout`。
/// 终态（Completed/Failed/Timeout）不可再变更。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    Pending,
    Sent,
    Acknowledged,
    Completed,
    Failed,
    Timeout,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "PENDING",
            CommandStatus::Sent => "SENT",
            CommandStatus::Acknowledged => "ACKNOWLEDGED",
            CommandStatus::Completed => "COMPLETED",
            CommandStatus::Failed => "FAILED",
            CommandStatus::Timeout => "TIMEOUT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(CommandStatus::Pending),
            "SENT" => Some(CommandStatus::Sent),
            "ACKNOWLEDGED" => Some(CommandStatus::Acknowledged),
            "COMPLETED" => Some(CommandStatus::Completed),
            "FAILED" => Some(CommandStatus::Failed),
            "TIMEOUT" => Some(CommandStatus::Timeout),
            _ => None,
        }
    }

    /// 是否为终态（终态命令不可变更，且已从挂起索引移除）。
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandStatus::Completed | CommandStatus::Failed | CommandStatus::Timeout
        )
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_type_round_trips() {
        for raw in [
            "FEED",
            "WATER_DRAIN",
            "WATER_FILL",
            "WATER_FLUSH",
            "WATER_INLET_OPEN",
            "WATER_INLET_CLOSE",
            "WATER_OUTLET_OPEN",
            "WATER_OUTLET_CLOSE",
            "SET_THRESHOLD",
            "FIRMWARE_UPDATE",
            "RESTART",
            "CONFIG_UPDATE",
        ] {
            let parsed = CommandType::parse(raw).expect("known command type");
            assert_eq!(parsed.as_str(), raw);
        }
        assert!(CommandType::parse("EXPLODE").is_none());
    }

    #[test]
    fn terminal_states_are_terminal() {
        assert!(CommandStatus::Completed.is_terminal());
        assert!(CommandStatus::Failed.is_terminal());
        assert!(CommandStatus::Timeout.is_terminal());
        assert!(!CommandStatus::Pending.is_terminal());
        assert!(!CommandStatus::Sent.is_terminal());
        assert!(!CommandStatus::Acknowledged.is_terminal());
    }
}
