//! 验证辅助函数
//!
//! 提供统一的验证逻辑，确保数据一致性：
//! - ensure_address：验证设备地址为规范的 17 字符 MAC 形式
//! - clamp_limit：限制列表查询上限为非负值

use crate::error::StorageError;
use domain::DeviceAddress;

/// 验证设备地址为规范形式（`XX:XX:XX:XX:XX:XX`）。
pub fn ensure_address(address: &str) -> Result<(), StorageError> {
    DeviceAddress::parse(address)
        .map(|_| ())
        .map_err(|err| StorageError::new(format!("invalid device address: {}", err)))
}

pub fn clamp_limit(limit: i64) -> usize {
    limit.max(0) as usize
}
