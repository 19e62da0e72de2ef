//! Postgres 存储实现
//!
//! 通过 sqlx 参数化查询实现各存储接口。
//!
//! 设计要点：
//! - 状态流转使用带 where 守卫的 update，以 rows_affected 判定是否生效
//! - 时间列统一为 timestamptz，出入均以毫秒时间戳换算

mod command;
mod device;
mod message_log;
mod sensor;

pub use command::PgCommandStore;
pub use device::PgDeviceStore;
pub use message_log::PgMessageLogStore;
pub use sensor::PgSensorReadingStore;
