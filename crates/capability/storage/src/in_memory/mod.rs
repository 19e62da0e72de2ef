//! 内存存储实现
//!
//! 仅用于本地测试、演示与无数据库运行模式。

mod command;
mod device;
mod message_log;
mod sensor;

pub use command::InMemoryCommandStore;
pub use device::InMemoryDeviceStore;
pub use message_log::InMemoryMessageLogStore;
pub use sensor::InMemorySensorReadingStore;
