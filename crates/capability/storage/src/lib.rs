//! # Pond Storage 模块
//!
//! 本模块提供协议层统一的数据存储抽象，支持多种存储后端实现。
//!
//! ## 架构设计
//!
//! 该模块采用分层架构，遵循以下原则：
//!
//! 1. **接口抽象层** (`traits.rs`)：定义所有资源存储的异步 Trait 接口
//! 2. **数据模型层** (`models.rs`)：定义存储相关的数据结构
//! 3. **错误处理层** (`error.rs`)：统一的存储错误类型
//! 4. **验证辅助层** (`validation.rs`)：设备地址格式验证与分页裁剪
//! 5. **连接管理层** (`connection.rs`)：数据库连接池管理
//! 6. **实现层**：
//!    - `in_memory/`：内存存储实现（用于测试与无数据库运行模式）
//!    - `postgres/`：PostgreSQL 存储实现（生产环境使用）
//!
//! ## 核心特性
//!
//! - **守卫式状态流转**：命令/设备状态变更采用 compare-and-set 语义，
//!   前置状态不匹配即返回 false，确认与超时竞争时先到者生效
//! - **类型安全**：状态列以领域枚举出入，未知取值在映射处报错
//! - **异步支持**：基于 Tokio 的异步 I/O，通过 async_trait 支持动态分发
//! - **可扩展性**：通过 Trait 接口支持多种存储后端
//!
//! ## 数据模型
//!
//! - **DeviceRecord**：设备记录（address, state, metadata, error_count, active）
//! - **CommandRecord**：命令记录（生命周期状态、超时/重试预算、结果详情）
//! - **MessageLogRecord**：报文日志（入站/出站帧审计，按保留期裁剪）
//! - **SensorReadingRecord**：传感器读数（一帧一行，写入后不可变）
//!
//! ## 设计约束
//!
//! - 命令进入终态后不可再变更，仅作为审计痕迹保留
//! - 设备只停用不删除，历史命令与读数保持可回溯
//! - 所有 SQL 使用参数绑定，时间列统一为 timestamptz

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod models;
pub mod postgres;
pub mod traits;
pub mod validation;

pub use connection::*;
pub use error::*;
pub use models::*;
pub use traits::*;
pub use validation::*;

pub use in_memory::{
    InMemoryCommandStore, InMemoryDeviceStore, InMemoryMessageLogStore, InMemorySensorReadingStore,
};

pub use postgres::{PgCommandStore, PgDeviceStore, PgMessageLogStore, PgSensorReadingStore};
