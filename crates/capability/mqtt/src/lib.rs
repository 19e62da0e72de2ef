//! # Pond MQTT 模块
//!
//! 协议层的传输与路由能力：
//!
//! - [`topics`]：主题路由（`<prefix>/<address>/<category>`）
//! - [`session`]：唯一的 MQTT 传输会话（状态机 + 指数退避重连）
//! - [`dispatcher`]：入站帧调度（单次解码 + 有界工作池 + 总线转发/本地回退）
//! - [`bus`]：消息总线抽象（内存 mpsc / Redis 发布订阅）
//! - [`codec`]：线上报文编解码（UTF-8 JSON）
//! - [`channel`]：命令发布通道（生命周期层的传输实现）

pub mod bus;
pub mod channel;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod session;
pub mod topics;

pub use bus::{InMemoryBus, InboundFrame, MessageBus, RedisBus};
pub use channel::CommandChannel;
pub use codec::CodecError;
pub use dispatcher::{Dispatcher, FrameProcessor};
pub use error::{BusError, SessionError};
pub use session::{InboundHandler, MqttSession, SessionConfig, SessionState};
pub use topics::{TopicCategory, parse_topic, subscription_filters, topic_for};
