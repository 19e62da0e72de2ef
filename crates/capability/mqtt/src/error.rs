//! 传输与总线错误。

/// 传输会话错误。
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not connected")]
    NotConnected,
    #[error("connect error: {0}")]
    Connect(String),
    #[error("subscribe error: {0}")]
    Subscribe(String),
    #[error("publish error: {0}")]
    Publish(String),
}

/// 消息总线错误。
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus publish error: {0}")]
    Publish(String),
    #[error("bus subscribe error: {0}")]
    Subscribe(String),
    #[error("bus encode error: {0}")]
    Encode(String),
}
