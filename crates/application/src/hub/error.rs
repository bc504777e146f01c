use domain::ConnectionId;
use thiserror::Error;

/// 实时广播中心的错误类型
#[derive(Debug, Error)]
pub enum HubError {
    /// 连接标识冲突，属于内部不变量被破坏
    #[error("connection id {0} is already registered")]
    DuplicateId(ConnectionId),
    #[error("username {0:?} is already taken")]
    NameTaken(String),
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
    #[error("failed to deliver event to {connection_id}: {reason}")]
    DeliveryFailed {
        connection_id: ConnectionId,
        reason: String,
    },
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
}
