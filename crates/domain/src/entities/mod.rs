//! 领域实体定义
//!
//! 包含系统的核心实体：网络节点，以及实时通道的协议帧。

pub mod node;
pub mod realtime;

// 重新导出核心实体
pub use node::{NewNode, Node, NodeChanges, NodeQuery};
pub use realtime::{
    ChatMessage, ChatPayload, ClientAction, ConnectionId, ServerEvent, UserEnterPayload,
    UserEnterSuccess,
};
