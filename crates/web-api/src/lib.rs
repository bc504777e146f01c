//! Web API 层。
//!
//! 提供两个 Axum 路由：节点注册表的 REST 接口，以及实时通道的 WebSocket 入口。

mod error;
mod realtime;
mod routes;
mod state;
mod ws_connection;

pub use error::{ApiError, Envelope};
pub use realtime::realtime_router;
pub use routes::{cors_layer, router};
pub use state::AppState;
pub use ws_connection::RealtimeConnection;
