//! 实时通道入口
//!
//! 任意路径上的 WebSocket 升级请求都会接入广播中心；`GET /stats` 返回广播中心的运行统计。

use std::sync::Arc;

use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Json, Router,
};

use application::{Hub, HubStats};

use crate::ws_connection::RealtimeConnection;

pub fn realtime_router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/stats", get(hub_stats))
        .fallback(websocket_upgrade)
        .with_state(hub)
}

async fn websocket_upgrade(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> Response {
    ws.on_upgrade(move |socket| async move {
        match RealtimeConnection::open(hub).await {
            Ok(connection) => connection.run(socket).await,
            Err(err) => tracing::error!(error = %err, "failed to register realtime connection"),
        }
    })
}

async fn hub_stats(State(hub): State<Arc<Hub>>) -> Json<HubStats> {
    Json(hub.stats().await)
}
