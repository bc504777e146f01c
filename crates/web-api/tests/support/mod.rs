#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{Hub, NodeService};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use infrastructure::InMemoryNodeRepository;
use serde_json::Value;
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{realtime_router, router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// 运行中的测试服务器，drop 时触发优雅关闭
pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    pub async fn spawn(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            _shutdown: shutdown_tx,
        }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/", self.addr)
    }
}

pub async fn spawn_realtime(hub: Arc<Hub>) -> TestServer {
    TestServer::spawn(realtime_router(hub)).await
}

pub async fn spawn_rest() -> TestServer {
    let service = NodeService::new(Arc::new(InMemoryNodeRepository::new()));
    TestServer::spawn(router(AppState::new(Arc::new(service)))).await
}

/// 建立连接并读掉握手阶段的 `SET_VALUE` 与 `SET_CONNECTION_ID`，返回连接标识
pub async fn connect(server: &TestServer) -> (WsClient, String) {
    let (mut ws, _) = connect_async(server.ws_url()).await.expect("ws connect");

    let value = next_json(&mut ws).await;
    assert_eq!(value["action"], "SET_VALUE");
    let id = next_json(&mut ws).await;
    assert_eq!(id["action"], "SET_CONNECTION_ID");

    let connection_id = id["value"].as_str().expect("connection id").to_string();
    (ws, connection_id)
}

pub async fn send_json(ws: &mut WsClient, frame: Value) {
    ws.send(TungsteniteMessage::Text(frame.to_string().into()))
        .await
        .expect("send frame");
}

pub async fn send_raw(ws: &mut WsClient, text: &str) {
    ws.send(TungsteniteMessage::Text(text.to_string().into()))
        .await
        .expect("send frame");
}

/// 读取下一个文本帧并解析为 JSON
pub async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let message = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream closed")
            .expect("ws error");
        if let TungsteniteMessage::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("frame json");
        }
    }
}

/// 断言在短时间内没有新的文本帧
pub async fn assert_silent(ws: &mut WsClient) {
    let result = timeout(Duration::from_millis(200), ws.next()).await;
    assert!(result.is_err(), "unexpected frame: {:?}", result);
}
