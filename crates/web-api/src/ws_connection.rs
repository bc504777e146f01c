use std::sync::Arc;

use application::{Hub, HubError};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ConnectionId, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

/// 单个实时连接
///
/// 负责把广播中心投递给该连接的事件写到 WebSocket，
/// 并把客户端发来的文本帧交给广播中心处理。连接结束时从广播中心注销。
pub struct RealtimeConnection {
    hub: Arc<Hub>,
    connection_id: ConnectionId,
    events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl RealtimeConnection {
    /// 在广播中心注册新连接
    ///
    /// 注册完成时 `SET_VALUE` 和 `SET_CONNECTION_ID` 已经排在事件队列最前面。
    pub async fn open(hub: Arc<Hub>) -> Result<Self, HubError> {
        let (connection_id, events) = hub.open_channel().await?;
        tracing::info!(connection_id = %connection_id, "WebSocket 连接已建立");
        Ok(Self {
            hub,
            connection_id,
            events,
        })
    }

    /// 运行连接主循环，直到任意一端关闭
    pub async fn run(self, socket: WebSocket) {
        let Self {
            hub,
            connection_id,
            mut events,
        } = self;

        let (mut sender, mut incoming) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：所有对 sender 的写操作都在这里完成
        let mut send_task = {
            let connection_id = connection_id.clone();
            tokio::spawn(async move {
                loop {
                    let message = tokio::select! {
                        Some(cmd) = cmd_rx.recv() => match cmd {
                            WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                        },
                        Some(event) = events.recv() => match event.to_json() {
                            Ok(json) => WsMessage::Text(json.into()),
                            Err(err) => {
                                tracing::warn!(error = %err, "failed to serialize server event");
                                continue;
                            }
                        },
                        else => break,
                    };
                    if sender.send(message).await.is_err() {
                        tracing::warn!(connection_id = %connection_id, "failed to write websocket frame");
                        break;
                    }
                }
                tracing::debug!(connection_id = %connection_id, "WebSocket 发送任务结束");
            })
        };

        // 接收任务：入站帧按到达顺序交给广播中心
        let mut recv_task = {
            let hub = Arc::clone(&hub);
            let connection_id = connection_id.clone();
            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    if Self::handle_incoming(&hub, &connection_id, message, &cmd_tx)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                tracing::debug!(connection_id = %connection_id, "WebSocket 接收任务结束");
            })
        };

        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        hub.disconnect(&connection_id).await;
        tracing::info!(connection_id = %connection_id, "WebSocket 连接已断开");
    }

    async fn handle_incoming(
        hub: &Hub,
        connection_id: &ConnectionId,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Close(_) => {
                tracing::debug!(connection_id = %connection_id, "收到关闭帧");
                return Err(());
            }
            WsMessage::Ping(data) => {
                if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                    return Err(());
                }
            }
            WsMessage::Pong(_) => {}
            WsMessage::Text(text) => {
                match hub.handle_frame(connection_id, text.as_str()).await {
                    Ok(()) => {}
                    Err(HubError::MalformedFrame(err)) => {
                        tracing::warn!(connection_id = %connection_id, error = %err, "dropping malformed frame");
                    }
                    Err(err) => {
                        tracing::warn!(connection_id = %connection_id, error = %err, "failed to handle frame");
                    }
                }
            }
            WsMessage::Binary(_) => {
                tracing::debug!(connection_id = %connection_id, "ignoring binary frame");
            }
        }
        Ok(())
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}
