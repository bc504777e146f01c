//! 实时广播中心
//!
//! 管理实时通道的所有连接：分配连接标识、登记用户名、转发聊天消息并分配
//! 消息序列号、同步共享值。所有状态由一把互斥锁保护，每个动作在持锁期间
//! 完整处理，因此“检查用户名后插入”和“分配序列号后广播”都是原子的。

mod error;
mod presence;
mod registry;
mod sequencer;
mod shared_value;

pub use error::HubError;
pub use presence::PresenceTable;
pub use registry::{ConnectionRegistry, EventSink};
pub use sequencer::MessageSequencer;
pub use shared_value::SharedValue;

use domain::{
    ChatMessage, ChatPayload, ClientAction, ConnectionId, ServerEvent, UserEnterPayload,
    UserEnterSuccess,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// 广播中心的运行时快照
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub connections: usize,
    pub users: usize,
    pub messages_relayed: u64,
    pub value: Value,
}

struct HubState {
    registry: ConnectionRegistry,
    presence: PresenceTable,
    value: SharedValue,
    sequencer: MessageSequencer,
}

impl HubState {
    fn unicast(&self, connection_id: &ConnectionId, event: ServerEvent) {
        let Some(sink) = self.registry.get(connection_id) else {
            warn!(connection_id = %connection_id, "unicast to unknown connection dropped");
            return;
        };
        if let Err(reason) = sink.deliver(&event) {
            let err = HubError::DeliveryFailed {
                connection_id: connection_id.clone(),
                reason,
            };
            warn!(error = %err, "unicast failed");
        }
    }

    /// 发送给所有存活连接，单个连接失败不影响其他连接
    fn broadcast(&self, event: ServerEvent) -> usize {
        let mut delivered = 0;
        for (connection_id, sink) in self.registry.iter() {
            match sink.deliver(&event) {
                Ok(()) => delivered += 1,
                Err(reason) => {
                    let err = HubError::DeliveryFailed {
                        connection_id: connection_id.clone(),
                        reason,
                    };
                    warn!(error = %err, "broadcast delivery failed");
                }
            }
        }
        delivered
    }
}

/// 实时广播中心
pub struct Hub {
    state: Mutex<HubState>,
}

impl Hub {
    /// 创建广播中心，`initial_value` 为共享值的初始内容
    pub fn new(initial_value: Value) -> Self {
        Self {
            state: Mutex::new(HubState {
                registry: ConnectionRegistry::new(),
                presence: PresenceTable::new(),
                value: SharedValue::new(initial_value),
                sequencer: MessageSequencer::new(),
            }),
        }
    }

    /// 以新生成的连接标识接入一个连接
    pub async fn connect(&self, sink: Box<dyn EventSink>) -> Result<ConnectionId, HubError> {
        let connection_id = ConnectionId::generate();
        self.attach(connection_id.clone(), sink).await?;
        Ok(connection_id)
    }

    /// 接入一个基于 mpsc 通道的连接，返回连接标识和事件接收端
    pub async fn open_channel(
        &self,
    ) -> Result<(ConnectionId, mpsc::UnboundedReceiver<ServerEvent>), HubError> {
        let (tx, rx) = mpsc::unbounded_channel::<ServerEvent>();
        let connection_id = self.connect(Box::new(tx)).await?;
        Ok((connection_id, rx))
    }

    /// 以指定标识接入连接
    ///
    /// 注册后依次向新连接发送 `SET_VALUE` 和 `SET_CONNECTION_ID`。
    pub async fn attach(
        &self,
        connection_id: ConnectionId,
        sink: Box<dyn EventSink>,
    ) -> Result<(), HubError> {
        let mut state = self.state.lock().await;
        if let Err(err) = state.registry.register(connection_id.clone(), sink) {
            error!(error = %err, "connection id collision");
            return Err(err);
        }

        let current = state.value.get().clone();
        state.unicast(&connection_id, ServerEvent::SetValue(current));
        state.unicast(
            &connection_id,
            ServerEvent::SetConnectionId(connection_id.clone()),
        );

        info!(
            connection_id = %connection_id,
            connections = state.registry.len(),
            "realtime connection registered"
        );
        Ok(())
    }

    /// 处理一个入站文本帧
    ///
    /// 格式错误的帧返回 `MalformedFrame`，调用方记录后丢弃即可，连接保持打开；
    /// 未知动作直接忽略。
    pub async fn handle_frame(
        &self,
        connection_id: &ConnectionId,
        text: &str,
    ) -> Result<(), HubError> {
        match ClientAction::parse(text)? {
            Some(action) => self.dispatch(connection_id, action).await,
            None => {
                debug!(connection_id = %connection_id, "ignoring unknown action");
                Ok(())
            }
        }
    }

    /// 分派一个客户端动作
    pub async fn dispatch(
        &self,
        connection_id: &ConnectionId,
        action: ClientAction,
    ) -> Result<(), HubError> {
        let mut state = self.state.lock().await;
        if state.registry.get(connection_id).is_none() {
            return Err(HubError::UnknownConnection(connection_id.clone()));
        }
        debug!(connection_id = %connection_id, action = action.name(), "dispatching action");

        match action {
            ClientAction::SendMessage(payload) => {
                Self::relay_message(&state, connection_id, payload);
            }
            ClientAction::UserEnter(payload) => {
                Self::enter_user(&mut state, connection_id, payload);
            }
            ClientAction::SendValue(value) => {
                state.value.set(value.clone());
                let delivered = state.broadcast(ServerEvent::SetValue(value));
                debug!(connection_id = %connection_id, delivered, "shared value updated");
            }
        }
        Ok(())
    }

    fn relay_message(state: &HubState, connection_id: &ConnectionId, payload: ChatPayload) {
        if let Some(claimed) = payload.connection_id.as_deref() {
            if claimed != connection_id.as_str() {
                debug!(
                    connection_id = %connection_id,
                    claimed,
                    "payload connection id differs from sender"
                );
            }
        }

        let sent_by = state
            .presence
            .name_of(connection_id)
            .unwrap_or_default()
            .to_string();
        let message_id = state.sequencer.next();
        let delivered = state.broadcast(ServerEvent::MessageFromServer(ChatMessage {
            message: payload.message,
            sent_by,
            message_id,
        }));
        debug!(connection_id = %connection_id, message_id, delivered, "chat message relayed");
    }

    fn enter_user(state: &mut HubState, connection_id: &ConnectionId, payload: UserEnterPayload) {
        let Some(username) = payload.username else {
            debug!(connection_id = %connection_id, "user enter without a string username");
            state.unicast(connection_id, ServerEvent::UserEnterFail);
            return;
        };

        match state.presence.try_claim(connection_id, &username) {
            Ok(users) => {
                info!(connection_id = %connection_id, username = %username, "user entered");
                state.unicast(
                    connection_id,
                    ServerEvent::UserEnterSuccess(UserEnterSuccess {
                        username,
                        users,
                    }),
                );
            }
            Err(err) => {
                debug!(connection_id = %connection_id, error = %err, "user enter rejected");
                state.unicast(connection_id, ServerEvent::UserEnterFail);
            }
        }
    }

    /// 断开连接：注销并释放用户名。重复调用是无害的。
    pub async fn disconnect(&self, connection_id: &ConnectionId) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.registry.unregister(connection_id);
        let username = state.presence.release(connection_id);
        if removed {
            info!(
                connection_id = %connection_id,
                username = username.as_deref().unwrap_or_default(),
                connections = state.registry.len(),
                "realtime connection closed"
            );
        }
        removed
    }

    /// 当前共享值
    pub async fn current_value(&self) -> Value {
        self.state.lock().await.value.get().clone()
    }

    /// 当前在线用户名（按登记顺序）
    pub async fn usernames(&self) -> Vec<String> {
        self.state.lock().await.presence.all_names()
    }

    pub async fn stats(&self) -> HubStats {
        let state = self.state.lock().await;
        HubStats {
            connections: state.registry.len(),
            users: state.presence.len(),
            messages_relayed: state.sequencer.issued(),
            value: state.value.get().clone(),
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(Value::from(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    struct BrokenSink;

    impl EventSink for BrokenSink {
        fn deliver(&self, _event: &ServerEvent) -> Result<(), String> {
            Err("transport closing".into())
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn send_message(text: &str) -> ClientAction {
        ClientAction::SendMessage(ChatPayload {
            message: text.into(),
            connection_id: None,
        })
    }

    fn user_enter(name: &str) -> ClientAction {
        ClientAction::UserEnter(UserEnterPayload {
            username: Some(name.into()),
        })
    }

    #[tokio::test]
    async fn join_sends_value_then_connection_id() {
        let hub = Hub::new(json!(7));
        let (id, mut rx) = hub.open_channel().await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                ServerEvent::SetValue(json!(7)),
                ServerEvent::SetConnectionId(id),
            ]
        );
    }

    #[tokio::test]
    async fn missing_username_fails_without_claiming() {
        let hub = Hub::default();
        let (c1, mut rx1) = hub.open_channel().await.unwrap();
        drain(&mut rx1);

        hub.dispatch(&c1, ClientAction::UserEnter(UserEnterPayload { username: None }))
            .await
            .unwrap();
        assert_eq!(drain(&mut rx1), vec![ServerEvent::UserEnterFail]);
        assert!(hub.usernames().await.is_empty());

        hub.handle_frame(&c1, r#"{"action":"USER_ENTER","value":{"username":null}}"#)
            .await
            .unwrap();
        assert_eq!(drain(&mut rx1), vec![ServerEvent::UserEnterFail]);
    }

    #[tokio::test]
    async fn duplicate_name_fails_for_second_user() {
        let hub = Hub::default();
        let (c1, mut rx1) = hub.open_channel().await.unwrap();
        let (c2, mut rx2) = hub.open_channel().await.unwrap();
        drain(&mut rx1);
        drain(&mut rx2);

        hub.dispatch(&c1, user_enter("bob")).await.unwrap();
        assert_eq!(
            drain(&mut rx1),
            vec![ServerEvent::UserEnterSuccess(UserEnterSuccess {
                username: "bob".into(),
                users: vec!["bob".into()],
            })]
        );

        hub.dispatch(&c2, user_enter("bob")).await.unwrap();
        assert_eq!(drain(&mut rx2), vec![ServerEvent::UserEnterFail]);
        // 失败只回给请求方
        assert!(drain(&mut rx1).is_empty());
        assert_eq!(hub.usernames().await, vec!["bob"]);
    }

    #[tokio::test]
    async fn unnamed_sender_broadcasts_with_empty_name() {
        let hub = Hub::default();
        let (c1, mut rx1) = hub.open_channel().await.unwrap();
        let (_c2, mut rx2) = hub.open_channel().await.unwrap();
        drain(&mut rx1);
        drain(&mut rx2);

        hub.dispatch(&c1, send_message("hi")).await.unwrap();

        let expected = ServerEvent::MessageFromServer(ChatMessage {
            message: "hi".into(),
            sent_by: String::new(),
            message_id: 0,
        });
        assert_eq!(drain(&mut rx1), vec![expected.clone()]);
        assert_eq!(drain(&mut rx2), vec![expected]);
    }

    #[tokio::test]
    async fn named_sender_is_stamped_on_messages() {
        let hub = Hub::default();
        let (c1, mut rx1) = hub.open_channel().await.unwrap();
        hub.dispatch(&c1, user_enter("carol")).await.unwrap();
        drain(&mut rx1);

        hub.dispatch(&c1, send_message("hello")).await.unwrap();

        assert_eq!(
            drain(&mut rx1),
            vec![ServerEvent::MessageFromServer(ChatMessage {
                message: "hello".into(),
                sent_by: "carol".into(),
                message_id: 0,
            })]
        );
    }

    #[tokio::test]
    async fn message_ids_are_sequential_across_senders() {
        let hub = Hub::default();
        let mut receivers = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let (id, mut rx) = hub.open_channel().await.unwrap();
            drain(&mut rx);
            ids.push(id);
            receivers.push(rx);
        }

        for n in 0..9 {
            hub.dispatch(&ids[n % 3], send_message("x")).await.unwrap();
        }

        for rx in receivers.iter_mut() {
            let seen: Vec<u64> = drain(rx)
                .into_iter()
                .map(|event| match event {
                    ServerEvent::MessageFromServer(message) => message.message_id,
                    other => panic!("unexpected event {other:?}"),
                })
                .collect();
            assert_eq!(seen, (0..9).collect::<Vec<_>>());
        }
        assert_eq!(hub.stats().await.messages_relayed, 9);
    }

    #[tokio::test]
    async fn concurrent_senders_never_share_message_ids() {
        let hub = Arc::new(Hub::default());
        let (observer, mut observer_rx) = hub.open_channel().await.unwrap();
        drain(&mut observer_rx);

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let hub = hub.clone();
                let sender = observer.clone();
                tokio::spawn(async move {
                    for _ in 0..20 {
                        hub.dispatch(&sender, send_message("load")).await.unwrap();
                    }
                })
            })
            .collect();
        futures::future::join_all(tasks).await;

        let seen: Vec<u64> = drain(&mut observer_rx)
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::MessageFromServer(message) => Some(message.message_id),
                _ => None,
            })
            .collect();
        // 发送顺序即序列号顺序
        assert_eq!(seen, (0..200).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn concurrent_claims_for_same_name_have_one_winner() {
        let hub = Arc::new(Hub::default());
        let mut clients = Vec::new();
        for _ in 0..16 {
            clients.push(hub.open_channel().await.unwrap());
        }

        let tasks: Vec<_> = clients
            .iter()
            .map(|(id, _)| {
                let hub = hub.clone();
                let id = id.clone();
                tokio::spawn(async move { hub.dispatch(&id, user_enter("dup")).await })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let winners = clients
            .iter_mut()
            .map(|(_, rx)| {
                drain(rx)
                    .iter()
                    .any(|event| matches!(event, ServerEvent::UserEnterSuccess(_)))
            })
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(hub.usernames().await, vec!["dup"]);
    }

    #[tokio::test]
    async fn send_value_reaches_everyone_and_late_joiners() {
        let hub = Hub::default();
        let (c1, mut rx1) = hub.open_channel().await.unwrap();
        let (_c2, mut rx2) = hub.open_channel().await.unwrap();
        drain(&mut rx1);
        drain(&mut rx2);

        hub.dispatch(&c1, ClientAction::SendValue(json!(42)))
            .await
            .unwrap();

        assert_eq!(drain(&mut rx1), vec![ServerEvent::SetValue(json!(42))]);
        assert_eq!(drain(&mut rx2), vec![ServerEvent::SetValue(json!(42))]);

        let (_c3, mut rx3) = hub.open_channel().await.unwrap();
        assert_eq!(drain(&mut rx3)[0], ServerEvent::SetValue(json!(42)));
        assert_eq!(hub.current_value().await, json!(42));
    }

    #[tokio::test]
    async fn failing_recipient_does_not_block_others() {
        let hub = Hub::default();
        let (sender, mut sender_rx) = hub.open_channel().await.unwrap();
        hub.connect(Box::new(BrokenSink)).await.unwrap();
        let (_closed, closed_rx) = hub.open_channel().await.unwrap();
        drop(closed_rx);
        let (_other, mut other_rx) = hub.open_channel().await.unwrap();
        drain(&mut sender_rx);
        drain(&mut other_rx);

        hub.dispatch(&sender, ClientAction::SendValue(json!("v")))
            .await
            .unwrap();
        hub.dispatch(&sender, send_message("still here"))
            .await
            .unwrap();

        for rx in [&mut sender_rx, &mut other_rx] {
            let events = drain(rx);
            assert_eq!(events.len(), 2);
            assert_eq!(events[0], ServerEvent::SetValue(json!("v")));
        }
    }

    #[tokio::test]
    async fn disconnect_releases_name_and_is_idempotent() {
        let hub = Hub::default();
        let (c1, _rx1) = hub.open_channel().await.unwrap();
        hub.dispatch(&c1, user_enter("alice")).await.unwrap();

        assert!(hub.disconnect(&c1).await);
        assert!(!hub.disconnect(&c1).await);

        let stats = hub.stats().await;
        assert_eq!(stats.connections, 0);
        assert_eq!(stats.users, 0);

        // 用户名已释放
        let (c2, mut rx2) = hub.open_channel().await.unwrap();
        drain(&mut rx2);
        hub.dispatch(&c2, user_enter("alice")).await.unwrap();
        assert!(matches!(
            drain(&mut rx2).as_slice(),
            [ServerEvent::UserEnterSuccess(_)]
        ));
    }

    #[tokio::test]
    async fn departure_is_not_announced() {
        let hub = Hub::default();
        let (c1, _rx1) = hub.open_channel().await.unwrap();
        let (_c2, mut rx2) = hub.open_channel().await.unwrap();
        hub.dispatch(&c1, user_enter("ghost")).await.unwrap();
        drain(&mut rx2);

        hub.disconnect(&c1).await;

        assert!(drain(&mut rx2).is_empty());
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames() {
        let hub = Hub::default();
        let (c1, mut rx1) = hub.open_channel().await.unwrap();
        drain(&mut rx1);

        let err = hub.handle_frame(&c1, "{not json").await.unwrap_err();
        assert!(matches!(err, HubError::MalformedFrame(_)));

        hub.handle_frame(&c1, r#"{"action":"WAVE","value":null}"#)
            .await
            .unwrap();
        assert!(drain(&mut rx1).is_empty());

        // 连接仍然可用
        hub.handle_frame(&c1, r#"{"action":"SEND_VALUE","value":1}"#)
            .await
            .unwrap();
        assert_eq!(drain(&mut rx1), vec![ServerEvent::SetValue(json!(1))]);
    }

    #[tokio::test]
    async fn duplicate_attach_is_refused() {
        let hub = Hub::default();
        let (tx, _rx) = mpsc::unbounded_channel::<ServerEvent>();
        let (tx2, _rx2) = mpsc::unbounded_channel::<ServerEvent>();
        let id = ConnectionId::from("fixed");

        hub.attach(id.clone(), Box::new(tx)).await.unwrap();
        let err = hub.attach(id, Box::new(tx2)).await.unwrap_err();

        assert!(matches!(err, HubError::DuplicateId(_)));
        assert_eq!(hub.stats().await.connections, 1);
    }

    #[tokio::test]
    async fn hubs_are_isolated() {
        let first = Hub::default();
        let second = Hub::default();
        let (c1, _rx) = first.open_channel().await.unwrap();
        first
            .dispatch(&c1, ClientAction::SendValue(json!(5)))
            .await
            .unwrap();

        assert_eq!(second.current_value().await, json!(0));
        assert_eq!(second.stats().await.connections, 0);
    }

    #[tokio::test]
    async fn actions_from_unknown_connections_are_rejected() {
        let hub = Hub::default();
        let err = hub
            .dispatch(&ConnectionId::from("nobody"), send_message("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::UnknownConnection(_)));
        assert_eq!(hub.stats().await.messages_relayed, 0);
    }
}
