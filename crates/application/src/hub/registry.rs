use std::collections::HashMap;

use domain::{ConnectionId, ServerEvent};
use tokio::sync::mpsc;

use super::HubError;

/// 连接的发送端
///
/// 实现方负责把事件交给具体的传输层，发送失败只影响当前连接。
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: &ServerEvent) -> Result<(), String>;
}

impl EventSink for mpsc::UnboundedSender<ServerEvent> {
    fn deliver(&self, event: &ServerEvent) -> Result<(), String> {
        self.send(event.clone())
            .map_err(|_| "receiver dropped".to_string())
    }
}

/// 连接注册表：连接标识 -> 发送端
///
/// 发送端在连接存活期间由注册表独占。
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Box<dyn EventSink>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册连接，标识已存在时返回 `DuplicateId`
    pub fn register(
        &mut self,
        connection_id: ConnectionId,
        sink: Box<dyn EventSink>,
    ) -> Result<(), HubError> {
        if self.connections.contains_key(&connection_id) {
            return Err(HubError::DuplicateId(connection_id));
        }
        self.connections.insert(connection_id, sink);
        Ok(())
    }

    /// 注销连接，返回连接此前是否存在
    pub fn unregister(&mut self, connection_id: &ConnectionId) -> bool {
        self.connections.remove(connection_id).is_some()
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<&dyn EventSink> {
        self.connections.get(connection_id).map(|sink| sink.as_ref())
    }

    /// 遍历当前所有存活连接
    pub fn iter(&self) -> impl Iterator<Item = (&ConnectionId, &dyn EventSink)> {
        self.connections
            .iter()
            .map(|(id, sink)| (id, sink.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
