use std::collections::{HashMap, HashSet};

use domain::ConnectionId;

use super::HubError;

/// 在线用户名表
///
/// 每个连接至多一个用户名，所有存活连接之间用户名唯一（大小写、空白敏感）。
/// 用户名列表保持登记顺序。
#[derive(Debug, Default)]
pub struct PresenceTable {
    by_connection: HashMap<ConnectionId, String>,
    order: Vec<ConnectionId>,
    taken: HashSet<String>,
}

impl PresenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子地检查并占用用户名，成功时返回当前全部用户名
    ///
    /// 已有用户名的连接再次登记时，旧用户名被释放。
    pub fn try_claim(
        &mut self,
        connection_id: &ConnectionId,
        username: &str,
    ) -> Result<Vec<String>, HubError> {
        if username.is_empty() {
            return Err(HubError::EmptyUsername);
        }
        if self.taken.contains(username) {
            return Err(HubError::NameTaken(username.to_string()));
        }

        self.release(connection_id);
        self.taken.insert(username.to_string());
        self.by_connection
            .insert(connection_id.clone(), username.to_string());
        self.order.push(connection_id.clone());

        Ok(self.all_names())
    }

    /// 释放连接的用户名，返回被释放的用户名
    pub fn release(&mut self, connection_id: &ConnectionId) -> Option<String> {
        let username = self.by_connection.remove(connection_id)?;
        self.taken.remove(&username);
        self.order.retain(|id| id != connection_id);
        Some(username)
    }

    pub fn name_of(&self, connection_id: &ConnectionId) -> Option<&str> {
        self.by_connection.get(connection_id).map(String::as_str)
    }

    /// 按登记顺序返回所有用户名
    pub fn all_names(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|id| self.by_connection.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_connection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_connection.is_empty()
    }
}
