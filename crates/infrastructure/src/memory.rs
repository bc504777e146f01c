//! 内存实现的节点仓储（用于测试和无数据库的本地运行）
//!
//! 与 PostgreSQL 实现保持相同的约束：名称唯一、父节点必须存在、删除时级联。

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use domain::{NewNode, Node, NodeChanges, NodeQuery, NodeRepository, RepositoryError};
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    next_id: i32,
    nodes: BTreeMap<i32, Node>,
}

impl MemoryState {
    fn name_taken(&self, name: &str, except: Option<i32>) -> bool {
        self.nodes
            .values()
            .any(|node| node.name == name && Some(node.id) != except)
    }

    fn check_parent(&self, parent_id: Option<i32>) -> Result<(), RepositoryError> {
        match parent_id {
            Some(id) if !self.nodes.contains_key(&id) => Err(RepositoryError::invalid_reference(
                format!("parent node {id} does not exist"),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct InMemoryNodeRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryNodeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeRepository for InMemoryNodeRepository {
    async fn list(&self, query: NodeQuery) -> Result<Vec<Node>, RepositoryError> {
        let state = self.state.read().await;
        let nodes = state.nodes.values().cloned();
        let result = match query {
            NodeQuery::All => nodes.collect(),
            NodeQuery::Page { offset, limit } => nodes
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .collect(),
            NodeQuery::NameLike(pattern) => {
                let pattern = pattern.to_lowercase();
                nodes
                    .filter(|node| node.name.to_lowercase().contains(&pattern))
                    .collect()
            }
        };
        Ok(result)
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(self.state.read().await.nodes.len() as i64)
    }

    async fn roots(&self) -> Result<Vec<Node>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.nodes.values().filter(|n| n.is_root()).cloned().collect())
    }

    async fn children(&self, parent_id: i32) -> Result<Vec<Node>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .nodes
            .values()
            .filter(|n| n.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn create(&self, node: NewNode) -> Result<Node, RepositoryError> {
        let mut state = self.state.write().await;
        if state.name_taken(&node.name, None) {
            return Err(RepositoryError::Conflict);
        }
        state.check_parent(node.parent_id)?;

        state.next_id += 1;
        let now = Utc::now();
        let created = Node {
            id: state.next_id,
            parent_id: node.parent_id,
            name: node.name,
            ip: node.ip,
            port: node.port,
            created_at: now,
            updated_at: now,
        };
        state.nodes.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i32, changes: NodeChanges) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.nodes.contains_key(&id) {
            return Ok(0);
        }
        if let Some(name) = &changes.name {
            if state.name_taken(name, Some(id)) {
                return Err(RepositoryError::Conflict);
            }
        }
        if let Some(parent_id) = changes.parent_id {
            state.check_parent(parent_id)?;
        }

        let Some(node) = state.nodes.get_mut(&id) else {
            return Ok(0);
        };
        if let Some(name) = changes.name {
            node.name = name;
        }
        if let Some(parent_id) = changes.parent_id {
            node.parent_id = parent_id;
        }
        if let Some(ip) = changes.ip {
            node.ip = ip;
        }
        if let Some(port) = changes.port {
            node.port = port;
        }
        node.updated_at = Utc::now();
        Ok(1)
    }

    async fn delete(&self, id: i32) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.nodes.contains_key(&id) {
            return Ok(0);
        }

        // 子树随之级联删除，但与数据库一样只计入直接删除的那一行
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            state.nodes.remove(&current);
            pending.extend(
                state
                    .nodes
                    .values()
                    .filter(|n| n.parent_id == Some(current))
                    .map(|n| n.id),
            );
        }
        Ok(1)
    }
}
