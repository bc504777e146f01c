use std::sync::Arc;

use domain::{
    DomainError, NewNode, Node, NodeChanges, NodeQuery, NodeRepository, RepositoryError,
};

use crate::error::ApplicationError;

/// 节点列表及总数
#[derive(Debug, Clone, PartialEq)]
pub struct NodeListing {
    pub nodes: Vec<Node>,
    /// 表中节点总数，与过滤条件无关
    pub total: i64,
}

pub struct NodeService {
    repository: Arc<dyn NodeRepository>,
}

impl NodeService {
    pub fn new(repository: Arc<dyn NodeRepository>) -> Self {
        Self { repository }
    }

    pub async fn list(&self, query: NodeQuery) -> Result<NodeListing, ApplicationError> {
        let nodes = self.repository.list(query).await?;
        let total = self.repository.count().await?;
        Ok(NodeListing { nodes, total })
    }

    pub async fn roots(&self) -> Result<Vec<Node>, ApplicationError> {
        Ok(self.repository.roots().await?)
    }

    pub async fn children(&self, parent_id: i32) -> Result<Vec<Node>, ApplicationError> {
        Ok(self.repository.children(parent_id).await?)
    }

    pub async fn create(&self, node: NewNode) -> Result<Node, ApplicationError> {
        node.validate()?;
        let name = node.name.clone();

        let created = self
            .repository
            .create(node)
            .await
            .map_err(|err| Self::map_write_error(err, &name))?;

        tracing::info!(node_id = created.id, name = %created.name, "节点已创建");
        Ok(created)
    }

    pub async fn update(&self, id: i32, changes: NodeChanges) -> Result<(), ApplicationError> {
        changes.validate(id)?;
        let name = changes.name.clone().unwrap_or_default();

        let affected = self
            .repository
            .update(id, changes)
            .await
            .map_err(|err| Self::map_write_error(err, &name))?;
        if affected == 0 {
            return Err(DomainError::resource_not_found("node", id.to_string()).into());
        }

        tracing::info!(node_id = id, "节点已更新");
        Ok(())
    }

    /// 删除节点，子孙节点由存储层级联删除
    ///
    /// 返回直接删除的行数：节点存在时为 1，不存在时为 0，不包含级联删除的行。
    pub async fn delete(&self, id: i32) -> Result<u64, ApplicationError> {
        let deleted = self.repository.delete(id).await?;
        tracing::info!(node_id = id, deleted, "节点已删除");
        Ok(deleted)
    }

    fn map_write_error(err: RepositoryError, name: &str) -> ApplicationError {
        match err {
            RepositoryError::Conflict => DomainError::resource_already_exists("node", name).into(),
            RepositoryError::InvalidReference { message } => {
                DomainError::validation_error("parentId", message).into()
            }
            other => other.into(),
        }
    }
}
