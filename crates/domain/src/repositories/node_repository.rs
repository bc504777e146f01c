//! 节点Repository接口

use async_trait::async_trait;

use crate::entities::node::{NewNode, Node, NodeChanges, NodeQuery};
use crate::errors::RepositoryError;

/// 节点数据访问接口
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// 按查询方式列出节点（按ID排序）
    async fn list(&self, query: NodeQuery) -> Result<Vec<Node>, RepositoryError>;

    /// 节点总数
    async fn count(&self) -> Result<i64, RepositoryError>;

    /// 所有根节点
    async fn roots(&self) -> Result<Vec<Node>, RepositoryError>;

    /// 指定节点的直接子节点
    async fn children(&self, parent_id: i32) -> Result<Vec<Node>, RepositoryError>;

    /// 创建节点，名称重复时返回 `Conflict`
    async fn create(&self, node: NewNode) -> Result<Node, RepositoryError>;

    /// 部分更新，返回受影响的行数
    async fn update(&self, id: i32, changes: NodeChanges) -> Result<u64, RepositoryError>;

    /// 删除节点（子节点级联删除），返回删除的行数
    async fn delete(&self, id: i32) -> Result<u64, RepositoryError>;
}
