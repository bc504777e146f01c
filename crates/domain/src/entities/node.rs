//! 网络节点实体
//!
//! 节点通过 `parent_id` 自引用形成树状层级，名称全局唯一。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{DomainError, DomainResult};

/// 节点实体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// 节点ID（自增）
    pub id: i32,
    /// 父节点ID，根节点为空
    pub parent_id: Option<i32>,
    /// 节点名称（唯一）
    pub name: String,
    /// 节点地址
    #[serde(rename = "IP")]
    pub ip: String,
    /// 节点端口
    pub port: i32,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// 创建节点所需的字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNode {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i32>,
    #[serde(rename = "IP")]
    pub ip: String,
    pub port: i32,
}

impl NewNode {
    pub fn validate(&self) -> DomainResult<()> {
        validate_name(&self.name)?;
        validate_ip(&self.ip)?;
        validate_port(self.port)
    }
}

/// 节点的部分更新
///
/// 缺省字段保持不变；`parentId: null` 会把节点移到根层级。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "explicit_option")]
    pub parent_id: Option<Option<i32>>,
    #[serde(default, rename = "IP")]
    pub ip: Option<String>,
    #[serde(default)]
    pub port: Option<i32>,
}

impl NodeChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.parent_id.is_none() && self.ip.is_none() && self.port.is_none()
    }

    /// 校验更新内容，`id` 为被更新的节点
    pub fn validate(&self, id: i32) -> DomainResult<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(ip) = &self.ip {
            validate_ip(ip)?;
        }
        if let Some(port) = self.port {
            validate_port(port)?;
        }
        if self.parent_id == Some(Some(id)) {
            return Err(DomainError::validation_error(
                "parentId",
                "a node cannot be its own parent",
            ));
        }
        Ok(())
    }
}

/// 节点列表查询方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeQuery {
    /// 全部节点
    All,
    /// 分页
    Page { offset: i64, limit: i64 },
    /// 名称模糊匹配（不区分大小写）
    NameLike(String),
}

impl NodeQuery {
    /// 按请求参数选择查询方式：名称过滤优先，其次是完整的分页参数
    pub fn from_params(
        offset: Option<i64>,
        limit: Option<i64>,
        where_name_is_like: Option<String>,
    ) -> Self {
        match (where_name_is_like, offset, limit) {
            (Some(pattern), _, _) if !pattern.is_empty() => NodeQuery::NameLike(pattern),
            (_, Some(offset), Some(limit)) => NodeQuery::Page {
                offset: offset.max(0),
                limit: limit.max(0),
            },
            _ => NodeQuery::All,
        }
    }
}

fn validate_name(name: &str) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::validation_error("name", "must not be empty"));
    }
    Ok(())
}

fn validate_ip(ip: &str) -> DomainResult<()> {
    if ip.trim().is_empty() {
        return Err(DomainError::validation_error("IP", "must not be empty"));
    }
    Ok(())
}

fn validate_port(port: i32) -> DomainResult<()> {
    if !(0..=65535).contains(&port) {
        return Err(DomainError::validation_error(
            "port",
            "must be between 0 and 65535",
        ));
    }
    Ok(())
}

// 区分“字段缺省”和“显式 null”
fn explicit_option<'de, D>(deserializer: D) -> Result<Option<Option<i32>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i32>::deserialize(deserializer).map(Some)
}
