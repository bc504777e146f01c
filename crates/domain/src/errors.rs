//! 领域模型错误定义
//!
//! 定义了系统中所有可能的错误类型，提供清晰的错误上下文。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 资源不存在错误
    #[error("资源不存在: {resource_type} ID {resource_id}")]
    ResourceNotFound {
        resource_type: String,
        resource_id: String,
    },

    /// 资源已存在错误
    #[error("资源已存在: {resource_type} {identifier}")]
    ResourceAlreadyExists {
        resource_type: String,
        identifier: String,
    },

    /// 验证错误
    #[error("验证失败: {field}: {message}")]
    ValidationError { field: String, message: String },
}

impl DomainError {
    /// 创建验证错误
    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建资源不存在错误
    pub fn resource_not_found(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self::ResourceNotFound {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    /// 创建资源已存在错误
    pub fn resource_already_exists(
        resource_type: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self::ResourceAlreadyExists {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 仓储层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    /// 违反唯一约束
    #[error("unique constraint violated")]
    Conflict,
    /// 违反外键约束（例如父节点不存在）
    #[error("invalid reference: {message}")]
    InvalidReference { message: String },
    /// 存储层故障，`kind` 为简短的错误类别，可以返回给客户端
    #[error("storage error ({kind}): {message}")]
    Storage { kind: String, message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::storage_with_kind("StorageError", message)
    }

    pub fn storage_with_kind(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn invalid_reference(message: impl Into<String>) -> Self {
        Self::InvalidReference {
            message: message.into(),
        }
    }
}
