//! 节点注册与实时广播系统核心领域模型
//!
//! 包含节点实体、实时通道协议类型，以及仓储接口和错误定义。

pub mod entities;
pub mod errors;
pub mod repositories;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use repositories::*;
