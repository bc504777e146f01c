//! Repository接口定义
//!
//! 定义数据访问层的抽象接口，由基础设施层实现。

pub mod node_repository;

pub use node_repository::NodeRepository;
#[cfg(feature = "testing")]
pub use node_repository::MockNodeRepository;
