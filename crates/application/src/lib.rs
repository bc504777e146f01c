//! 应用层实现。
//!
//! 提供实时广播中心，以及围绕节点仓储的用例服务（输入校验、错误归类）。

pub mod error;
pub mod hub;
pub mod services;

pub use error::ApplicationError;
pub use hub::{EventSink, Hub, HubError, HubStats};
pub use services::{NodeListing, NodeService};
