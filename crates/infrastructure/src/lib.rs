//! 基础设施层实现。
//!
//! 提供节点仓储的 PostgreSQL 与内存实现，以及数据库迁移。

pub mod memory;
pub mod migrations;
pub mod repository;

pub use memory::InMemoryNodeRepository;
pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgNodeRepository};
