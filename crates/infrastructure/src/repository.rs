use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{NewNode, Node, NodeChanges, NodeQuery, NodeRepository, RepositoryError};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, QueryBuilder};

const NODE_COLUMNS: &str = "id, parent_id, name, ip, port, created_at, updated_at";

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return RepositoryError::Conflict;
        }
        if db_err.is_foreign_key_violation() {
            return RepositoryError::invalid_reference(db_err.message().to_string());
        }
    }
    RepositoryError::storage_with_kind(error_kind(&err), err.to_string())
}

fn error_kind(err: &sqlx::Error) -> &'static str {
    match err {
        sqlx::Error::Database(_) => "DatabaseError",
        sqlx::Error::Io(_) => "IoError",
        sqlx::Error::Tls(_) => "TlsError",
        sqlx::Error::Protocol(_) => "ProtocolError",
        sqlx::Error::RowNotFound => "RowNotFound",
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => "DecodeError",
        sqlx::Error::PoolTimedOut => "PoolTimedOut",
        sqlx::Error::PoolClosed => "PoolClosed",
        _ => "StorageError",
    }
}

#[derive(Debug, FromRow)]
struct NodeRecord {
    id: i32,
    parent_id: Option<i32>,
    name: String,
    ip: String,
    port: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<NodeRecord> for Node {
    fn from(value: NodeRecord) -> Self {
        Node {
            id: value.id,
            parent_id: value.parent_id,
            name: value.name,
            ip: value.ip,
            port: value.port,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgNodeRepository {
    pool: PgPool,
}

impl PgNodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NodeRepository for PgNodeRepository {
    async fn list(&self, query: NodeQuery) -> Result<Vec<Node>, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {NODE_COLUMNS} FROM nodes"));
        match query {
            NodeQuery::All => {
                builder.push(" ORDER BY id");
            }
            NodeQuery::Page { offset, limit } => {
                builder
                    .push(" ORDER BY id OFFSET ")
                    .push_bind(offset)
                    .push(" LIMIT ")
                    .push_bind(limit);
            }
            NodeQuery::NameLike(pattern) => {
                builder
                    .push(" WHERE name ILIKE '%' || ")
                    .push_bind(pattern)
                    .push(" || '%' ORDER BY id");
            }
        }

        let records = builder
            .build_query_as::<NodeRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Node::from).collect())
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM nodes")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)
    }

    async fn roots(&self) -> Result<Vec<Node>, RepositoryError> {
        let records = sqlx::query_as::<_, NodeRecord>(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE parent_id IS NULL ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Node::from).collect())
    }

    async fn children(&self, parent_id: i32) -> Result<Vec<Node>, RepositoryError> {
        let records = sqlx::query_as::<_, NodeRecord>(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE parent_id = $1 ORDER BY id"
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Node::from).collect())
    }

    async fn create(&self, node: NewNode) -> Result<Node, RepositoryError> {
        let record = sqlx::query_as::<_, NodeRecord>(&format!(
            r#"
            INSERT INTO nodes (parent_id, name, ip, port)
            VALUES ($1, $2, $3, $4)
            RETURNING {NODE_COLUMNS}
            "#
        ))
        .bind(node.parent_id)
        .bind(&node.name)
        .bind(&node.ip)
        .bind(node.port)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.into())
    }

    async fn update(&self, id: i32, changes: NodeChanges) -> Result<u64, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE nodes SET updated_at = now()");
        if let Some(name) = changes.name {
            builder.push(", name = ").push_bind(name);
        }
        if let Some(parent_id) = changes.parent_id {
            builder.push(", parent_id = ").push_bind(parent_id);
        }
        if let Some(ip) = changes.ip {
            builder.push(", ip = ").push_bind(ip);
        }
        if let Some(port) = changes.port {
            builder.push(", port = ").push_bind(port);
        }
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, id: i32) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM nodes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    tracing::info!(max_connections, "PostgreSQL 连接池已创建");
    Ok(pool)
}
