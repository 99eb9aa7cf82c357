//! Database Executor Module
//!
//! The storage engine contract the coordination layer runs statements
//! through, and its MariaDB implementation.

mod mariadb;
mod schema;
#[cfg(test)]
pub(crate) mod mock;

pub use mariadb::MariaDbExecutor;
pub use schema::{CreateTableRequest, TableColumn};

use crate::error::Result;

/// Column names and rows returned by a read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Storage engine operations used by the master and by replication
#[async_trait::async_trait]
pub trait StorageEngine: Send + Sync {
    /// Create a database if it does not exist
    async fn create_database(&self, name: &str) -> Result<()>;

    /// Drop a database if it exists
    async fn drop_database(&self, name: &str) -> Result<()>;

    /// Create a table if it does not exist
    async fn create_table(&self, request: &CreateTableRequest) -> Result<()>;

    /// Drop a table if it exists
    async fn drop_table(&self, database: &str, table: &str) -> Result<()>;

    /// Run a mutating statement and return the affected row count
    async fn execute_query(&self, statement: &str) -> Result<u64>;

    /// Run a read and collect its result set
    async fn query_rows(&self, statement: &str) -> Result<QueryRows>;

    /// Check if the engine is reachable
    async fn health_check(&self) -> Result<bool>;
}
