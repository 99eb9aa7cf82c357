//! Recording storage engine for tests

use std::sync::Mutex;

use super::{CreateTableRequest, QueryRows, StorageEngine};
use crate::error::{Error, Result};

/// Records every call and answers from canned results
#[derive(Default)]
pub(crate) struct RecordingEngine {
    calls: Mutex<Vec<String>>,
    rows: Mutex<QueryRows>,
    affected: Mutex<u64>,
    failure: Mutex<Option<String>>,
}

impl RecordingEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Result set returned by every read
    pub(crate) fn with_rows(self, columns: &[&str], rows: Vec<Vec<serde_json::Value>>) -> Self {
        *self.rows.lock().unwrap() = QueryRows {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        };
        self
    }

    /// Row count returned by every mutating call
    pub(crate) fn with_affected(self, affected: u64) -> Self {
        *self.affected.lock().unwrap() = affected;
        self
    }

    /// Make every call fail with this engine message
    pub(crate) fn failing(self, message: &str) -> Self {
        *self.failure.lock().unwrap() = Some(message.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        match self.failure.lock().unwrap().as_ref() {
            Some(message) => Err(Error::QueryExecution(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl StorageEngine for RecordingEngine {
    async fn create_database(&self, name: &str) -> Result<()> {
        self.record(format!("create_database {}", name))
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        self.record(format!("drop_database {}", name))
    }

    async fn create_table(&self, request: &CreateTableRequest) -> Result<()> {
        self.record(request.to_sql())
    }

    async fn drop_table(&self, database: &str, table: &str) -> Result<()> {
        self.record(format!("drop_table {}.{}", database, table))
    }

    async fn execute_query(&self, statement: &str) -> Result<u64> {
        self.record(statement.to_string())?;
        Ok(*self.affected.lock().unwrap())
    }

    async fn query_rows(&self, statement: &str) -> Result<QueryRows> {
        self.record(statement.to_string())?;
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.failure.lock().unwrap().is_none())
    }
}
