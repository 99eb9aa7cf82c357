//! MariaDB Executor
//!
//! Runs statements against a MariaDB server through a server-level pool.
//! Statements are sent as plain text (no prepared-statement round trip),
//! so any statement the server accepts can be relayed.

use std::time::Duration;
use serde_json::Value;
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Executor, MySqlPool, Row, TypeInfo, ValueRef};

use super::schema::{create_database_sql, drop_database_sql, drop_table_sql, CreateTableRequest};
use super::{QueryRows, StorageEngine};
use crate::config::DatabaseConfig;
use crate::error::Result;

/// MariaDB-backed storage engine
pub struct MariaDbExecutor {
    pool: MySqlPool,
}

impl MariaDbExecutor {
    /// Create a new executor with a connection pool
    pub async fn new(database_url: &str, config: &DatabaseConfig) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run(&self, statement: &str) -> Result<u64> {
        tracing::debug!("Executing: {}", &statement[..floor_char_boundary(statement, 100)]);
        let result = (&self.pool).execute(statement).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl StorageEngine for MariaDbExecutor {
    async fn create_database(&self, name: &str) -> Result<()> {
        self.run(&create_database_sql(name)).await.map(|_| ())
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        self.run(&drop_database_sql(name)).await.map(|_| ())
    }

    async fn create_table(&self, request: &CreateTableRequest) -> Result<()> {
        self.run(&request.to_sql()).await.map(|_| ())
    }

    async fn drop_table(&self, database: &str, table: &str) -> Result<()> {
        self.run(&drop_table_sql(database, table)).await.map(|_| ())
    }

    async fn execute_query(&self, statement: &str) -> Result<u64> {
        self.run(statement).await
    }

    async fn query_rows(&self, statement: &str) -> Result<QueryRows> {
        let rows: Vec<MySqlRow> = (&self.pool).fetch_all(statement).await?;

        let columns: Vec<String> = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => match (&self.pool).describe(statement).await {
                Ok(described) => described.columns().iter().map(|c| c.name().to_string()).collect(),
                Err(e) => {
                    tracing::debug!("Could not describe empty result set: {}", e);
                    Vec::new()
                }
            },
        };

        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|i| column_value(row, i)).collect())
            .collect();

        Ok(QueryRows { columns, rows })
    }

    async fn health_check(&self) -> Result<bool> {
        let result: (i64,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(result.0 == 1)
    }
}

/// Convert one column of a row to JSON. Binary values become text.
fn column_value(row: &MySqlRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    let decoded = match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(index).map(Value::from).ok(),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<i64, _>(index).map(Value::from).ok()
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" | "YEAR" => row.try_get::<u64, _>(index).map(Value::from).ok(),
        "FLOAT" => row.try_get::<f32, _>(index).map(|f| Value::from(f as f64)).ok(),
        "DOUBLE" => row.try_get::<f64, _>(index).map(Value::from).ok(),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(index)
            .map(|d| Value::from(d.to_string()))
            .ok(),
        "TIME" => row
            .try_get::<chrono::NaiveTime, _>(index)
            .map(|t| Value::from(t.to_string()))
            .ok(),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(|t| Value::from(t.format("%Y-%m-%d %H:%M:%S").to_string()))
            .ok(),
        _ => row.try_get_unchecked::<String, _>(index).map(Value::from).ok(),
    };

    decoded.unwrap_or_else(|| {
        row.try_get_unchecked::<Vec<u8>, _>(index)
            .map(|bytes| Value::from(String::from_utf8_lossy(&bytes).into_owned()))
            .unwrap_or(Value::Null)
    })
}

/// Largest char boundary not past `max`
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_truncation_respects_char_boundaries() {
        let stmt = format!("INSERT INTO t VALUES ('{}')", "é".repeat(80));
        let end = floor_char_boundary(&stmt, 100);
        assert!(end <= 100);
        assert!(stmt.is_char_boundary(end));
        assert_eq!(floor_char_boundary("SELECT 1", 100), 8);
    }

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn test_mariadb_round_trip() {
        let config = DatabaseConfig {
            host: std::env::var("RELAYDB_TEST_DB_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: 3306,
            user: std::env::var("RELAYDB_TEST_DB_USER").unwrap_or_else(|_| "root".into()),
            password: std::env::var("RELAYDB_TEST_DB_PASSWORD").unwrap_or_default(),
            pool_size: 2,
            connect_timeout_secs: 5,
        };
        let url = format!(
            "mysql://{}:{}@{}:{}",
            config.user, config.password, config.host, config.port
        );
        let executor = MariaDbExecutor::new(&url, &config).await.unwrap();
        assert!(executor.health_check().await.unwrap());

        executor.create_database("relaydb_it").await.unwrap();
        executor
            .execute_query("CREATE TABLE IF NOT EXISTS relaydb_it.items (id INT, label VARBINARY(16))")
            .await
            .unwrap();
        executor.execute_query("DELETE FROM relaydb_it.items").await.unwrap();
        let affected = executor
            .execute_query("INSERT INTO relaydb_it.items VALUES (1, 'x')")
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let result = executor.query_rows("SELECT id, label FROM relaydb_it.items").await.unwrap();
        assert_eq!(result.columns, vec!["id", "label"]);
        assert_eq!(result.rows, vec![vec![Value::from(1), Value::from("x")]]);

        executor.drop_database("relaydb_it").await.unwrap();
        executor.close().await;
    }
}
