//! Schema Statements
//!
//! DDL builders for database and table management. Names and column
//! definitions are interpolated as given.

use serde::{Deserialize, Serialize};

/// Column definition for table creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl TableColumn {
    fn to_sql(&self) -> String {
        let nullable = if self.nullable { "NULL" } else { "NOT NULL" };
        match self.default.as_deref().filter(|d| !d.is_empty()) {
            Some(default) => format!("{} {} {} DEFAULT {}", self.name, self.data_type, nullable, default),
            None => format!("{} {} {}", self.name, self.data_type, nullable),
        }
    }
}

/// Table creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub db_name: String,
    pub table_name: String,
    pub columns: Vec<TableColumn>,
}

impl CreateTableRequest {
    pub fn to_sql(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(TableColumn::to_sql).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {}.{} ({})",
            self.db_name,
            self.table_name,
            columns.join(", ")
        )
    }
}

pub(crate) fn create_database_sql(name: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {}", name)
}

pub(crate) fn drop_database_sql(name: &str) -> String {
    format!("DROP DATABASE IF EXISTS {}", name)
}

pub(crate) fn drop_table_sql(database: &str, table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}.{}", database, table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_sql() {
        let req: CreateTableRequest = serde_json::from_str(
            r#"{
                "db_name": "shop",
                "table_name": "items",
                "columns": [
                    {"name": "id", "type": "INT", "nullable": false},
                    {"name": "label", "type": "VARCHAR(64)", "nullable": true, "default": "'none'"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(
            req.to_sql(),
            "CREATE TABLE IF NOT EXISTS shop.items (id INT NOT NULL, label VARCHAR(64) NULL DEFAULT 'none')"
        );
    }

    #[test]
    fn test_database_sql() {
        assert_eq!(create_database_sql("shop"), "CREATE DATABASE IF NOT EXISTS shop");
        assert_eq!(drop_database_sql("shop"), "DROP DATABASE IF EXISTS shop");
        assert_eq!(drop_table_sql("shop", "items"), "DROP TABLE IF EXISTS shop.items");
    }
}
