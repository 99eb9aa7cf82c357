//! Replication Records
//!
//! A replication operation names a target table, an operation kind and a
//! raw SQL fragment. The fragment is spliced into the generated statement
//! as given.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One row-level change to apply to `db_name.table_name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationOp {
    pub db_name: String,
    pub table_name: String,
    /// `INSERT`, `UPDATE` or `DELETE`
    pub operation: String,
    /// VALUES list, SET clause or WHERE clause, depending on the operation
    pub data: String,
}

/// Supported operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    /// Parse an operation name. Matching is exact.
    pub fn parse(operation: &str) -> Result<Self> {
        match operation {
            "INSERT" => Ok(OperationKind::Insert),
            "UPDATE" => Ok(OperationKind::Update),
            "DELETE" => Ok(OperationKind::Delete),
            other => Err(Error::UnsupportedOperation(other.to_string())),
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Insert => write!(f, "INSERT"),
            OperationKind::Update => write!(f, "UPDATE"),
            OperationKind::Delete => write!(f, "DELETE"),
        }
    }
}

impl ReplicationOp {
    pub fn new(
        db_name: impl Into<String>,
        table_name: impl Into<String>,
        operation: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            db_name: db_name.into(),
            table_name: table_name.into(),
            operation: operation.into(),
            data: data.into(),
        }
    }

    pub fn kind(&self) -> Result<OperationKind> {
        OperationKind::parse(&self.operation)
    }

    /// Qualified target, `db.table`
    pub fn target(&self) -> String {
        format!("{}.{}", self.db_name, self.table_name)
    }

    /// Build the statement for this operation
    pub fn to_sql(&self) -> Result<String> {
        let target = self.target();
        let sql = match self.kind()? {
            OperationKind::Insert => format!("INSERT INTO {} VALUES ({})", target, self.data),
            OperationKind::Update => format!("UPDATE {} SET {}", target, self.data),
            OperationKind::Delete => format!("DELETE FROM {} WHERE {}", target, self.data),
        };
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_shapes() {
        let insert = ReplicationOp::new("shop", "items", "INSERT", "'id',1,'x'");
        assert_eq!(insert.to_sql().unwrap(), "INSERT INTO shop.items VALUES ('id',1,'x')");

        let update = ReplicationOp::new("shop", "items", "UPDATE", "label = 'y'");
        assert_eq!(update.to_sql().unwrap(), "UPDATE shop.items SET label = 'y'");

        let delete = ReplicationOp::new("shop", "items", "DELETE", "id = 1");
        assert_eq!(delete.to_sql().unwrap(), "DELETE FROM shop.items WHERE id = 1");
    }

    #[test]
    fn test_kind_match_is_exact() {
        for op in ["MERGE", "insert", " INSERT", ""] {
            let err = OperationKind::parse(op).unwrap_err();
            assert!(matches!(err, Error::UnsupportedOperation(_)));
        }
        assert_eq!(
            ReplicationOp::new("a", "b", "MERGE", "").to_sql().unwrap_err().to_string(),
            "unsupported operation: MERGE"
        );
    }

    #[test]
    fn test_wire_shape() {
        let op: ReplicationOp = serde_json::from_str(
            r#"{"db_name":"shop","table_name":"items","operation":"DELETE","data":"id = 1"}"#,
        )
        .unwrap();
        assert_eq!(op.kind().unwrap(), OperationKind::Delete);
        assert_eq!(op.target(), "shop.items");
    }
}
