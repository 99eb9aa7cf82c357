//! Replication Applier
//!
//! Turns a [`ReplicationOp`] into exactly one mutating storage call.

use std::sync::Arc;

use super::protocol::ReplicationOp;
use crate::executor::StorageEngine;
use crate::error::Result;

/// Applies replication operations to the local storage engine
pub struct ReplicationApplier {
    engine: Arc<dyn StorageEngine>,
}

impl ReplicationApplier {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self { engine }
    }

    /// Apply one operation and return the affected row count.
    ///
    /// Unsupported kinds are rejected before the engine is touched; engine
    /// errors are returned unchanged.
    pub async fn apply(&self, op: &ReplicationOp) -> Result<u64> {
        let statement = op.to_sql()?;

        tracing::debug!(
            operation = %op.operation,
            target = %op.target(),
            "Applying replicated change"
        );

        let affected = self.engine.execute_query(&statement).await?;
        tracing::info!(
            operation = %op.operation,
            target = %op.target(),
            rows = affected,
            "Replication applied"
        );
        Ok(affected)
    }
}
