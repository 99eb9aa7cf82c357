//! Replication Module
//!
//! Master-side coordination, the slave's session with the master, and
//! application of replicated row changes.

pub mod protocol;
mod applier;
mod master;
mod slave;

pub use protocol::{OperationKind, ReplicationOp};
pub use applier::ReplicationApplier;
pub use master::{Coordinator, MasterNode, SELECT_OK};
pub use slave::{local_identity, ConnectionManager, MASTER_ONLY_MESSAGE};
