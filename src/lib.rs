//! RelayDB - Master/Slave Coordination for MariaDB
//!
//! Coordinates a set of MariaDB nodes where one master owns schema changes
//! and every slave relays its queries to the master over a persistent,
//! line-delimited TCP session.
//!
//! # Architecture
//!
//! The master runs a coordination listener. Each request carries a shared
//! token and a claimed origin; the master records slave contact in an
//! in-memory registry, applies the authorization policy and runs the
//! statement on its local storage engine. Slaves keep one session open,
//! probe it with a heartbeat and reconnect on failure.
//!
//! # Features
//!
//! - Newline-delimited JSON wire protocol with per-request deadlines
//! - Slave registry with periodic eviction of silent slaves
//! - Schema changes reserved to the master
//! - Row-level replication apply (INSERT / UPDATE / DELETE)
//! - HTTP API for queries, slave listing and schema management

pub mod config;
pub mod error;
pub mod policy;
pub mod state;
pub mod replication;
pub mod executor;
pub mod network;
pub mod api;

pub use config::RelayConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{NodeRole, RelayConfig};
    pub use crate::error::{Error, Result};
    pub use crate::executor::{MariaDbExecutor, StorageEngine};
    pub use crate::network::{Request, Response, Status};
    pub use crate::policy::{authorize, authorize_http, Decision};
    pub use crate::replication::{ConnectionManager, Coordinator, MasterNode, ReplicationOp};
    pub use crate::state::SlaveRegistry;
}
