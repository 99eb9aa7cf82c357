//! State Management Module
//!
//! In-memory tracking of the slaves known to the master.

mod registry;

pub use registry::{SlaveRegistry, STALE_AFTER, SWEEP_INTERVAL};
