//! # cld-state
//!
//! Persisted deployment state: the record types written after every node
//! execution, the pluggable storage backend trait with memory, local
//! filesystem, and sled implementations, scoped lock leases, and the
//! coordinator that gives the engine a typed CRUD surface over the
//! path-based layout.
//!
//! Layout (opaque to callers):
//! `datacenters/<dc>/environments/<env>/components/<comp>/resources/<type>.<name>.state.json`

#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod backend;
mod coordinator;
mod lock;
mod paths;
mod records;

pub use backend::{LocalBackend, MemoryBackend, SledBackend, StateBackend};
pub use coordinator::StateCoordinator;
pub use lock::{LockLease, LockScope, LOCK_STALE_AFTER};
pub use records::{
    ComponentRecord, ComponentState, DatacenterRecord, EnvironmentRecord, EnvironmentState,
    ModuleState, ResourceState, ResourceStatus,
};

/// Error types for state storage and coordination
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Another operation holds the lock
    #[error("Locked by {who} ({operation}) since {since}")]
    Locked {
        /// Holder identity
        who: String,
        /// Operation the holder is performing
        operation: String,
        /// When the lock was acquired
        since: chrono::DateTime<chrono::Utc>,
    },

    /// Lease id mismatch on unlock
    #[error("Stale lease: {0}")]
    StaleLease(uuid::Uuid),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sled database error
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Backend-specific failure
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
