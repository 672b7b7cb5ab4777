//! Scoped lock leases
//!
//! One lease guards an environment-scoped operation. A live lease blocks
//! other callers; a lease past the staleness window may be taken over.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A lease older than this may be forcibly taken by a new lock request
pub const LOCK_STALE_AFTER: std::time::Duration = std::time::Duration::from_secs(60 * 60);

/// What a lock request covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockScope {
    /// Datacenter name
    pub datacenter: String,
    /// Environment name
    pub environment: String,
    /// Component, when the operation is component-scoped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Operation being performed (deploy, destroy, …)
    pub operation: String,
    /// Who requested the lock (user@host, CI job id, …)
    pub who: String,
}

/// An acquired lock lease
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockLease {
    /// Stable lease id, required for release
    pub id: Uuid,
    /// The locked scope
    pub scope: LockScope,
    /// Acquisition time
    pub acquired_at: DateTime<Utc>,
}

impl LockLease {
    /// Mint a fresh lease for a scope
    pub fn new(scope: LockScope) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope,
            acquired_at: Utc::now(),
        }
    }

    /// Age of the lease
    pub fn age(&self) -> Duration {
        Utc::now() - self.acquired_at
    }

    /// Whether the lease has passed the staleness window
    pub fn is_stale(&self) -> bool {
        self.age() > Duration::from_std(LOCK_STALE_AFTER).expect("constant duration")
    }
}
