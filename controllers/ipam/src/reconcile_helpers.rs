//! Helper functions for common reconciliation patterns
//!
//! Finalizer bookkeeping, resource keys, status comparison, and the
//! allocation failure reasons recorded on claims.

use crds::{FINALIZER, IPClaim, IPClaimStatus, IPPoolStatus, Phase};
use kube::{Resource, ResourceExt};
use std::fmt;

/// Whether deletion of `obj` has been requested
pub fn is_deleting<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

/// Whether `obj` carries the IPAM finalizer
pub fn has_finalizer<K: Resource>(obj: &K) -> bool {
    obj.finalizers().iter().any(|f| f == FINALIZER)
}

/// Attach the IPAM finalizer. Returns `true` if it was missing.
pub fn add_finalizer<K: Resource>(obj: &mut K) -> bool {
    if has_finalizer(obj) {
        return false;
    }
    obj.finalizers_mut().push(FINALIZER.to_string());
    true
}

/// Remove the IPAM finalizer. Returns `true` if it was present.
pub fn remove_finalizer<K: Resource>(obj: &mut K) -> bool {
    let finalizers = obj.finalizers_mut();
    let before = finalizers.len();
    finalizers.retain(|f| f != FINALIZER);
    finalizers.len() != before
}

/// Whether the status was derived from an older spec than the current one.
///
/// Covers spec changes the controller missed while it was not running.
pub fn generation_changed(generation: Option<i64>, observed_generation: Option<i64>) -> bool {
    generation.is_some() && generation != observed_generation
}

/// Namespace and name of an IPClaim
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClaimKey {
    /// Claim namespace
    pub namespace: String,
    /// Claim name
    pub name: String,
}

impl ClaimKey {
    /// Build a key from its parts
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of `claim`
    pub fn of(claim: &IPClaim) -> Self {
        Self::new(claim.namespace().unwrap_or_default(), claim.name_any())
    }
}

// Also the owner label recorded in a pool's `owners` index
impl fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Why a claim could not be given an address.
///
/// Rendered as `<kind>: <detail>` into the claim's `status.reason`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationFailure {
    /// The referenced pool does not exist
    #[error("pool not found: pool {0:?} does not exist")]
    PoolNotFound(String),

    /// The referenced pool is being deleted
    #[error("pool terminated: pool {0:?} is being deleted")]
    PoolTerminated(String),

    /// The referenced pool has not been reconciled into Active
    #[error("pool not ready: pool {pool:?} {detail}")]
    PoolNotReady {
        /// Pool name
        pool: String,
        /// What is wrong with it
        detail: String,
    },

    /// No free address is left
    #[error("pool exhausted: pool {0:?} has no allocatable addresses")]
    PoolExhausted(String),

    /// The wanted address is held by another claim
    #[error("duplicate allocation: address {address} is already allocated from pool {pool:?}")]
    DuplicateAllocation {
        /// Pool name
        pool: String,
        /// Wanted address
        address: String,
    },

    /// The wanted address is not one the pool can hand out
    #[error("address out of range: address {address:?} is not allocatable from pool {pool:?}")]
    AddressOutOfRange {
        /// Pool name
        pool: String,
        /// Wanted address
        address: String,
    },
}

impl AllocationFailure {
    /// Failure for a pool that exists but is not Active
    pub fn not_ready(pool: &str, phase: Phase) -> Self {
        Self::PoolNotReady {
            pool: pool.to_string(),
            detail: format!("is {}", phase),
        }
    }
}

/// Check if a pool status needs to be written.
///
/// `lastUpdateTime` is ignored so re-deriving an unchanged status does not
/// cause a write (and the watch event that follows it).
pub fn pool_status_needs_update(current: Option<&IPPoolStatus>, desired: &IPPoolStatus) -> bool {
    match current {
        None => true,
        Some(current) => {
            let mut desired = desired.clone();
            desired.last_update_time = current.last_update_time;
            *current != desired
        }
    }
}

/// Check if a claim status needs to be written. See [`pool_status_needs_update`].
pub fn claim_status_needs_update(current: Option<&IPClaimStatus>, desired: &IPClaimStatus) -> bool {
    match current {
        None => true,
        Some(current) => {
            let mut desired = desired.clone();
            desired.last_update_time = current.last_update_time;
            *current != desired
        }
    }
}
