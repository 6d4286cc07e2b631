//! Reconcile triggers.
//!
//! The controller runtime hands every reconcile the latest cached object, not
//! the watch event that caused it. The trigger is re-derived from the object
//! itself: a missing `observedGeneration` means it was never reconciled, a
//! `metadata.generation` ahead of it means the spec changed, and a deletion
//! timestamp means deletion was requested.

use crate::reconcile_helpers::{generation_changed, is_deleting};
use crds::{IPClaim, IPPool, Phase};
use kube::Resource;
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;

/// Why a resource is being reconciled
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent<K> {
    /// No status has been derived from the object yet
    Created(Arc<K>),
    /// The object was reconciled before
    Updated {
        /// Current object
        object: Arc<K>,
        /// `metadata.generation` moved past `status.observedGeneration`
        spec_changed: bool,
    },
    /// Deletion requested; the finalizer still holds the object
    Deleted(Arc<K>),
}

impl<K: Resource> ResourceEvent<K> {
    /// Classify `object` given the generation its status was derived from
    pub fn classify(object: Arc<K>, observed_generation: Option<i64>) -> Self {
        if is_deleting(&*object) {
            Self::Deleted(object)
        } else if observed_generation.is_none() {
            Self::Created(object)
        } else {
            let spec_changed = generation_changed(object.meta().generation, observed_generation);
            Self::Updated { object, spec_changed }
        }
    }

    /// The object the event is about
    pub fn object(&self) -> &K {
        match self {
            Self::Created(object) | Self::Deleted(object) | Self::Updated { object, .. } => object,
        }
    }

    /// Whether the spec changed since the last successful reconcile
    pub fn spec_changed(&self) -> bool {
        matches!(self, Self::Updated { spec_changed: true, .. })
    }
}

/// Classify an IPPool reconcile
pub fn pool_event(pool: Arc<IPPool>) -> ResourceEvent<IPPool> {
    let observed = pool.status.as_ref().and_then(|s| s.observed_generation);
    ResourceEvent::classify(pool, observed)
}

/// Classify an IPClaim reconcile
pub fn claim_event(claim: Arc<IPClaim>) -> ResourceEvent<IPClaim> {
    let observed = claim.status.as_ref().and_then(|s| s.observed_generation);
    ResourceEvent::classify(claim, observed)
}

/// Claims that target `pool_name` without holding an address in it.
///
/// They failed on the pool (missing, not ready, exhausted) and get another
/// attempt whenever the pool changes.
pub fn waiting_claims<'a>(claims: impl IntoIterator<Item = &'a IPClaim>, pool_name: &str) -> Vec<ObjectRef<IPClaim>> {
    claims
        .into_iter()
        .filter(|claim| claim.spec.pool_name == pool_name)
        .filter(|claim| claim.status.as_ref().map(|s| s.phase) != Some(Phase::Active))
        .map(ObjectRef::from_obj)
        .collect()
}
