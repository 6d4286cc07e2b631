//! Reconciliation logic for IPAM CRDs.
//!
//! - `ip_pool`: derives pool capacity and phase, gates pool deletion
//! - `ip_claim`: allocates and releases addresses

pub mod ip_claim;
pub mod ip_pool;

use crate::error::ControllerError;
use crate::reconcile_helpers::ClaimKey;
use pool_store::ResourceStore;
use tracing::debug;

/// Reconciles IPPools and IPClaims against a resource store.
pub struct Reconciler {
    pub(crate) store: Box<dyn ResourceStore>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Create a reconciler over `store`
    pub fn new(store: Box<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Fetch the current pool and reconcile it. A pool that no longer exists
    /// needs nothing.
    pub async fn reconcile_pool_key(&self, name: &str, spec_changed: bool) -> Result<(), ControllerError> {
        match self.store.get_pool(name).await {
            Ok(pool) => self.reconcile_ip_pool(&pool, spec_changed).await,
            Err(e) if e.is_not_found() => {
                debug!("IPPool {} no longer exists", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the current claim and reconcile it. A claim that no longer
    /// exists needs nothing.
    pub async fn reconcile_claim_key(&self, key: &ClaimKey, spec_changed: bool) -> Result<(), ControllerError> {
        match self.store.get_claim(&key.namespace, &key.name).await {
            Ok(claim) => self.reconcile_ip_claim(&claim, spec_changed).await,
            Err(e) if e.is_not_found() => {
                debug!("IPClaim {} no longer exists", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
