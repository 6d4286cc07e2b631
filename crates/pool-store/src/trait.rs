//! ResourceStore trait for mocking
//!
//! This trait abstracts the resource store so reconcilers can run against
//! the Kubernetes API in production and against an in-memory store in tests.

use crate::error::StoreError;
use crds::{IPClaim, IPPool};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Versioned get/update access to pools and claims
///
/// Every `update_*` is conditional on the `resourceVersion` carried by the
/// object passed in. A stale version fails with [`StoreError::Conflict`] and
/// leaves the stored object untouched.
///
/// Updates persist both metadata (finalizers) and status. When the object is
/// being deleted and the update leaves it without finalizers, the store
/// removes it and returns the final state.
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch a cluster-scoped pool by name
    async fn get_pool(&self, name: &str) -> Result<IPPool, StoreError>;

    /// Write a pool's finalizers and status
    async fn update_pool(&self, pool: &IPPool) -> Result<IPPool, StoreError>;

    /// Fetch a claim by namespace and name
    async fn get_claim(&self, namespace: &str, name: &str) -> Result<IPClaim, StoreError>;

    /// Write a claim's finalizers and status
    async fn update_claim(&self, claim: &IPClaim) -> Result<IPClaim, StoreError>;
}

/// True once a deleting object has no finalizers left
pub fn is_released(meta: &ObjectMeta) -> bool {
    meta.deletion_timestamp.is_some() && meta.finalizers.as_ref().is_none_or(|f| f.is_empty())
}
