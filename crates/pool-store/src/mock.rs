//! Mock ResourceStore for unit testing
//!
//! This module provides an in-memory implementation of [`ResourceStore`] with
//! the same versioning rules as the API server: every successful write bumps
//! `resourceVersion`, a stale write is rejected with a conflict, spec changes
//! bump `generation`, and releasing the last finalizer of a deleting object
//! removes it. Tests can also inject conflicts, transport failures, and
//! concurrent writers.

use crate::error::StoreError;
use crate::store_trait::{ResourceStore, is_released};
use chrono::{SecondsFormat, Utc};
use crds::{IPClaim, IPClaimSpec, IPPool, IPPoolSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{Resource, ResourceExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type PoolWrite = Box<dyn FnOnce(&mut IPPool) + Send>;

#[derive(Default)]
struct MockState {
    pools: HashMap<String, IPPool>,
    claims: HashMap<(String, String), IPClaim>,
    version: u64,
    pool_conflicts: u32,
    claim_conflicts: u32,
    transport_failures: u32,
    concurrent_pool_writes: HashMap<String, Vec<PoolWrite>>,
    pool_updates: usize,
    claim_updates: usize,
}

impl MockState {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn take_transport_failure(&mut self) -> Result<(), StoreError> {
        if self.transport_failures > 0 {
            self.transport_failures -= 1;
            return Err(StoreError::Transport("injected transport failure".to_string()));
        }
        Ok(())
    }
}

/// Mock ResourceStore for testing
///
/// Clones share the same state, so a test can keep a handle for setup and
/// inspection while the reconciler owns another.
#[derive(Clone, Default)]
pub struct MockResourceStore {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockResourceStore").finish_non_exhaustive()
    }
}

fn now() -> Time {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    serde_json::from_value(serde_json::Value::String(timestamp)).expect("RFC 3339 timestamp")
}

fn claim_key(claim: &IPClaim) -> (String, String) {
    (claim.namespace().unwrap_or_default(), claim.name_any())
}

/// Apply the finalizers and status of `incoming` onto `stored`.
///
/// Like `KubeStore`, an update never writes the spec, so the stored spec and
/// generation survive whatever the caller sent.
fn commit<K>(stored: &K, incoming: &K, version: String, keep_spec: impl Fn(&mut K, &K)) -> K
where
    K: Resource + Clone,
{
    let mut next = incoming.clone();
    keep_spec(&mut next, stored);
    let meta = next.meta_mut();
    meta.resource_version = Some(version);
    meta.generation = stored.meta().generation;
    meta.deletion_timestamp = stored.meta().deletion_timestamp.clone();
    meta.creation_timestamp = stored.meta().creation_timestamp.clone();
    meta.uid = stored.meta().uid.clone();
    next
}

fn seed<K: Resource>(obj: &mut K, version: String) {
    let meta = obj.meta_mut();
    meta.resource_version = Some(version);
    meta.generation = Some(meta.generation.unwrap_or(1));
    if meta.uid.is_none() {
        meta.uid = meta.name.clone().map(|name| format!("uid-{}", name));
    }
}

impl MockResourceStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a pool (for test setup). Returns the stored object.
    pub fn insert_pool(&self, mut pool: IPPool) -> IPPool {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        seed(&mut pool, version);
        state.pools.insert(pool.name_any(), pool.clone());
        pool
    }

    /// Add or replace a claim (for test setup). Returns the stored object.
    pub fn insert_claim(&self, mut claim: IPClaim) -> IPClaim {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        seed(&mut claim, version);
        state.claims.insert(claim_key(&claim), claim.clone());
        claim
    }

    /// Current stored pool, if it exists
    pub fn pool(&self, name: &str) -> Option<IPPool> {
        self.state.lock().unwrap().pools.get(name).cloned()
    }

    /// Current stored claim, if it exists
    pub fn claim(&self, namespace: &str, name: &str) -> Option<IPClaim> {
        self.state
            .lock()
            .unwrap()
            .claims
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Request deletion of a pool the way the API server does: set the
    /// deletion timestamp, or remove it outright when it has no finalizers.
    pub fn delete_pool(&self, name: &str) -> Option<IPPool> {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let pool = state.pools.get_mut(name)?;
        pool.metadata.deletion_timestamp.get_or_insert_with(now);
        pool.metadata.resource_version = Some(version);
        let pool = pool.clone();
        if is_released(&pool.metadata) {
            state.pools.remove(name);
        }
        Some(pool)
    }

    /// Request deletion of a claim. See [`MockResourceStore::delete_pool`].
    pub fn delete_claim(&self, namespace: &str, name: &str) -> Option<IPClaim> {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let key = (namespace.to_string(), name.to_string());
        let claim = state.claims.get_mut(&key)?;
        claim.metadata.deletion_timestamp.get_or_insert_with(now);
        claim.metadata.resource_version = Some(version);
        let claim = claim.clone();
        if is_released(&claim.metadata) {
            state.claims.remove(&key);
        }
        Some(claim)
    }

    /// Edit a pool's spec as a user would, bumping generation
    pub fn edit_pool_spec(&self, name: &str, edit: impl FnOnce(&mut IPPoolSpec)) -> Option<IPPool> {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let pool = state.pools.get_mut(name)?;
        edit(&mut pool.spec);
        pool.metadata.generation = Some(pool.metadata.generation.unwrap_or(1) + 1);
        pool.metadata.resource_version = Some(version);
        Some(pool.clone())
    }

    /// Edit a claim's spec as a user would, bumping generation
    pub fn edit_claim_spec(
        &self,
        namespace: &str,
        name: &str,
        edit: impl FnOnce(&mut IPClaimSpec),
    ) -> Option<IPClaim> {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let claim = state
            .claims
            .get_mut(&(namespace.to_string(), name.to_string()))?;
        edit(&mut claim.spec);
        claim.metadata.generation = Some(claim.metadata.generation.unwrap_or(1) + 1);
        claim.metadata.resource_version = Some(version);
        Some(claim.clone())
    }

    /// Fail the next `count` pool updates with a conflict
    pub fn inject_pool_conflicts(&self, count: u32) {
        self.state.lock().unwrap().pool_conflicts = count;
    }

    /// Fail the next `count` claim updates with a conflict
    pub fn inject_claim_conflicts(&self, count: u32) {
        self.state.lock().unwrap().claim_conflicts = count;
    }

    /// Fail the next `count` reads with a transport error
    pub fn inject_transport_errors(&self, count: u32) {
        self.state.lock().unwrap().transport_failures = count;
    }

    /// Apply `write` to the stored pool right before the next update of it
    /// lands, as if another writer got there first. The pending update then
    /// fails with a conflict.
    pub fn inject_pool_write(&self, name: &str, write: impl FnOnce(&mut IPPool) + Send + 'static) {
        self.state
            .lock()
            .unwrap()
            .concurrent_pool_writes
            .entry(name.to_string())
            .or_default()
            .push(Box::new(write));
    }

    /// Number of successful pool updates
    pub fn pool_update_count(&self) -> usize {
        self.state.lock().unwrap().pool_updates
    }

    /// Number of successful claim updates
    pub fn claim_update_count(&self) -> usize {
        self.state.lock().unwrap().claim_updates
    }
}

#[async_trait::async_trait]
impl ResourceStore for MockResourceStore {
    async fn get_pool(&self, name: &str) -> Result<IPPool, StoreError> {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.take_transport_failure().and_then(|()| {
                state.pools.get(name).cloned().ok_or_else(|| StoreError::NotFound {
                    kind: "IPPool",
                    name: name.to_string(),
                })
            })
        };
        // Let concurrent reconciles interleave between read and write
        tokio::task::yield_now().await;
        result
    }

    async fn update_pool(&self, pool: &IPPool) -> Result<IPPool, StoreError> {
        tokio::task::yield_now().await;

        let name = pool.name_any();
        let mut state = self.state.lock().unwrap();

        for write in state.concurrent_pool_writes.remove(&name).unwrap_or_default() {
            let version = state.next_version();
            if let Some(stored) = state.pools.get_mut(&name) {
                write(stored);
                stored.metadata.resource_version = Some(version);
            }
        }

        let conflict = StoreError::Conflict { kind: "IPPool", name: name.clone() };
        if state.pool_conflicts > 0 {
            state.pool_conflicts -= 1;
            return Err(conflict);
        }

        let stored = state.pools.get(&name).cloned().ok_or_else(|| StoreError::NotFound {
            kind: "IPPool",
            name: name.clone(),
        })?;
        if stored.metadata.resource_version != pool.metadata.resource_version {
            return Err(conflict);
        }

        let version = state.next_version();
        let next = commit(&stored, pool, version, |next: &mut IPPool, stored: &IPPool| {
            next.spec = stored.spec.clone();
        });
        if is_released(&next.metadata) {
            state.pools.remove(&name);
        } else {
            state.pools.insert(name, next.clone());
        }
        state.pool_updates += 1;
        Ok(next)
    }

    async fn get_claim(&self, namespace: &str, name: &str) -> Result<IPClaim, StoreError> {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.take_transport_failure().and_then(|()| {
                state
                    .claims
                    .get(&(namespace.to_string(), name.to_string()))
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound {
                        kind: "IPClaim",
                        name: format!("{}/{}", namespace, name),
                    })
            })
        };
        tokio::task::yield_now().await;
        result
    }

    async fn update_claim(&self, claim: &IPClaim) -> Result<IPClaim, StoreError> {
        tokio::task::yield_now().await;

        let key = claim_key(claim);
        let label = format!("{}/{}", key.0, key.1);
        let mut state = self.state.lock().unwrap();

        if state.claim_conflicts > 0 {
            state.claim_conflicts -= 1;
            return Err(StoreError::Conflict { kind: "IPClaim", name: label });
        }

        let stored = state.claims.get(&key).cloned().ok_or_else(|| StoreError::NotFound {
            kind: "IPClaim",
            name: label.clone(),
        })?;
        if stored.metadata.resource_version != claim.metadata.resource_version {
            return Err(StoreError::Conflict { kind: "IPClaim", name: label });
        }

        let version = state.next_version();
        let next = commit(&stored, claim, version, |next: &mut IPClaim, stored: &IPClaim| {
            next.spec = stored.spec.clone();
        });
        if is_released(&next.metadata) {
            state.claims.remove(&key);
        } else {
            state.claims.insert(key, next.clone());
        }
        state.claim_updates += 1;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::FINALIZER;
    use kube::api::ObjectMeta;

    fn pool(name: &str) -> IPPool {
        IPPool {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: IPPoolSpec {
                addresses: vec!["10.0.0.0/30".to_string()],
                ..Default::default()
            },
            status: None,
        }
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_rejects_stale_writes() {
        let store = MockResourceStore::new();
        let seeded = store.insert_pool(pool("default"));

        let updated = store.update_pool(&seeded).await.unwrap();
        assert_ne!(updated.metadata.resource_version, seeded.metadata.resource_version);
        assert_eq!(updated.metadata.generation, Some(1));

        let err = store.update_pool(&seeded).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_does_not_write_spec() {
        let store = MockResourceStore::new();
        let mut seeded = store.insert_pool(pool("default"));
        seeded.spec.avoid_buggy_ips = true;
        seeded.status = Some(Default::default());

        let updated = store.update_pool(&seeded).await.unwrap();
        assert!(!updated.spec.avoid_buggy_ips);
        assert_eq!(updated.metadata.generation, Some(1));
        assert!(updated.status.is_some());
        assert!(!store.pool("default").unwrap().spec.avoid_buggy_ips);
    }

    #[tokio::test]
    async fn test_user_spec_edit_bumps_generation() {
        let store = MockResourceStore::new();
        store.insert_pool(pool("default"));

        let edited = store.edit_pool_spec("default", |spec| spec.avoid_buggy_ips = true).unwrap();
        assert_eq!(edited.metadata.generation, Some(2));
        assert!(store.pool("default").unwrap().spec.avoid_buggy_ips);
    }

    #[tokio::test]
    async fn test_releasing_last_finalizer_removes_deleting_object() {
        let store = MockResourceStore::new();
        let mut seeded = pool("default");
        seeded.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
        store.insert_pool(seeded);

        let mut deleting = store.delete_pool("default").unwrap();
        assert!(deleting.metadata.deletion_timestamp.is_some());
        assert!(store.pool("default").is_some());

        deleting.metadata.finalizers = Some(vec![]);
        store.update_pool(&deleting).await.unwrap();
        assert!(store.pool("default").is_none());
        assert!(store.get_pool("default").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_without_finalizers_is_immediate() {
        let store = MockResourceStore::new();
        store.insert_pool(pool("default"));
        store.delete_pool("default");
        assert!(store.pool("default").is_none());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MockResourceStore::new();
        let seeded = store.insert_pool(pool("default"));

        store.inject_transport_errors(1);
        assert!(matches!(store.get_pool("default").await, Err(StoreError::Transport(_))));
        assert!(store.get_pool("default").await.is_ok());

        store.inject_pool_conflicts(1);
        assert!(store.update_pool(&seeded).await.unwrap_err().is_conflict());
        assert!(store.update_pool(&seeded).await.is_ok());
        assert_eq!(store.pool_update_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_write_lands_first() {
        let store = MockResourceStore::new();
        let seeded = store.insert_pool(pool("default"));

        store.inject_pool_write("default", |p| p.spec.filter_ips.push("10.0.0.3".to_string()));
        assert!(store.update_pool(&seeded).await.unwrap_err().is_conflict());
        assert_eq!(store.pool("default").unwrap().spec.filter_ips, vec!["10.0.0.3"]);
    }
}
