//! Test utilities for unit testing reconcilers
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use crate::reconcile_helpers::ClaimKey;
use crate::reconciler::Reconciler;
use crds::*;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use pool_store::MockResourceStore;

/// Helper to create test IPPool CRD
pub fn create_test_ip_pool(name: &str, addresses: &[&str]) -> IPPool {
    IPPool {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: IPPoolSpec {
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        },
        status: None,
    }
}

/// Helper to create test IPClaim CRD
pub fn create_test_ip_claim(namespace: &str, name: &str, pool_name: &str, wanted_address: Option<&str>) -> IPClaim {
    IPClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: IPClaimSpec {
            pool_name: pool_name.to_string(),
            wanted_address: wanted_address.map(|s| s.to_string()),
            update_namespace: false,
        },
        status: None,
    }
}

/// Helper to create a reconciler backed by (a clone of) the mock store
pub fn create_test_reconciler(store: &MockResourceStore) -> Reconciler {
    Reconciler::new(Box::new(store.clone()))
}

/// Insert `pool` and reconcile it once (Active if its spec parses)
pub async fn seed_pool(store: &MockResourceStore, reconciler: &Reconciler, pool: IPPool) -> IPPool {
    let name = pool.metadata.name.clone().unwrap();
    store.insert_pool(pool);
    reconciler.reconcile_pool_key(&name, true).await.unwrap();
    store.pool(&name).unwrap()
}

/// Insert a claim and reconcile it once
pub async fn seed_claim(store: &MockResourceStore, reconciler: &Reconciler, claim: IPClaim) -> IPClaim {
    let key = ClaimKey::of(&claim);
    store.insert_claim(claim);
    reconciler.reconcile_claim_key(&key, false).await.unwrap();
    store.claim(&key.namespace, &key.name).unwrap()
}

/// The allocated list of a stored pool
pub fn allocated(store: &MockResourceStore, pool: &str) -> Vec<String> {
    store
        .pool(pool)
        .and_then(|p| p.status)
        .map(|s| s.allocated_ips)
        .unwrap_or_default()
}

/// The stored status of a claim
pub fn claim_status(store: &MockResourceStore, namespace: &str, name: &str) -> IPClaimStatus {
    store
        .claim(namespace, name)
        .and_then(|c| c.status)
        .unwrap_or_default()
}
