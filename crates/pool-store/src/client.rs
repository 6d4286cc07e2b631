//! Kubernetes-backed resource store

use crate::error::StoreError;
use crate::store_trait::{ResourceStore, is_released};
use crds::{IPClaim, IPPool};
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;
use tracing::debug;

/// Resource store over the Kubernetes API
///
/// Writes are JSON merge patches carrying `metadata.resourceVersion`, which
/// the API server treats as a precondition (409 on mismatch).
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    pools: Api<IPPool>,
}

impl KubeStore {
    /// Create a store using `client`
    pub fn new(client: Client) -> Self {
        Self {
            pools: Api::all(client.clone()),
            client,
        }
    }

    fn claims(&self, namespace: &str) -> Api<IPClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn display_name<K: Resource>(obj: &K) -> String {
    match obj.meta().namespace.as_deref() {
        Some(namespace) => format!("{}/{}", namespace, obj.name_any()),
        None => obj.name_any(),
    }
}

/// Patch metadata then status, chaining the resourceVersion between the two.
async fn write<K, S>(api: &Api<K>, kind: &'static str, obj: &K, status: Option<&S>) -> Result<K, StoreError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
    S: Serialize,
{
    let label = display_name(obj);
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or_else(|| StoreError::InvalidObject(format!("{} without a name", kind)))?;
    let resource_version = obj
        .meta()
        .resource_version
        .clone()
        .ok_or_else(|| StoreError::InvalidObject(format!("{} {} without a resourceVersion", kind, label)))?;

    let params = PatchParams::default();
    let metadata_patch = json!({
        "metadata": {
            "resourceVersion": resource_version,
            "finalizers": obj.meta().finalizers.clone().unwrap_or_default(),
        }
    });
    let updated = api
        .patch(&name, &params, &Patch::Merge(&metadata_patch))
        .await
        .map_err(|e| StoreError::from_kube(kind, &label, e))?;

    if is_released(updated.meta()) {
        debug!("{} {} released its last finalizer", kind, label);
        return Ok(updated);
    }

    let Some(status) = status else {
        return Ok(updated);
    };

    let status_patch = json!({
        "metadata": { "resourceVersion": updated.meta().resource_version },
        "status": serde_json::to_value(status)?,
    });
    api.patch_status(&name, &params, &Patch::Merge(&status_patch))
        .await
        .map_err(|e| StoreError::from_kube(kind, &label, e))
}

#[async_trait::async_trait]
impl ResourceStore for KubeStore {
    async fn get_pool(&self, name: &str) -> Result<IPPool, StoreError> {
        self.pools
            .get(name)
            .await
            .map_err(|e| StoreError::from_kube("IPPool", name, e))
    }

    async fn update_pool(&self, pool: &IPPool) -> Result<IPPool, StoreError> {
        write(&self.pools, "IPPool", pool, pool.status.as_ref()).await
    }

    async fn get_claim(&self, namespace: &str, name: &str) -> Result<IPClaim, StoreError> {
        self.claims(namespace)
            .get(name)
            .await
            .map_err(|e| StoreError::from_kube("IPClaim", &format!("{}/{}", namespace, name), e))
    }

    async fn update_claim(&self, claim: &IPClaim) -> Result<IPClaim, StoreError> {
        let namespace = claim
            .namespace()
            .ok_or_else(|| StoreError::InvalidObject(format!("IPClaim {} without a namespace", claim.name_any())))?;
        write(&self.claims(&namespace), "IPClaim", claim, claim.status.as_ref()).await
    }
}
