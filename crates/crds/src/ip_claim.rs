//! IPClaim CRD
//!
//! Claims one address from an IPPool.

use crate::phase::Phase;
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "ipam.microscaler.io",
    version = "v1",
    kind = "IPClaim",
    namespaced,
    shortname = "ipclaim",
    status = "IPClaimStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"POOL", "type":"string", "jsonPath":".spec.poolName"}"#,
    printcolumn = r#"{"name":"ADDRESS", "type":"string", "jsonPath":".status.address"}"#,
    printcolumn = r#"{"name":"PHASE", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"AGE", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IPClaimSpec {
    /// Name of the IPPool to allocate from
    pub pool_name: String,

    /// Specific address to allocate (must be free and inside the pool)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wanted_address: Option<String>,

    /// Consumed by the namespace annotation collaborator, not by this controller
    #[serde(default)]
    pub update_namespace: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IPClaimStatus {
    /// Lifecycle phase
    #[serde(default)]
    pub phase: Phase,

    /// Failure reason, only set while `phase` is Failed
    #[serde(default)]
    pub reason: Option<String>,

    /// Allocated address
    #[serde(default)]
    pub address: Option<String>,

    /// Pool the address was allocated from
    #[serde(default)]
    pub pool_name: Option<String>,

    /// Last time the controller changed this status
    #[serde(default)]
    pub last_update_time: Option<DateTime<Utc>>,

    /// `metadata.generation` of the spec the status was derived from
    #[serde(default)]
    pub observed_generation: Option<i64>,
}
