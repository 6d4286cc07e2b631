//! IPPool CRD
//!
//! Defines a cluster-scoped IPv4 address pool. The spec describes the
//! addresses; the status is the single source of truth for which of them are
//! currently allocated.

use crate::phase::Phase;
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "ipam.microscaler.io",
    version = "v1",
    kind = "IPPool",
    shortname = "ippool",
    status = "IPPoolStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"PHASE", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"CAPACITY", "type":"integer", "jsonPath":".status.capacity"}"#,
    printcolumn = r#"{"name":"ALLOCATABLE", "type":"integer", "jsonPath":".status.allocatable"}"#,
    printcolumn = r#"{"name":"AGE", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IPPoolSpec {
    /// Address specifications, expanded in order.
    /// Each entry is a CIDR (`10.0.0.0/24`) or an inclusive range (`10.0.0.10-10.0.0.20`).
    pub addresses: Vec<String>,

    /// Skip addresses ending in `.0` or `.255`
    #[serde(default)]
    pub avoid_buggy_ips: bool,

    /// Skip addresses ending in `.1` or `.254`
    #[serde(default)]
    pub avoid_gateway_ips: bool,

    /// Addresses that must never be handed out
    #[serde(default)]
    pub filter_ips: Vec<String>,

    /// Consumed by the namespace assignment collaborator, not by this controller
    #[serde(default)]
    pub auto_assign_to_namespace: bool,

    /// Consumed by the namespace assignment collaborator, not by this controller
    #[serde(default)]
    pub ignore_namespaces: Vec<String>,

    /// Consumed by the namespace assignment collaborator, not by this controller
    #[serde(default)]
    pub ignore_namespace_annotation: bool,
}

/// Records which claim holds an allocated address.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddressOwner {
    /// Allocated address
    pub address: String,

    /// `namespace/name` of the owning IPClaim
    pub claim: String,
}

// Optional fields are serialized as `null` rather than skipped so a merge
// patch of the whole status clears them.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IPPoolStatus {
    /// Lifecycle phase
    #[serde(default)]
    pub phase: Phase,

    /// Failure reason, only set while `phase` is Failed
    #[serde(default)]
    pub reason: Option<String>,

    /// Last time the controller changed this status
    #[serde(default)]
    pub last_update_time: Option<DateTime<Utc>>,

    /// Addresses currently held by claims, in allocation order
    #[serde(default)]
    pub allocated_ips: Vec<String>,

    /// Number of addresses the spec expands to
    #[serde(default)]
    pub capacity: i64,

    /// `capacity` minus the number of allocated addresses
    #[serde(default)]
    pub allocatable: i64,

    /// Owner index over `allocated_ips`
    #[serde(default)]
    pub owners: Vec<AddressOwner>,

    /// `metadata.generation` of the spec the status was derived from
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

impl IPPoolStatus {
    /// Whether `address` is in the allocated set
    pub fn is_allocated(&self, address: &str) -> bool {
        self.allocated_ips.iter().any(|ip| ip == address)
    }

    /// The claim key recorded as owning `address`, if any
    pub fn owner_of(&self, address: &str) -> Option<&str> {
        self.owners
            .iter()
            .find(|owner| owner.address == address)
            .map(|owner| owner.claim.as_str())
    }

    /// Addresses both allocated and attributed to `claim`
    pub fn owned_by<'a>(&'a self, claim: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.owners
            .iter()
            .filter(move |owner| owner.claim == claim && self.is_allocated(&owner.address))
            .map(|owner| owner.address.as_str())
    }

    /// Re-derive `allocatable` from `capacity` and the allocated set
    pub fn recompute_allocatable(&mut self) {
        self.allocatable = self.capacity - self.allocated_ips.len() as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_camel_case_with_nulls() {
        let status = IPPoolStatus {
            phase: Phase::Active,
            allocated_ips: vec!["10.0.0.2".to_string()],
            capacity: 4,
            allocatable: 3,
            ..Default::default()
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["phase"], "Active");
        assert_eq!(value["allocatedIps"][0], "10.0.0.2");
        assert_eq!(value["allocatable"], 3);
        assert!(value["reason"].is_null());
        assert!(value.as_object().unwrap().contains_key("reason"));
    }

    #[test]
    fn test_spec_defaults() {
        let spec: IPPoolSpec = serde_json::from_value(serde_json::json!({
            "addresses": ["10.0.0.0/30"]
        }))
        .unwrap();

        assert!(!spec.avoid_buggy_ips);
        assert!(!spec.avoid_gateway_ips);
        assert!(spec.filter_ips.is_empty());
    }

    #[test]
    fn test_owner_index() {
        let mut status = IPPoolStatus {
            allocated_ips: vec!["10.0.0.2".to_string()],
            owners: vec![
                AddressOwner { address: "10.0.0.2".to_string(), claim: "ns/a".to_string() },
                AddressOwner { address: "10.0.0.3".to_string(), claim: "ns/a".to_string() },
            ],
            capacity: 4,
            ..Default::default()
        };

        assert_eq!(status.owner_of("10.0.0.2"), Some("ns/a"));
        assert_eq!(status.owner_of("10.0.0.9"), None);
        // 10.0.0.3 is not allocated any more
        assert_eq!(status.owned_by("ns/a").collect::<Vec<_>>(), vec!["10.0.0.2"]);

        status.recompute_allocatable();
        assert_eq!(status.allocatable, 3);
    }
}
