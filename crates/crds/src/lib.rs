//! IPAM CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the IPAM controller:
//! - `IPPool`: a cluster-scoped, reservable IPv4 address range and its allocation state
//! - `IPClaim`: a namespaced claim for one address from an `IPPool`

pub mod phase;
pub mod ip_pool;
pub mod ip_claim;

pub use phase::*;
pub use ip_pool::*;
pub use ip_claim::*;

/// API group shared by all IPAM CRDs
pub const API_GROUP: &str = "ipam.microscaler.io";

/// Finalizer token owned by the IPAM controller.
///
/// Set on both `IPPool` and `IPClaim` objects. An object carrying it stays
/// retrievable after deletion is requested until the controller has released
/// its addresses and removed the token.
pub const FINALIZER: &str = "ipam.microscaler.io/finalizer";
