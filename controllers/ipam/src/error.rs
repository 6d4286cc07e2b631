//! Controller-specific error types.
//!
//! This module defines error types specific to the IPAM Controller that are
//! not covered by upstream library errors. Allocation outcomes such as an
//! exhausted pool are not errors here: they are recorded on the claim's status.

use kube::Error as KubeError;
use pool_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the IPAM Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Resource store error (conflicts, transport failures)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether the error is a lost optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }
}
