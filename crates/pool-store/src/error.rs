//! Resource store errors

use thiserror::Error;

/// Errors that can occur when reading or writing IPAM resources
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object does not exist (or was removed after its last finalizer was released)
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind
        kind: &'static str,
        /// `name` or `namespace/name`
        name: String,
    },

    /// The write was based on a stale `resourceVersion`
    #[error("conflict writing {kind} {name}: the object has been modified")]
    Conflict {
        /// Resource kind
        kind: &'static str,
        /// `name` or `namespace/name`
        name: String,
    },

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Transport failure talking to the store
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The object cannot be written (e.g., missing name or resourceVersion)
    #[error("Invalid object: {0}")]
    InvalidObject(String),
}

impl StoreError {
    /// Classify a kube client error for `kind`/`name`.
    ///
    /// 404 maps to [`StoreError::NotFound`], 409 to [`StoreError::Conflict`].
    pub fn from_kube(kind: &'static str, name: &str, error: kube::Error) -> Self {
        match &error {
            kube::Error::Api(response) if response.code == 404 => Self::NotFound {
                kind,
                name: name.to_string(),
            },
            kube::Error::Api(response) if response.code == 409 => Self::Conflict {
                kind,
                name: name.to_string(),
            },
            _ => Self::Kube(error),
        }
    }

    /// Whether the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the write lost an optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
