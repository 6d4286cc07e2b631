//! IPAM Resource Store
//!
//! The storage boundary the IPAM reconcilers are written against: read an
//! `IPPool` or `IPClaim`, and write it back with an optimistic-concurrency
//! check on its `resourceVersion`.
//!
//! # Example
//!
//! ```no_run
//! use pool_store::{KubeStore, ResourceStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = KubeStore::new(client);
//!
//! let mut pool = store.get_pool("default").await?;
//! if let Some(status) = pool.status.as_mut() {
//!     status.allocated_ips.push("10.0.0.2".to_string());
//!     status.recompute_allocatable();
//! }
//!
//! // Fails with StoreError::Conflict if someone else wrote the pool first
//! let pool = store.update_pool(&pool).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **KubeStore**: Kubernetes API implementation using `resourceVersion` preconditions
//! - **Finalizer protocol**: releasing the last finalizer of a deleting object removes it
//! - **MockResourceStore** (`test-util`): versioned in-memory store with conflict injection

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeStore;
pub use error::StoreError;
pub use store_trait::{ResourceStore, is_released};
#[cfg(feature = "test-util")]
pub use mock::MockResourceStore;
