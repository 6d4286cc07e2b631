//! IPAM Controller
//!
//! Allocates IPv4 addresses from cluster-scoped `IPPool`s to namespaced
//! `IPClaim`s. The pool status is the single source of truth for which
//! addresses are taken; every write is guarded by the object's
//! resourceVersion, so concurrent workers never hand out an address twice.

mod backoff;
mod config;
mod controller;
mod error;
mod events;
mod reconcile_helpers;
mod reconciler;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::Config;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's rustls client needs a process-wide crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting IPAM Controller");

    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Workers per kind: {}", config.workers);
    info!("  Resync period: {:?}", config.resync_period);
    info!("  Retry backoff: {:?} .. {:?}", config.backoff_base, config.backoff_max);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
