//! Main controller implementation.
//!
//! The `Controller` spawns one watcher per resource kind and waits for both.
//! Each watcher stops on Ctrl-C or SIGTERM after its in-flight reconciles
//! finish.

use crate::config::Config;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use crds::{IPClaim, IPPool};
use kube::{Api, Client};
use pool_store::KubeStore;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::info;

/// Main controller for IPPool and IPClaim resources.
pub struct Controller {
    ip_pool_watcher: JoinHandle<Result<(), ControllerError>>,
    ip_claim_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its watchers.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing IPAM Controller");

        let kube_client = Client::try_default().await?;

        // Pools are cluster-scoped; claims may be restricted to one namespace
        let ip_pool_api: Api<IPPool> = Api::all(kube_client.clone());
        let ip_claim_api: Api<IPClaim> = match config.namespace.as_deref() {
            Some(ns) => Api::namespaced(kube_client.clone(), ns),
            None => Api::all(kube_client.clone()),
        };

        let reconciler = Arc::new(Reconciler::new(Box::new(KubeStore::new(kube_client))));
        let watcher = Arc::new(Watcher::new(reconciler, config, ip_pool_api, ip_claim_api));

        let ip_pool_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_ip_pools().await })
        };
        let ip_claim_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_ip_claims().await })
        };

        Ok(Self {
            ip_pool_watcher,
            ip_claim_watcher,
        })
    }

    /// Runs until both watchers have shut down.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("IPAM Controller running");

        let (pools, claims) = tokio::join!(self.ip_pool_watcher, self.ip_claim_watcher);
        watcher_exited("IPPool", pools)?;
        watcher_exited("IPClaim", claims)?;

        info!("IPAM Controller stopped");
        Ok(())
    }
}

fn watcher_exited(
    resource_name: &str,
    result: Result<Result<(), ControllerError>, JoinError>,
) -> Result<(), ControllerError> {
    match result {
        Ok(result) => result.map_err(|e| ControllerError::Watch(format!("{} watcher error: {}", resource_name, e))),
        Err(e) => Err(ControllerError::Watch(format!("{} watcher panicked: {}", resource_name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watcher_exit_results() {
        assert!(watcher_exited("IPPool", Ok(Ok(()))).is_ok());

        let err = watcher_exited("IPClaim", Ok(Err(ControllerError::Watch("stream ended".to_string())))).unwrap_err();
        assert!(err.to_string().contains("IPClaim watcher error"));
        assert!(err.to_string().contains("stream ended"));
    }

    #[tokio::test]
    async fn test_watcher_panic_is_an_error() {
        let handle: JoinHandle<Result<(), ControllerError>> = tokio::spawn(async { panic!("boom") });

        let err = watcher_exited("IPPool", handle.await).unwrap_err();
        assert!(err.to_string().contains("IPPool watcher panicked"));
    }
}
