//! Kubernetes resource watchers.
//!
//! Each resource kind runs its own `kube_runtime::Controller`. The runtime
//! owns the watch, the per-object queue, deduplication and the guarantee that
//! one object is never reconciled twice at once. This module supplies the
//! reconcile and error-policy functions and the retry bookkeeping behind them.

use crate::backoff::{ExponentialBackoff, RetryTracker};
use crate::config::Config;
use crate::error::ControllerError;
use crate::events::{ResourceEvent, claim_event, pool_event, waiting_claims};
use crate::reconcile_helpers::ClaimKey;
use crate::reconciler::Reconciler;
use crds::{IPClaim, IPPool};
use futures::StreamExt;
use kube::{Api, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{Controller, watcher};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type ReconcileFuture = Pin<Box<dyn Future<Output = Result<(), ControllerError>> + Send>>;

/// State shared by the reconciles of one resource kind
struct Context {
    reconciler: Arc<Reconciler>,
    retries: RetryTracker<String>,
    resync_period: Duration,
}

/// `name` for cluster-scoped objects, `namespace/name` otherwise
fn object_key<K: Resource>(obj: &K) -> String {
    match obj.meta().namespace.as_deref() {
        Some(ns) => format!("{}/{}", ns, obj.name_any()),
        None => obj.name_any(),
    }
}

/// Drive `controller` until shutdown.
///
/// A successful reconcile clears the object's retry count and schedules the
/// periodic resync. A failed one is requeued after the object's next backoff
/// delay; resourceVersion conflicts are expected under concurrency and only
/// logged at debug.
async fn watch_resource<K, F>(
    controller: Controller<K>,
    ctx: Arc<Context>,
    workers: u16,
    resource_name: &'static str,
    reconcile_fn: F,
) -> Result<(), ControllerError>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Debug + Unpin,
    F: Fn(Arc<Reconciler>, Arc<K>) -> ReconcileFuture + Send + Sync + Clone + 'static,
{
    info!("Starting {} watcher", resource_name);

    let error_policy = move |obj: Arc<K>, error: &ControllerError, ctx: Arc<Context>| {
        let key = object_key(obj.as_ref());
        let delay = ctx.retries.record_failure(key.clone());
        if error.is_conflict() {
            debug!("{} {}: {}, retrying in {:?}", resource_name, key, error, delay);
        } else {
            warn!(
                "Reconciliation failed for {} {} (attempt {}): {}, retrying in {:?}",
                resource_name,
                key,
                ctx.retries.retries(&key),
                error,
                delay
            );
        }
        Action::requeue(delay)
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Context>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            let key = object_key(obj.as_ref());
            reconcile_fn(ctx.reconciler.clone(), obj).await?;
            ctx.retries.forget(&key);
            Ok::<_, ControllerError>(Action::requeue(ctx.resync_period))
        }
    };

    controller
        .with_config(ControllerConfig::default().concurrency(workers))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled {} {}", resource_name, obj),
                // Reconcile failures were already reported by the error policy
                Err(e) => debug!("{} controller: {}", resource_name, e),
            }
        })
        .await;

    info!("{} watcher stopped", resource_name);
    Ok(())
}

/// Watches IPPools and IPClaims and reconciles them.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    config: Config,
    ip_pool_api: Api<IPPool>,
    ip_claim_api: Api<IPClaim>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        config: Config,
        ip_pool_api: Api<IPPool>,
        ip_claim_api: Api<IPClaim>,
    ) -> Self {
        Self {
            reconciler,
            config,
            ip_pool_api,
            ip_claim_api,
        }
    }

    fn context(&self) -> Arc<Context> {
        Arc::new(Context {
            reconciler: self.reconciler.clone(),
            retries: RetryTracker::new(ExponentialBackoff::new(self.config.backoff_base, self.config.backoff_max)),
            resync_period: self.config.resync_period,
        })
    }

    /// Watches IPPool resources (cluster-wide) until shutdown.
    pub async fn watch_ip_pools(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.ip_pool_api.clone(), watcher::Config::default());

        watch_resource(
            controller,
            self.context(),
            self.config.workers,
            "IPPool",
            |reconciler: Arc<Reconciler>, pool: Arc<IPPool>| -> ReconcileFuture {
                Box::pin(async move {
                    let name = pool.name_any();
                    let event = pool_event(pool);
                    match &event {
                        ResourceEvent::Created(_) => debug!("IPPool {} seen for the first time", name),
                        ResourceEvent::Deleted(_) => debug!("IPPool {} deletion requested", name),
                        ResourceEvent::Updated { spec_changed: true, .. } => debug!("IPPool {} spec changed", name),
                        ResourceEvent::Updated { .. } => {}
                    }
                    reconciler.reconcile_pool_key(&name, event.spec_changed()).await
                })
            },
        )
        .await
    }

    /// Watches IPClaim resources until shutdown.
    ///
    /// Claims that have no address yet are also reconciled whenever the pool
    /// they name changes, so a claim that failed on a missing or exhausted
    /// pool recovers as soon as the pool does.
    pub async fn watch_ip_claims(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.ip_claim_api.clone(), watcher::Config::default());
        let claims = controller.store();
        let controller = controller.watches(self.ip_pool_api.clone(), watcher::Config::default(), move |pool: IPPool| {
            let state = claims.state();
            waiting_claims(state.iter().map(|claim| &**claim), &pool.name_any())
        });

        watch_resource(
            controller,
            self.context(),
            self.config.workers,
            "IPClaim",
            |reconciler: Arc<Reconciler>, claim: Arc<IPClaim>| -> ReconcileFuture {
                Box::pin(async move {
                    let key = ClaimKey::of(claim.as_ref());
                    let event = claim_event(claim);
                    match &event {
                        ResourceEvent::Created(_) => debug!("IPClaim {} seen for the first time", key),
                        ResourceEvent::Deleted(_) => debug!("IPClaim {} deletion requested", key),
                        ResourceEvent::Updated { spec_changed: true, .. } => debug!("IPClaim {} spec changed", key),
                        ResourceEvent::Updated { .. } => {}
                    }
                    reconciler.reconcile_claim_key(&key, event.spec_changed()).await
                })
            },
        )
        .await
    }
}
