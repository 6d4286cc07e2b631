//! IPPool reconciler

use super::Reconciler;
use crate::error::ControllerError;
use crate::reconcile_helpers::{
    add_finalizer, generation_changed, has_finalizer, is_deleting, pool_status_needs_update, remove_finalizer,
};
use chrono::{DateTime, Utc};
use crds::{IPPool, IPPoolStatus, Phase};
use kube::ResourceExt;
use tracing::{debug, info, warn};

/// What a pool reconcile has to persist
#[derive(Debug, Clone, PartialEq)]
pub enum PoolAction {
    /// The stored pool is already up to date
    Unchanged,
    /// Write the pool's new status and/or finalizers
    Update(Box<IPPool>),
    /// Drop the finalizer of a deleting pool with nothing allocated
    Release(Box<IPPool>),
}

/// Decide what reconciling `pool` requires. Pure: no store access.
///
/// The address specification is re-expanded when the pool is not Active, when
/// the caller saw a spec change, or when `status.observedGeneration` lags
/// `metadata.generation`.
pub fn plan_pool(pool: &IPPool, spec_changed: bool, now: DateTime<Utc>) -> PoolAction {
    let current = pool.status.clone().unwrap_or_default();

    if is_deleting(pool) {
        if !has_finalizer(pool) {
            return PoolAction::Unchanged;
        }
        let mut next = pool.clone();
        if current.allocated_ips.is_empty() {
            remove_finalizer(&mut next);
            return PoolAction::Release(Box::new(next));
        }
        if current.phase == Phase::Terminating {
            return PoolAction::Unchanged;
        }
        next.status = Some(IPPoolStatus {
            phase: Phase::Terminating,
            last_update_time: Some(now),
            ..current
        });
        return PoolAction::Update(Box::new(next));
    }

    let mut desired = current.clone();
    let stale = generation_changed(pool.metadata.generation, current.observed_generation);
    if current.phase != Phase::Active || spec_changed || stale {
        match ipaddr::expand(
            &pool.spec.addresses,
            pool.spec.avoid_buggy_ips,
            pool.spec.avoid_gateway_ips,
        ) {
            Ok(candidates) => {
                desired.phase = Phase::Active;
                desired.reason = None;
                desired.capacity = i64::try_from(candidates.len()).unwrap_or(i64::MAX);
            }
            Err(e) => {
                desired.phase = Phase::Failed;
                desired.reason = Some(e.to_string());
            }
        }
        desired.recompute_allocatable();
        desired.observed_generation = pool.metadata.generation;
    }

    let mut next = pool.clone();
    let finalizer_added = desired.phase == Phase::Active && add_finalizer(&mut next);
    let status_changed = pool_status_needs_update(pool.status.as_ref(), &desired);
    if !status_changed && !finalizer_added {
        return PoolAction::Unchanged;
    }
    if status_changed {
        desired.last_update_time = Some(now);
        next.status = Some(desired);
    }
    PoolAction::Update(Box::new(next))
}

impl Reconciler {
    /// Reconcile an IPPool: derive capacity, phase, and finalizer state, and
    /// gate deletion on the allocated set being empty.
    pub async fn reconcile_ip_pool(&self, pool: &IPPool, spec_changed: bool) -> Result<(), ControllerError> {
        let name = pool.name_any();
        info!("Reconciling IPPool {}", name);

        match plan_pool(pool, spec_changed, Utc::now()) {
            PoolAction::Unchanged => {
                debug!("IPPool {} is up to date", name);
            }
            PoolAction::Update(next) => {
                let updated = self.store.update_pool(&next).await?;
                match updated.status.as_ref() {
                    Some(status) if status.phase == Phase::Failed => warn!(
                        "IPPool {} failed: {}",
                        name,
                        status.reason.as_deref().unwrap_or("unknown reason")
                    ),
                    Some(status) if status.phase == Phase::Terminating => info!(
                        "IPPool {} is terminating, waiting for {} allocated addresses to be released",
                        name,
                        status.allocated_ips.len()
                    ),
                    Some(status) => info!(
                        "IPPool {} is {} (capacity {}, allocatable {})",
                        name, status.phase, status.capacity, status.allocatable
                    ),
                    None => {}
                }
            }
            PoolAction::Release(next) => {
                self.store.update_pool(&next).await?;
                info!("Released finalizer on IPPool {}", name);
            }
        }
        Ok(())
    }
}
