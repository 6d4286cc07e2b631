//! IPClaim reconciler
//!
//! The pool's `allocatedIps` is the only record of who holds an address. A
//! claim is granted an address by writing the pool first (guarded by its
//! resourceVersion) and only then recording the address on the claim.

use super::Reconciler;
use crate::error::ControllerError;
use crate::reconcile_helpers::{
    AllocationFailure, ClaimKey, add_finalizer, claim_status_needs_update, generation_changed, has_finalizer,
    is_deleting, remove_finalizer,
};
use chrono::Utc;
use crds::{AddressOwner, IPClaim, IPPool, Phase};
use kube::ResourceExt;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

/// Address picked for a claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The pool already records this address as the claim's
    Existing(String),
    /// A free address that must be added to the pool
    New(String),
}

/// Pick the address `claim` should hold in `pool`. Pure: no store access.
///
/// The pool is assumed Active. An address the pool already attributes to the
/// claim is kept, even if `wantedAddress` was edited since; otherwise the
/// wanted address is validated, or the first free candidate is taken.
pub fn choose_address(pool: &IPPool, claim: &IPClaim) -> Result<Selection, AllocationFailure> {
    let pool_name = pool.name_any();
    let key = ClaimKey::of(claim).to_string();
    let status = pool.status.clone().unwrap_or_default();

    // Already granted: recorded on the claim, or only in the owner index
    // when the claim's own write was lost
    let recorded = claim
        .status
        .as_ref()
        .filter(|s| s.pool_name.as_deref() == Some(pool_name.as_str()))
        .and_then(|s| s.address.as_deref())
        .filter(|address| status.is_allocated(address))
        .filter(|address| status.owner_of(address).is_none_or(|owner| owner == key));
    if let Some(existing) = recorded.or_else(|| status.owned_by(&key).next()) {
        return Ok(Selection::Existing(existing.to_string()));
    }

    let wanted = claim
        .spec
        .wanted_address
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty());
    let wanted_ip = wanted.map(|w| w.parse::<Ipv4Addr>());

    if status.allocatable <= 0 {
        return Err(AllocationFailure::PoolExhausted(pool_name));
    }

    let candidates = ipaddr::expand(
        &pool.spec.addresses,
        pool.spec.avoid_buggy_ips,
        pool.spec.avoid_gateway_ips,
    )
    .map_err(|e| AllocationFailure::PoolNotReady {
        pool: pool_name.clone(),
        detail: e.to_string(),
    })?;
    let unallocated = ipaddr::filter(&candidates, status.allocated_ips.iter().map(String::as_str));
    let free = ipaddr::filter(&unallocated, pool.spec.filter_ips.iter().map(String::as_str));

    match (wanted, wanted_ip) {
        (Some(wanted), Some(Ok(ip))) => {
            let address = ip.to_string();
            if status.is_allocated(&address) {
                Err(AllocationFailure::DuplicateAllocation { pool: pool_name, address })
            } else if !free.contains(&ip) {
                Err(AllocationFailure::AddressOutOfRange {
                    pool: pool_name,
                    address: wanted.to_string(),
                })
            } else {
                Ok(Selection::New(address))
            }
        }
        (Some(wanted), _) => Err(AllocationFailure::AddressOutOfRange {
            pool: pool_name,
            address: wanted.to_string(),
        }),
        (None, _) => free
            .first()
            .map(|ip| Selection::New(ip.to_string()))
            .ok_or(AllocationFailure::PoolExhausted(pool_name)),
    }
}

/// Whether an Active claim's `poolName` now differs from the pool it holds
/// an address in
fn claim_moved(claim: &IPClaim) -> bool {
    claim
        .status
        .as_ref()
        .and_then(|status| status.pool_name.as_deref())
        .is_some_and(|from_pool| from_pool != claim.spec.pool_name)
}

/// Copy of `claim` marked Failed with `failure` as the reason
pub fn fail_claim(claim: &IPClaim, failure: &AllocationFailure) -> IPClaim {
    let mut next = claim.clone();
    let generation = next.metadata.generation;
    let status = next.status.get_or_insert_with(Default::default);
    status.phase = Phase::Failed;
    status.reason = Some(failure.to_string());
    status.observed_generation = generation;
    next
}

/// Copy of `claim` marked Active holding `address` from `pool_name`
pub fn mark_claim_active(claim: &IPClaim, pool_name: &str, address: &str) -> IPClaim {
    let mut next = claim.clone();
    let generation = next.metadata.generation;
    let status = next.status.get_or_insert_with(Default::default);
    status.phase = Phase::Active;
    status.reason = None;
    status.address = Some(address.to_string());
    status.pool_name = Some(pool_name.to_string());
    status.observed_generation = generation;
    next
}

impl Reconciler {
    /// Reconcile an IPClaim: allocate, move, or release its address.
    pub async fn reconcile_ip_claim(&self, claim: &IPClaim, spec_changed: bool) -> Result<(), ControllerError> {
        let key = ClaimKey::of(claim);
        info!("Reconciling IPClaim {}", key);

        if is_deleting(claim) {
            if !has_finalizer(claim) {
                return Ok(());
            }
            let mut released = self.deallocate(claim).await?;
            remove_finalizer(&mut released);
            self.store.update_claim(&released).await?;
            info!("Released finalizer on IPClaim {}", key);
            return Ok(());
        }

        // Finalizer first, so a claim deleted mid-allocation is still drained
        let mut current = claim.clone();
        if add_finalizer(&mut current) {
            current = self.store.update_claim(&current).await?;
            debug!("Added finalizer to IPClaim {}", key);
        }

        let status = current.status.clone().unwrap_or_default();
        let spec_changed = spec_changed || generation_changed(current.metadata.generation, status.observed_generation);

        let next = if status.phase == Phase::Active && spec_changed && claim_moved(&current) {
            info!(
                "IPClaim {} moved to pool {}, releasing {}",
                key,
                current.spec.pool_name,
                status.address.as_deref().unwrap_or("nothing")
            );
            let released = self.deallocate(&current).await?;
            self.allocate(&released).await?
        } else if status.phase != Phase::Active || spec_changed {
            self.allocate(&current).await?
        } else {
            debug!("IPClaim {} is up to date", key);
            return Ok(());
        };

        self.persist_claim(&current, next).await
    }

    async fn persist_claim(&self, current: &IPClaim, mut next: IPClaim) -> Result<(), ControllerError> {
        let Some(desired) = next.status.as_mut() else {
            return Ok(());
        };
        if !claim_status_needs_update(current.status.as_ref(), desired) {
            debug!("IPClaim {} status unchanged", ClaimKey::of(current));
            return Ok(());
        }
        desired.last_update_time = Some(Utc::now());
        self.store.update_claim(&next).await?;
        Ok(())
    }

    /// Allocate an address for `claim` from `spec.poolName`.
    ///
    /// Returns the claim with its new status (Active or Failed) for the caller
    /// to persist. A pool write that loses a version race is returned as an
    /// error and leaves the claim untouched.
    pub async fn allocate(&self, claim: &IPClaim) -> Result<IPClaim, ControllerError> {
        let key = ClaimKey::of(claim);
        let pool_name = claim.spec.pool_name.as_str();

        let pool = match self.store.get_pool(pool_name).await {
            Ok(pool) => pool,
            Err(e) if e.is_not_found() => {
                let failure = AllocationFailure::PoolNotFound(pool_name.to_string());
                warn!("IPClaim {}: {}", key, failure);
                return Ok(fail_claim(claim, &failure));
            }
            Err(e) => return Err(e.into()),
        };

        let phase = pool.status.as_ref().map(|s| s.phase).unwrap_or_default();
        if is_deleting(&pool) || phase == Phase::Terminating {
            let failure = AllocationFailure::PoolTerminated(pool_name.to_string());
            warn!("IPClaim {}: {}", key, failure);
            return Ok(fail_claim(claim, &failure));
        }
        if phase != Phase::Active {
            let failure = AllocationFailure::not_ready(pool_name, phase);
            warn!("IPClaim {}: {}", key, failure);
            return Ok(fail_claim(claim, &failure));
        }

        match choose_address(&pool, claim) {
            Err(failure) => {
                warn!("IPClaim {}: {}", key, failure);
                Ok(fail_claim(claim, &failure))
            }
            Ok(Selection::Existing(address)) => {
                debug!("IPClaim {} already holds {} in IPPool {}", key, address, pool_name);
                Ok(mark_claim_active(claim, pool_name, &address))
            }
            Ok(Selection::New(address)) => {
                let mut next = pool.clone();
                let status = next.status.get_or_insert_with(Default::default);
                // A claim holds one address per pool; drop any it was granted before
                let stale: HashSet<String> = status.owned_by(&key.to_string()).map(str::to_string).collect();
                status.allocated_ips.retain(|ip| !stale.contains(ip));
                status.allocated_ips.push(address.clone());
                status.owners.retain(|owner| owner.address != address && !stale.contains(&owner.address));
                status.owners.push(AddressOwner {
                    address: address.clone(),
                    claim: key.to_string(),
                });
                status.recompute_allocatable();
                status.last_update_time = Some(Utc::now());

                if let Err(e) = self.store.update_pool(&next).await {
                    if e.is_conflict() {
                        debug!("IPPool {} changed while allocating for IPClaim {}", pool_name, key);
                    }
                    return Err(e.into());
                }
                info!("Allocated {} from IPPool {} to IPClaim {}", address, pool_name, key);
                Ok(mark_claim_active(claim, pool_name, &address))
            }
        }
    }

    /// Release every address `claim` holds in the pool it was allocated from.
    ///
    /// Returns the claim with no address and phase Terminating, without
    /// persisting it. Releasing twice is a no-op.
    pub async fn deallocate(&self, claim: &IPClaim) -> Result<IPClaim, ControllerError> {
        let key = ClaimKey::of(claim).to_string();
        let claim_status = claim.status.clone().unwrap_or_default();
        let pool_name = claim_status
            .pool_name
            .clone()
            .unwrap_or_else(|| claim.spec.pool_name.clone());

        match self.store.get_pool(&pool_name).await {
            Ok(pool) => {
                let mut next = pool.clone();
                if let Some(status) = next.status.as_mut() {
                    let mut release: HashSet<String> = status.owned_by(&key).map(str::to_string).collect();
                    if let Some(address) = claim_status.address.as_deref() {
                        if status.owner_of(address).is_none_or(|owner| owner == key) {
                            release.insert(address.to_string());
                        }
                    }

                    let allocated_before = status.allocated_ips.len();
                    let owners_before = status.owners.len();
                    status.allocated_ips.retain(|ip| !release.contains(ip));
                    status.owners.retain(|owner| owner.claim != key && !release.contains(&owner.address));

                    if status.allocated_ips.len() != allocated_before || status.owners.len() != owners_before {
                        status.recompute_allocatable();
                        status.last_update_time = Some(Utc::now());
                        self.store.update_pool(&next).await?;
                        info!("Released {:?} from IPPool {} for IPClaim {}", release, pool_name, key);
                    }
                }
            }
            Err(e) if e.is_not_found() => {
                debug!("IPPool {} is gone, nothing to release for IPClaim {}", pool_name, key);
            }
            Err(e) => return Err(e.into()),
        }

        let mut released = claim.clone();
        let status = released.status.get_or_insert_with(Default::default);
        status.phase = Phase::Terminating;
        status.reason = None;
        status.address = None;
        status.pool_name = None;
        Ok(released)
    }
}
