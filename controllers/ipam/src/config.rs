//! Controller configuration
//!
//! Read once at startup from environment variables.

use crate::error::ControllerError;
use std::env;
use std::time::Duration;

/// Resync periods below this are raised to it
pub const MIN_RESYNC_SECONDS: u64 = 30;

const DEFAULT_WORKERS: u64 = 2;
const DEFAULT_BACKOFF_BASE_MILLIS: u64 = 5;
const DEFAULT_BACKOFF_MAX_SECONDS: u64 = 1000;

/// Runtime configuration for the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Namespace to watch IPClaims in (`None` = all namespaces)
    pub namespace: Option<String>,
    /// Concurrent reconciles per resource kind
    pub workers: u16,
    /// Interval between full re-enqueues of every known key
    pub resync_period: Duration,
    /// Delay before the first retry of a failed key
    pub backoff_base: Duration,
    /// Upper bound on the retry delay
    pub backoff_max: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// * `WATCH_NAMESPACE` - claims namespace (default: all namespaces)
    /// * `RECONCILE_WORKERS` - concurrent reconciles per resource kind (default 2, at least 1)
    /// * `RESYNC_SECONDS` - resync period (default 30, raised to 30 if lower)
    /// * `BACKOFF_BASE_MILLIS` - first retry delay (default 5)
    /// * `BACKOFF_MAX_SECONDS` - retry delay cap (default 1000)
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let namespace = lookup("WATCH_NAMESPACE")
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty());

        let workers = parse_u64(&lookup, "RECONCILE_WORKERS", DEFAULT_WORKERS)?;
        if workers == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_WORKERS must be at least 1".to_string(),
            ));
        }
        let workers = u16::try_from(workers).map_err(|_| {
            ControllerError::InvalidConfig(format!("RECONCILE_WORKERS {} is too large", workers))
        })?;

        let resync_seconds = parse_u64(&lookup, "RESYNC_SECONDS", MIN_RESYNC_SECONDS)?.max(MIN_RESYNC_SECONDS);

        let backoff_base =
            Duration::from_millis(parse_u64(&lookup, "BACKOFF_BASE_MILLIS", DEFAULT_BACKOFF_BASE_MILLIS)?);
        let backoff_max = Duration::from_secs(parse_u64(&lookup, "BACKOFF_MAX_SECONDS", DEFAULT_BACKOFF_MAX_SECONDS)?);
        if backoff_base.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "BACKOFF_BASE_MILLIS must be at least 1".to_string(),
            ));
        }
        if backoff_max < backoff_base {
            return Err(ControllerError::InvalidConfig(format!(
                "BACKOFF_MAX_SECONDS ({:?}) is below BACKOFF_BASE_MILLIS ({:?})",
                backoff_max, backoff_base
            )));
        }

        Ok(Self {
            namespace,
            workers,
            resync_period: Duration::from_secs(resync_seconds),
            backoff_base,
            backoff_max,
        })
    }
}

fn parse_u64<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ControllerError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| {
            ControllerError::InvalidConfig(format!("{} must be a non-negative integer, got {:?}", key, value))
        }),
    }
}
