//! Lifecycle phase shared by IPPool and IPClaim

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of an IPAM resource
///
/// Serializes as PascalCase ("Active", "Failed", ...).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum Phase {
    /// Not reconciled yet
    #[default]
    Pending,

    /// Pool parsed successfully / claim holds an address
    Active,

    /// Reconciliation failed; see `reason`
    Failed,

    /// Deletion requested, waiting for addresses to be released
    Terminating,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Self::Pending => "Pending",
            Self::Active => "Active",
            Self::Failed => "Failed",
            Self::Terminating => "Terminating",
        };
        f.write_str(phase)
    }
}
