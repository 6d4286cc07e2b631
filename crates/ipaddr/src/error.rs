//! Address specification errors

use thiserror::Error;

/// Errors produced while parsing an address specification.
///
/// Every variant carries the offending specification verbatim so the message
/// can be surfaced as a pool's failure reason.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    /// Not a valid IPv4 `address/prefix` block
    #[error("invalid CIDR {0:?}")]
    InvalidCidr(String),

    /// One side of a `start-end` range is not an IPv4 address
    #[error("invalid IP range {spec:?}: invalid {endpoint} IP {value:?}")]
    InvalidRangeEndpoint {
        /// Full range specification
        spec: String,
        /// Which endpoint failed ("start" or "end")
        endpoint: &'static str,
        /// The text that failed to parse
        value: String,
    },

    /// Range whose start address is numerically greater than its end
    #[error("invalid IP range {0:?}: start is greater than end")]
    ReversedRange(String),

    /// The specifications together cover more addresses than a pool may hold
    #[error("address specification {spec:?} brings the pool to {count} addresses, above the limit of {limit}")]
    TooManyAddresses {
        /// Specification at which the running total passed the limit
        spec: String,
        /// Addresses covered up to and including `spec`
        count: u64,
        /// The limit, [`crate::MAX_CANDIDATES`]
        limit: u64,
    },
}

impl AddressError {
    /// The specification that failed to parse.
    pub fn spec(&self) -> &str {
        match self {
            Self::InvalidCidr(spec) | Self::ReversedRange(spec) => spec,
            Self::InvalidRangeEndpoint { spec, .. } | Self::TooManyAddresses { spec, .. } => spec,
        }
    }
}
