//! IP Address Specification Parser
//!
//! Expands the address specifications carried by an `IPPool` into the ordered
//! candidate set the controllers allocate from.
//!
//! # Example
//!
//! ```
//! use ipaddr::expand;
//!
//! let ips = expand(&["172.22.132.0/30"], true, true).unwrap();
//! let ips: Vec<String> = ips.iter().map(ToString::to_string).collect();
//! assert_eq!(ips, vec!["172.22.132.2", "172.22.132.3"]);
//! ```
//!
//! # Specification formats
//!
//! - **CIDR**: `10.0.0.0/24`. Host bits are masked off, so `10.0.0.7/24`
//!   expands to the same block as `10.0.0.0/24`.
//! - **Range**: `10.0.0.10-10.0.0.20`, inclusive on both ends. Ranges are
//!   summarized into the minimal set of aligned CIDR blocks before expansion.
//!
//! Only IPv4 is supported.

pub mod error;
pub mod parser;
pub mod summarize;

pub use error::AddressError;
pub use parser::{AddressSpec, MAX_CANDIDATES, expand, filter};
pub use summarize::summarize;
