//! Address specification parsing and expansion

use crate::error::AddressError;
use crate::summarize::summarize;
use ipnetwork::Ipv4Network;
use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Final octets treated as network/broadcast addresses.
const BUGGY_OCTETS: [u8; 2] = [0, 255];

/// Final octets conventionally taken by gateways.
const GATEWAY_OCTETS: [u8; 2] = [1, 254];

/// Most addresses one list of specifications may cover (a /16), counted
/// before the avoid flags are applied.
pub const MAX_CANDIDATES: u64 = 1 << 16;

/// A single parsed address specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpec {
    /// A CIDR block, normalized to its network address
    Cidr(Ipv4Network),
    /// An inclusive `start-end` range
    Range {
        /// First address of the range
        start: Ipv4Addr,
        /// Last address of the range
        end: Ipv4Addr,
    },
}

impl AddressSpec {
    /// The CIDR blocks covering this specification, in ascending order.
    pub fn blocks(&self) -> Vec<Ipv4Network> {
        match self {
            Self::Cidr(network) => vec![*network],
            Self::Range { start, end } => summarize(*start, *end),
        }
    }

    /// Number of addresses covered, before any avoid flag is applied.
    pub fn size(&self) -> u64 {
        match self {
            Self::Cidr(network) => 1u64 << (32 - u32::from(network.prefix())),
            Self::Range { start, end } => u64::from(u32::from(*end)) - u64::from(u32::from(*start)) + 1,
        }
    }

    fn parse_cidr(spec: &str) -> Result<Self, AddressError> {
        let invalid = || AddressError::InvalidCidr(spec.to_string());

        let (address, prefix) = spec.split_once('/').ok_or_else(invalid)?;
        let address: Ipv4Addr = address.trim().parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.trim().parse().map_err(|_| invalid())?;

        let network = Ipv4Network::new(address, prefix).map_err(|_| invalid())?;
        let network = Ipv4Network::new(network.network(), prefix).map_err(|_| invalid())?;
        Ok(Self::Cidr(network))
    }

    fn parse_range(spec: &str) -> Result<Self, AddressError> {
        let (start, end) = spec
            .split_once('-')
            .ok_or_else(|| AddressError::InvalidCidr(spec.to_string()))?;

        let parse_endpoint = |value: &str, endpoint: &'static str| {
            value
                .trim()
                .parse::<Ipv4Addr>()
                .map_err(|_| AddressError::InvalidRangeEndpoint {
                    spec: spec.to_string(),
                    endpoint,
                    value: value.trim().to_string(),
                })
        };
        let start = parse_endpoint(start, "start")?;
        let end = parse_endpoint(end, "end")?;

        if start > end {
            return Err(AddressError::ReversedRange(spec.to_string()));
        }
        Ok(Self::Range { start, end })
    }
}

impl FromStr for AddressSpec {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        if spec.contains('-') {
            Self::parse_range(spec)
        } else {
            Self::parse_cidr(spec)
        }
    }
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cidr(network) => write!(f, "{}", network),
            Self::Range { start, end } => write!(f, "{}-{}", start, end),
        }
    }
}

fn is_buggy(ip: Ipv4Addr) -> bool {
    BUGGY_OCTETS.contains(&ip.octets()[3])
}

fn is_gateway(ip: Ipv4Addr) -> bool {
    GATEWAY_OCTETS.contains(&ip.octets()[3])
}

/// Expand address specifications into the ordered candidate list.
///
/// Specifications are expanded in order and concatenated. Each block is
/// enumerated in ascending numeric order. Addresses appearing in more than one
/// specification are kept every time they appear.
///
/// # Arguments
///
/// * `specs` - CIDR blocks or inclusive `start-end` ranges
/// * `avoid_buggy` - drop addresses ending in `.0` or `.255`
/// * `avoid_gateway` - drop addresses ending in `.1` or `.254`
///
/// # Errors
///
/// Returns the first [`AddressError`] encountered; nothing is expanded in
/// that case. Lists covering more than [`MAX_CANDIDATES`] addresses are
/// rejected with [`AddressError::TooManyAddresses`] before any address is
/// enumerated.
pub fn expand<S: AsRef<str>>(
    specs: &[S],
    avoid_buggy: bool,
    avoid_gateway: bool,
) -> Result<Vec<Ipv4Addr>, AddressError> {
    let parsed = specs
        .iter()
        .map(|spec| spec.as_ref().parse::<AddressSpec>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut count = 0u64;
    for (spec, parsed_spec) in specs.iter().zip(&parsed) {
        count += parsed_spec.size();
        if count > MAX_CANDIDATES {
            return Err(AddressError::TooManyAddresses {
                spec: spec.as_ref().trim().to_string(),
                count,
                limit: MAX_CANDIDATES,
            });
        }
    }

    let ips = parsed
        .iter()
        .flat_map(AddressSpec::blocks)
        .flat_map(|block| block.iter())
        .filter(|ip| !(avoid_buggy && is_buggy(*ip)))
        .filter(|ip| !(avoid_gateway && is_gateway(*ip)))
        .collect();
    Ok(ips)
}

/// Remove every address listed in `excludes` from `candidates`, keeping order.
///
/// Exclude entries that are not IPv4 addresses are ignored.
pub fn filter<'a, I>(candidates: &[Ipv4Addr], excludes: I) -> Vec<Ipv4Addr>
where
    I: IntoIterator<Item = &'a str>,
{
    let excluded: HashSet<Ipv4Addr> = excludes
        .into_iter()
        .filter_map(|ip| ip.trim().parse().ok())
        .collect();

    candidates
        .iter()
        .copied()
        .filter(|ip| !excluded.contains(ip))
        .collect()
}
