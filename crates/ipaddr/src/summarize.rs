//! Range to CIDR summarization

use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

/// Summarize the inclusive range `start..=end` into the minimal list of
/// aligned CIDR blocks, in ascending order.
///
/// At every step the largest block that starts at the current address and
/// does not run past `end` is taken. An empty list is returned when
/// `start > end`.
pub fn summarize(start: Ipv4Addr, end: Ipv4Addr) -> Vec<Ipv4Network> {
    let end = u64::from(u32::from(end));
    let mut current = u64::from(u32::from(start));
    let mut blocks = Vec::new();

    while current <= end {
        // Alignment of the current address bounds the block size
        let mut host_bits = current.trailing_zeros().min(32);
        while host_bits > 0 && current + (1u64 << host_bits) - 1 > end {
            host_bits -= 1;
        }

        // current <= end <= u32::MAX, so the conversion cannot truncate
        let network = Ipv4Addr::from(current as u32);
        let prefix = (32 - host_bits) as u8;
        match Ipv4Network::new(network, prefix) {
            Ok(block) => blocks.push(block),
            // prefix is always within 0..=32
            Err(_) => break,
        }

        current += 1u64 << host_bits;
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(start: &str, end: &str) -> Vec<String> {
        summarize(start.parse().unwrap(), end.parse().unwrap())
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_summarize_aligned_block() {
        assert_eq!(blocks("10.0.0.0", "10.0.0.255"), vec!["10.0.0.0/24"]);
    }

    #[test]
    fn test_summarize_unaligned_range() {
        // 0-5 = 0/30 (0-3) + 4/31 (4-5)
        assert_eq!(
            blocks("172.22.132.0", "172.22.132.5"),
            vec!["172.22.132.0/30", "172.22.132.4/31"]
        );

        assert_eq!(
            blocks("192.168.1.3", "192.168.1.10"),
            vec!["192.168.1.3/32", "192.168.1.4/30", "192.168.1.8/31", "192.168.1.10/32"]
        );
    }

    #[test]
    fn test_summarize_single_address() {
        assert_eq!(blocks("10.1.2.3", "10.1.2.3"), vec!["10.1.2.3/32"]);
    }

    #[test]
    fn test_summarize_crosses_octet_boundary() {
        assert_eq!(
            blocks("10.0.0.254", "10.0.1.1"),
            vec!["10.0.0.254/31", "10.0.1.0/31"]
        );
    }

    #[test]
    fn test_summarize_full_address_space() {
        assert_eq!(blocks("0.0.0.0", "255.255.255.255"), vec!["0.0.0.0/0"]);
        assert_eq!(blocks("255.255.255.255", "255.255.255.255"), vec!["255.255.255.255/32"]);
    }

    #[test]
    fn test_summarize_reversed_is_empty() {
        assert!(blocks("10.0.0.5", "10.0.0.1").is_empty());
    }
}
