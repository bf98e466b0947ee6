//! Textual address matching
//!
//! Used for access lists: does address `a` fall in the same network as `b`
//! under an optional mask? Anything that fails to parse simply does not
//! match; no diagnostic is raised.

use std::net::{Ipv4Addr, Ipv6Addr};

use ipnetwork::{Ipv4Network, Ipv6Network};

/// Compare two textual addresses under an optional mask.
///
/// For IPv4 the mask may be dotted (`255.255.0.0`) or a prefix length
/// (`16`); for IPv6 only a prefix length is accepted. Without a mask the
/// addresses must be equal. Mixed families never match, and neither does
/// anything with an unparseable address or mask, identical strings included.
pub fn addr_match(a: &str, b: &str, mask: Option<&str>) -> bool {
    if let (Ok(a4), Ok(b4)) = (a.parse::<Ipv4Addr>(), b.parse::<Ipv4Addr>()) {
        return match_ipv4(a4, b4, mask);
    }

    match (a.parse::<Ipv6Addr>(), b.parse::<Ipv6Addr>()) {
        (Ok(a6), Ok(b6)) => match_ipv6(a6, b6, mask),
        _ => false,
    }
}

fn match_ipv4(a: Ipv4Addr, b: Ipv4Addr, mask: Option<&str>) -> bool {
    let Some(mask) = mask else {
        return a == b;
    };
    if mask.contains('.') {
        return match mask.parse::<Ipv4Addr>() {
            Ok(mask) => {
                let mask = u32::from(mask);
                u32::from(a) & mask == u32::from(b) & mask
            }
            Err(_) => false,
        };
    }
    match prefix(mask).map(|bits| Ipv4Network::new(a, bits)) {
        Some(Ok(network)) => network.contains(b),
        _ => false,
    }
}

fn match_ipv6(a: Ipv6Addr, b: Ipv6Addr, mask: Option<&str>) -> bool {
    let Some(mask) = mask else {
        return a == b;
    };
    match prefix(mask).map(|bits| Ipv6Network::new(a, bits)) {
        Some(Ok(network)) => network.contains(b),
        _ => false,
    }
}

/// A prefix length made of decimal digits only.
fn prefix(mask: &str) -> Option<u8> {
    if mask.is_empty() || !mask.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    mask.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact() {
        assert!(addr_match("192.168.0.1", "192.168.0.1", None));
        assert!(!addr_match("192.168.0.1", "192.168.0.2", None));
        assert!(addr_match("::1", "0:0::1", None));
        assert!(!addr_match("not an address", "not an address", None));
        assert!(!addr_match("", "", None));
    }

    #[test]
    fn test_ipv4_prefix() {
        assert!(addr_match("10.1.2.3", "10.1.200.4", Some("16")));
        assert!(!addr_match("10.1.2.3", "10.2.2.3", Some("16")));
        assert!(addr_match("10.1.2.3", "192.168.0.1", Some("0")));
        assert!(addr_match("10.1.2.3", "10.1.2.3", Some("32")));
        assert!(!addr_match("10.1.2.3", "10.1.2.4", Some("32")));
    }

    #[test]
    fn test_ipv4_dotted_mask() {
        assert!(addr_match("10.1.2.3", "10.1.99.99", Some("255.255.0.0")));
        assert!(!addr_match("10.1.2.3", "10.9.2.3", Some("255.255.0.0")));
        assert!(addr_match("10.1.2.3", "10.1.2.200", Some("255.255.255.0")));
    }

    #[test]
    fn test_ipv6_prefix() {
        assert!(addr_match("2001:db8::1", "2001:db8::ffff", Some("64")));
        assert!(!addr_match("2001:db8::1", "2001:db9::1", Some("32")));
        assert!(addr_match("2001:db8:ff00::", "2001:db8:ff7f::", Some("41")));
        assert!(!addr_match("2001:db8:ff00::", "2001:db8:ff80::", Some("41")));
    }

    #[test]
    fn test_parse_failures_do_not_match() {
        assert!(!addr_match("10.1.2.3", "10.1.2.4", Some("33")));
        assert!(!addr_match("10.1.2.3", "10.1.2.4", Some("2x")));
        assert!(!addr_match("10.1.2.3", "10.1.2.4", Some("255.255.0")));
        assert!(!addr_match("10.1.2.3", "10.1.2.4", Some("")));
        assert!(!addr_match("2001:db8::1", "2001:db8::2", Some("129")));
        assert!(!addr_match("2001:db8::1", "2001:db8::2", Some("ffff::")));
        assert!(!addr_match("10.1.2.3", "bogus", Some("8")));
    }

    #[test]
    fn test_bad_mask_rejects_identical_addresses() {
        assert!(!addr_match("10.1.2.3", "10.1.2.3", Some("bogus")));
        assert!(!addr_match("10.1.2.3", "10.1.2.3", Some("33")));
        assert!(!addr_match("10.1.2.3", "10.1.2.3", Some("")));
        assert!(!addr_match("10.1.2.3", "10.1.2.3", Some("255.255.0")));
        assert!(!addr_match("2001:db8::1", "2001:db8::1", Some("255.255.0.0")));
        assert!(!addr_match("2001:db8::1", "2001:db8::1", Some("129")));
        assert!(addr_match("2001:db8::1", "2001:db8::1", Some("128")));
    }

    #[test]
    fn test_mixed_families() {
        assert!(!addr_match("127.0.0.1", "::1", None));
        assert!(!addr_match("127.0.0.1", "::ffff:127.0.0.1", Some("0")));
    }
}
