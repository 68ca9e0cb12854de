//! IP classification for the egress guard's non-overridable block check
//! (spec §4.E). Uses library-grade CIDR math rather than string prefixes
//! so IPv4-mapped IPv6 forms are classified by their v4 payload.

use ipnetwork::{Ipv4Network, Ipv6Network};
use once_cell::sync::Lazy;
use std::net::{IpAddr, Ipv4Addr};

/// AWS/Azure/GCP/OCI cloud metadata endpoint.
pub const METADATA_IPV4: Ipv4Addr = Ipv4Addr::new(169, 254, 169, 254);
/// AWS ECS task metadata endpoint.
pub const ECS_METADATA_IPV4: Ipv4Addr = Ipv4Addr::new(169, 254, 170, 2);
/// Alibaba Cloud metadata endpoint.
pub const ALIBABA_METADATA_IPV4: Ipv4Addr = Ipv4Addr::new(100, 100, 100, 200);

static LINK_LOCAL_V4: Lazy<Ipv4Network> = Lazy::new(|| "169.254.0.0/16".parse().unwrap());
static LINK_LOCAL_V6: Lazy<Ipv6Network> = Lazy::new(|| "fe80::/10".parse().unwrap());

/// `metadata.google.internal` resolves publicly to 169.254.169.254, so a
/// plain metadata-IP check already covers it; this constant exists so
/// callers can also reject the hostname before DNS resolution happens.
pub const METADATA_HOSTNAMES: &[&str] = &["metadata.google.internal"];

fn as_v4(addr: IpAddr) -> Option<Ipv4Addr> {
    match addr {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

/// True if `addr` is one of the non-overridable blocked endpoints: a
/// cloud metadata IP, the 169.254.0.0/16 range, or fe80::/10 link-local.
/// These are never subject to allowlist override.
pub fn is_non_overridable_blocked(addr: IpAddr) -> bool {
    if let Some(v4) = as_v4(addr) {
        if v4 == METADATA_IPV4 || v4 == ECS_METADATA_IPV4 || v4 == ALIBABA_METADATA_IPV4 {
            return true;
        }
        if LINK_LOCAL_V4.contains(v4) {
            return true;
        }
    }
    if let IpAddr::V6(v6) = addr {
        if LINK_LOCAL_V6.contains(v6) {
            return true;
        }
    }
    false
}

pub fn hostname_is_metadata_alias(host: &str) -> bool {
    METADATA_HOSTNAMES.iter().any(|h| h.eq_ignore_ascii_case(host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn metadata_ip_blocked() {
        assert!(is_non_overridable_blocked(IpAddr::V4(METADATA_IPV4)));
        assert!(is_non_overridable_blocked(IpAddr::V4(ECS_METADATA_IPV4)));
        assert!(is_non_overridable_blocked(IpAddr::V4(ALIBABA_METADATA_IPV4)));
    }

    #[test]
    fn link_local_range_blocked() {
        assert!(is_non_overridable_blocked(IpAddr::V4(Ipv4Addr::new(169, 254, 1, 1))));
        assert!(is_non_overridable_blocked(IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1))));
    }

    #[test]
    fn ipv4_mapped_metadata_is_blocked() {
        let mapped = METADATA_IPV4.to_ipv6_mapped();
        assert!(is_non_overridable_blocked(IpAddr::V6(mapped)));
    }

    #[test]
    fn ordinary_public_ip_is_not_blocked() {
        assert!(!is_non_overridable_blocked(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))));
    }
}
