//! Allowlist matching for the egress guard (spec §4.E, §3 "Private
//! endpoint" entity). When the allowlist is non-empty every resolved
//! address of a hop must match some entry's host/CIDR AND port.

use ipnetwork::IpNetwork;
use std::net::IpAddr;

const DEFAULT_PORTS: &[u16] = &[80, 443];

#[derive(Debug, Clone)]
pub enum HostMatcher {
    Exact(String),
    Cidr(IpNetwork),
}

#[derive(Debug, Clone)]
pub struct PrivateEndpoint {
    pub label: String,
    pub matcher: HostMatcher,
    pub ports: Vec<u16>,
}

impl PrivateEndpoint {
    pub fn new_host(label: impl Into<String>, host: impl Into<String>, ports: Vec<u16>) -> Self {
        Self {
            label: label.into(),
            matcher: HostMatcher::Exact(host.into()),
            ports: if ports.is_empty() { DEFAULT_PORTS.to_vec() } else { ports },
        }
    }

    pub fn new_cidr(label: impl Into<String>, cidr: IpNetwork, ports: Vec<u16>) -> Self {
        Self {
            label: label.into(),
            matcher: HostMatcher::Cidr(cidr),
            ports: if ports.is_empty() { DEFAULT_PORTS.to_vec() } else { ports },
        }
    }

    fn matches_host(&self, host: &str, addr: Option<IpAddr>) -> bool {
        match &self.matcher {
            HostMatcher::Exact(h) => h.eq_ignore_ascii_case(host),
            HostMatcher::Cidr(net) => addr.map(|a| net.contains(a)).unwrap_or(false),
        }
    }

    fn matches_port(&self, port: u16) -> bool {
        self.ports.contains(&port)
    }
}

#[derive(Debug, Default, Clone)]
pub struct Allowlist {
    entries: Vec<PrivateEndpoint>,
}

impl Allowlist {
    pub fn new(entries: Vec<PrivateEndpoint>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A single resolved address passes if the allowlist is empty, or if
    /// some entry matches both the host/address and the port.
    pub fn permits(&self, host: &str, addr: IpAddr, port: u16) -> bool {
        matches!(self.classify(host, addr, port), AllowDecision::Permitted)
    }

    /// Distinguishes "no entry covers this host/address at all" from
    /// "an entry covers the host but not this port", so the caller can
    /// report `private-ip-blocked` vs `port-denied` per spec §4.E.
    pub fn classify(&self, host: &str, addr: IpAddr, port: u16) -> AllowDecision {
        if self.entries.is_empty() {
            return AllowDecision::Permitted;
        }
        let host_matches: Vec<&PrivateEndpoint> =
            self.entries.iter().filter(|e| e.matches_host(host, Some(addr))).collect();
        if host_matches.is_empty() {
            return AllowDecision::PrivateIpBlocked;
        }
        if host_matches.iter().any(|e| e.matches_port(port)) {
            AllowDecision::Permitted
        } else {
            AllowDecision::PortDenied
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowDecision {
    Permitted,
    PrivateIpBlocked,
    PortDenied,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allowlist_permits_everything() {
        let list = Allowlist::new(vec![]);
        assert!(list.permits("example.com", "93.184.216.34".parse().unwrap(), 443));
    }

    #[test]
    fn host_and_port_must_both_match() {
        let list = Allowlist::new(vec![PrivateEndpoint::new_host("internal", "192.168.1.100", vec![8123])]);
        let addr: IpAddr = "192.168.1.100".parse().unwrap();
        assert!(list.permits("192.168.1.100", addr, 8123));
        assert!(!list.permits("192.168.1.100", addr, 22));
    }

    #[test]
    fn non_matching_address_is_denied() {
        let list = Allowlist::new(vec![PrivateEndpoint::new_host("internal", "192.168.1.100", vec![8123])]);
        let other: IpAddr = "192.168.1.101".parse().unwrap();
        assert!(!list.permits("192.168.1.101", other, 8123));
    }
}
