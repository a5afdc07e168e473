//! Own-address lookup for echo suppression
//!
//! In broadcast and multicast modes a device receives its own
//! transmissions. The player drops datagrams whose source is one of the
//! addresses in an [`AddressLookup`]; the recorder refreshes the set at the
//! start of every capture session.
//!
//! Loopback addresses are never part of the interface set: a sender and
//! receiver talking over 127.0.0.1 on one host are two peers, not an echo.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::net::IpAddr;

/// Set of addresses that belong to this device
pub trait AddressLookup: Send + Sync {
    /// Re-read the addresses from the system
    fn refresh(&self);

    /// Whether `addr` is one of ours
    fn contains(&self, addr: &IpAddr) -> bool;
}

/// Addresses of the local network interfaces
#[derive(Debug, Default)]
pub struct InterfaceAddresses {
    addrs: RwLock<HashSet<IpAddr>>,
}

impl InterfaceAddresses {
    /// Lookup populated from the current interfaces
    pub fn new() -> Self {
        let lookup = Self::default();
        lookup.refresh();
        lookup
    }

    /// Current addresses
    pub fn snapshot(&self) -> Vec<IpAddr> {
        let mut addrs: Vec<IpAddr> = self.addrs.read().iter().copied().collect();
        addrs.sort();
        addrs
    }
}

impl AddressLookup for InterfaceAddresses {
    fn refresh(&self) {
        match local_ip_address::list_afinet_netifas() {
            Ok(interfaces) => {
                let fresh: HashSet<IpAddr> = interfaces
                    .into_iter()
                    .map(|(_, ip)| ip)
                    .filter(|ip| !ip.is_loopback())
                    .collect();
                tracing::debug!("Local addresses: {:?}", fresh);
                *self.addrs.write() = fresh;
            }
            Err(e) => {
                // Keep the previous set rather than disabling suppression
                tracing::warn!("Failed to list local addresses: {}", e);
            }
        }
    }

    fn contains(&self, addr: &IpAddr) -> bool {
        self.addrs.read().contains(&normalize(addr))
    }
}

/// Fixed address set
#[derive(Debug, Default, Clone)]
pub struct StaticAddresses {
    addrs: HashSet<IpAddr>,
}

impl StaticAddresses {
    pub fn new(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            addrs: addrs.into_iter().collect(),
        }
    }

    /// Empty set; nothing is treated as an echo
    pub fn none() -> Self {
        Self::default()
    }
}

impl AddressLookup for StaticAddresses {
    fn refresh(&self) {}

    fn contains(&self, addr: &IpAddr) -> bool {
        self.addrs.contains(&normalize(addr))
    }
}

/// Map IPv4-mapped IPv6 sources back to IPv4
fn normalize(addr: &IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(*addr),
        IpAddr::V4(_) => *addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_static_lookup() {
        let lookup = StaticAddresses::new([IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7))]);
        assert!(lookup.contains(&"192.168.1.7".parse().unwrap()));
        assert!(!lookup.contains(&"192.168.1.8".parse().unwrap()));
        assert!(!StaticAddresses::none().contains(&"192.168.1.7".parse().unwrap()));
    }

    #[test]
    fn test_mapped_v6_matches_v4() {
        let lookup = StaticAddresses::new([IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))]);
        let mapped = IpAddr::V6(Ipv4Addr::new(10, 0, 0, 2).to_ipv6_mapped());
        assert!(lookup.contains(&mapped));
        assert!(!lookup.contains(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
    }

    #[test]
    fn test_interfaces_exclude_loopback() {
        let lookup = InterfaceAddresses::new();
        assert!(!lookup.contains(&IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(!lookup.contains(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(lookup.snapshot().iter().all(|ip| !ip.is_loopback()));

        lookup.refresh();
        assert!(!lookup.contains(&IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
    }
}
