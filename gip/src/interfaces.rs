//! Host network interfaces and random interface selection

use std::sync::Mutex;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Interface names on this host, in enumeration order, without duplicates.
/// WireGuard interfaces are skipped.
pub fn system_interfaces() -> Result<Vec<String>> {
    let addrs = nix::ifaddrs::getifaddrs().context("Failed to enumerate network interfaces")?;

    let mut names: Vec<String> = Vec::new();
    for ifaddr in addrs {
        if is_wireguard(&ifaddr.interface_name) || names.contains(&ifaddr.interface_name) {
            continue;
        }
        names.push(ifaddr.interface_name);
    }
    Ok(names)
}

fn is_wireguard(name: &str) -> bool {
    name.contains("wg")
}

/// Pick one interface uniformly at random. `None` for an empty list.
pub fn pick_interface<'a, R: Rng + ?Sized>(interfaces: &'a [String], rng: &mut R) -> Option<&'a String> {
    interfaces.choose(rng)
}

/// Random interface selection backed by one generator for the process lifetime.
pub struct InterfacePicker {
    rng: Mutex<StdRng>,
}

impl InterfacePicker {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic picker, for reproducible selection.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn pick_from(&self, interfaces: &[String]) -> Option<String> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        pick_interface(interfaces, &mut *rng).cloned()
    }

    /// Pick one of this host's (non-WireGuard) interfaces.
    pub fn pick(&self) -> Result<Option<String>> {
        let interfaces = system_interfaces()?;
        Ok(self.pick_from(&interfaces))
    }
}

impl Default for InterfacePicker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pick_from_empty_list() {
        let picker = InterfacePicker::with_seed(7);
        assert_eq!(picker.pick_from(&[]), None);
    }

    #[test]
    fn test_single_interface_is_always_picked() {
        let picker = InterfacePicker::with_seed(7);
        let list = names(&["eth0"]);
        for _ in 0..20 {
            assert_eq!(picker.pick_from(&list).as_deref(), Some("eth0"));
        }
    }

    #[test]
    fn test_picks_stay_in_bounds_and_cover_list() {
        let picker = InterfacePicker::with_seed(42);
        let list = names(&["lo", "eth0", "eth1"]);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let picked = picker.pick_from(&list).unwrap();
            assert!(list.contains(&picked));
            seen.insert(picked);
        }
        assert_eq!(seen.len(), list.len());
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let list = names(&["eth0", "eth1", "eth2", "eth3"]);
        let a = InterfacePicker::with_seed(1);
        let b = InterfacePicker::with_seed(1);
        for _ in 0..10 {
            assert_eq!(a.pick_from(&list), b.pick_from(&list));
        }
    }

    #[test]
    fn test_wireguard_filter() {
        assert!(is_wireguard("wg0"));
        assert!(is_wireguard("nordwg"));
        assert!(!is_wireguard("eth0"));
    }

    #[test]
    fn test_system_interfaces_excludes_wireguard() {
        let interfaces = system_interfaces().unwrap();
        assert!(interfaces.iter().all(|name| !name.contains("wg")));
        let mut deduped = interfaces.clone();
        deduped.dedup();
        assert_eq!(deduped.len(), interfaces.len());
    }
}
