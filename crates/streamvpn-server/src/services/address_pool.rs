// ============================================
// File: crates/streamvpn-server/src/services/address_pool.rs
// ============================================
//! # Virtual Address Pool
//!
//! ## Creation Reason
//! Hands out virtual addresses to sessions and takes them back, so that
//! no two live sessions ever share an address.
//!
//! ## Main Functionality
//! - `AddressPool::seed`: enumerate the leasable addresses of a range
//! - `allocate_any` / `claim` / `release`
//!
//! ## Seeding Rules
//! A candidate `a` in `[network, range_high]` is leasable unless:
//! - `a & mask != network`
//! - its host part is all zeros or all ones
//! - its low octet is `0x00` or `0xff`
//! - its second-lowest octet is `0x00` or `0xff` and that octet holds
//!   host bits (for /24 and narrower it is part of the network)
//! - it is the reserved gateway address
//!
//! ```text
//! 10.0.0.0/16, gateway 10.0.1.1:
//!   10.0.0.x    skipped (second octet 0x00)
//!   10.0.1.1    skipped (gateway)
//!   10.0.1.2    first lease
//!   10.0.1.255  skipped (low octet 0xff)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - NOT internally synchronized. It lives inside the session registry's
//!   mutex so that address changes and session changes are observed
//!   together.
//! - Allocation is lowest-address-first; with a fixed seed the sequence
//!   of leases is deterministic
//!
//! ## Last Modified
//! v0.1.0 - Initial address pool

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use tracing::{debug, warn};

use streamvpn_common::Subnet;

use crate::error::{Result, ServerError};

// ============================================
// AddressPool
// ============================================

/// Set of currently unleased virtual addresses.
///
/// # Example
/// ```
/// use std::net::Ipv4Addr;
/// use streamvpn_common::Subnet;
/// use streamvpn_server::services::AddressPool;
///
/// let subnet: Subnet = "10.0.0.0/24".parse().unwrap();
/// let mut pool = AddressPool::seed(subnet, subnet.last(), Some(Ipv4Addr::new(10, 0, 0, 1)));
///
/// let first = pool.allocate_any().unwrap();
/// assert_eq!(first, Ipv4Addr::new(10, 0, 0, 2));
/// assert!(!pool.claim(first));
/// assert!(pool.release(first));
/// ```
pub struct AddressPool {
    subnet: Subnet,
    range_high: Ipv4Addr,
    gateway: Option<Ipv4Addr>,
    free: BTreeSet<Ipv4Addr>,
    capacity: usize,
}

impl AddressPool {
    /// Builds the pool from `subnet.base()` up to `range_high` inclusive.
    ///
    /// # Arguments
    /// * `subnet` - Virtual network (base and mask)
    /// * `range_high` - Highest candidate address
    /// * `gateway` - Address reserved for the server, never leased
    #[must_use]
    pub fn seed(subnet: Subnet, range_high: Ipv4Addr, gateway: Option<Ipv4Addr>) -> Self {
        let mut pool = Self {
            subnet,
            range_high,
            gateway,
            free: BTreeSet::new(),
            capacity: 0,
        };

        let low = u32::from(subnet.base());
        let high = u32::from(range_high).min(u32::from(subnet.last()));
        if low <= high {
            pool.free = (low..=high)
                .map(Ipv4Addr::from)
                .filter(|addr| pool.is_leasable(*addr))
                .collect();
        }
        pool.capacity = pool.free.len();

        debug!(
            subnet = %subnet,
            range_high = %range_high,
            leasable = pool.capacity,
            "Address pool seeded"
        );
        pool
    }

    /// Returns `true` if `addr` passes every seeding rule.
    ///
    /// The second-lowest octet is only filtered when the mask leaves host
    /// bits in it. On a `/24` or longer prefix that octet is fixed by the
    /// network itself, so `10.0.0.0/24` still leases `10.0.0.2..=10.0.0.254`.
    #[must_use]
    pub fn is_leasable(&self, addr: Ipv4Addr) -> bool {
        if !self.in_range(addr) || self.subnet.is_network_or_broadcast(addr) {
            return false;
        }
        if self.gateway == Some(addr) {
            return false;
        }

        let [_, _, second, low] = addr.octets();
        if low == 0x00 || low == 0xff {
            return false;
        }

        let second_has_host_bits = self.subnet.mask_bits() & 0x0000_ff00 != 0x0000_ff00;
        !(second_has_host_bits && (second == 0x00 || second == 0xff))
    }

    /// Checks `addr & mask == network` and `addr <= range_high`.
    #[must_use]
    pub fn in_range(&self, addr: Ipv4Addr) -> bool {
        self.subnet.contains(addr) && addr <= self.range_high
    }

    /// Removes and returns the lowest free address.
    ///
    /// # Errors
    /// Returns `PoolExhausted` when no address is free.
    pub fn allocate_any(&mut self) -> Result<Ipv4Addr> {
        let addr = self.free.pop_first().ok_or(ServerError::PoolExhausted)?;
        debug!(virtual_ip = %addr, remaining = self.free.len(), "Address allocated");
        Ok(addr)
    }

    /// Removes `addr` from the pool if it is currently free.
    ///
    /// # Returns
    /// `false` if the address is leased or was never leasable.
    pub fn claim(&mut self, addr: Ipv4Addr) -> bool {
        let claimed = self.free.remove(&addr);
        if claimed {
            debug!(virtual_ip = %addr, remaining = self.free.len(), "Address claimed");
        }
        claimed
    }

    /// Returns `addr` to the pool.
    ///
    /// Releasing an address that is already free, or that the pool would
    /// never have handed out, is a logged no-op.
    ///
    /// # Returns
    /// `true` if the address was reinserted.
    pub fn release(&mut self, addr: Ipv4Addr) -> bool {
        if !self.is_leasable(addr) {
            warn!(virtual_ip = %addr, subnet = %self.subnet, "Ignoring release of non-leasable address");
            return false;
        }
        if !self.free.insert(addr) {
            warn!(virtual_ip = %addr, "Ignoring release of address that is already free");
            return false;
        }
        debug!(virtual_ip = %addr, available = self.free.len(), "Address released");
        true
    }

    /// Returns `true` if `addr` is currently free.
    #[must_use]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.free.contains(&addr)
    }

    /// Returns the number of free addresses.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Returns the number of addresses seeded at startup.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for AddressPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressPool")
            .field("subnet", &self.subnet)
            .field("range_high", &self.range_high)
            .field("available", &self.free.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn subnet(s: &str) -> Subnet {
        s.parse().unwrap()
    }

    fn drain(pool: &mut AddressPool) -> Vec<Ipv4Addr> {
        std::iter::from_fn(|| pool.allocate_any().ok()).collect()
    }

    #[test]
    fn test_seed_slash24_skips_gateway_and_edges() {
        let net = subnet("10.0.0.0/24");
        let mut pool = AddressPool::seed(net, net.last(), Some(Ipv4Addr::new(10, 0, 0, 1)));

        // .0, .255 and the gateway are excluded
        assert_eq!(pool.capacity(), 253);
        assert_eq!(pool.allocate_any().unwrap(), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(pool.allocate_any().unwrap(), Ipv4Addr::new(10, 0, 0, 3));
    }

    #[test]
    fn test_drained_addresses_are_distinct_and_in_range() {
        for (cidr, high, mask) in [
            ("10.0.0.0/20", Ipv4Addr::new(10, 0, 15, 255), 0xffff_f000_u32),
            ("192.168.4.0/23", Ipv4Addr::new(192, 168, 5, 255), 0xffff_fe00),
            ("172.16.0.0/16", Ipv4Addr::new(172, 16, 3, 10), 0xffff_0000),
            ("10.9.9.0/28", Ipv4Addr::new(10, 9, 9, 15), 0xffff_fff0),
        ] {
            let net = subnet(cidr);
            let mut pool = AddressPool::seed(net, high, None);
            let leased = drain(&mut pool);

            assert!(!leased.is_empty(), "{cidr}");
            let unique: HashSet<_> = leased.iter().collect();
            assert_eq!(unique.len(), leased.len(), "{cidr}");

            for addr in leased {
                let bits = u32::from(addr);
                assert_eq!(bits & mask, u32::from(net.base()), "{addr} outside {cidr}");
                let [_, _, _, low] = addr.octets();
                assert!(low != 0x00 && low != 0xff, "{addr}");
                assert!(addr <= high);
            }
            assert!(matches!(pool.allocate_any(), Err(ServerError::PoolExhausted)));
        }
    }

    #[test]
    fn test_second_octet_filtered_only_in_host_bits() {
        // /16: second octet is host bits, 10.0.0.x and 10.0.255.x excluded
        let wide = subnet("10.0.0.0/16");
        let pool = AddressPool::seed(wide, wide.last(), None);
        assert!(!pool.contains(Ipv4Addr::new(10, 0, 0, 5)));
        assert!(!pool.contains(Ipv4Addr::new(10, 0, 255, 5)));
        assert!(pool.contains(Ipv4Addr::new(10, 0, 1, 5)));
        assert_eq!(pool.capacity(), 254 * 254);

        // /24: second octet is network bits and must not be filtered
        let narrow = subnet("10.0.0.0/24");
        let pool = AddressPool::seed(narrow, narrow.last(), None);
        assert!(pool.contains(Ipv4Addr::new(10, 0, 0, 5)));
    }

    #[test]
    fn test_range_high_limits_seed() {
        let net = subnet("10.0.0.0/24");
        let pool = AddressPool::seed(net, Ipv4Addr::new(10, 0, 0, 10), None);
        assert_eq!(pool.capacity(), 10);
        assert!(!pool.in_range(Ipv4Addr::new(10, 0, 0, 11)));

        // High below base seeds nothing
        let empty = AddressPool::seed(subnet("10.0.1.0/24"), Ipv4Addr::new(10, 0, 0, 1), None);
        assert_eq!(empty.available(), 0);
    }

    #[test]
    fn test_claim_twice_fails() {
        let net = subnet("10.0.0.0/24");
        let mut pool = AddressPool::seed(net, net.last(), None);
        let addr = Ipv4Addr::new(10, 0, 0, 42);

        assert!(pool.claim(addr));
        assert!(!pool.claim(addr));

        assert!(pool.release(addr));
        assert!(pool.claim(addr));
    }

    #[test]
    fn test_claim_rejects_non_leasable() {
        let net = subnet("10.0.0.0/24");
        let mut pool = AddressPool::seed(net, net.last(), Some(Ipv4Addr::new(10, 0, 0, 1)));

        assert!(!pool.claim(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(!pool.claim(Ipv4Addr::new(10, 0, 0, 255)));
        assert!(!pool.claim(Ipv4Addr::new(192, 168, 0, 7)));
    }

    #[test]
    fn test_double_release_is_noop() {
        let net = subnet("10.0.0.0/24");
        let mut pool = AddressPool::seed(net, net.last(), None);
        let addr = pool.allocate_any().unwrap();
        let before = pool.available();

        assert!(pool.release(addr));
        assert!(!pool.release(addr));
        assert_eq!(pool.available(), before + 1);
    }

    #[test]
    fn test_release_out_of_range_is_noop() {
        let net = subnet("10.0.0.0/24");
        let mut pool = AddressPool::seed(net, net.last(), Some(Ipv4Addr::new(10, 0, 0, 1)));
        let before = pool.available();

        assert!(!pool.release(Ipv4Addr::new(10, 1, 0, 2)));
        assert!(!pool.release(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(pool.available(), before);
    }

    #[test]
    fn test_released_address_reused_first() {
        let net = subnet("10.0.0.0/24");
        let mut pool = AddressPool::seed(net, net.last(), None);
        let first = pool.allocate_any().unwrap();
        let _second = pool.allocate_any().unwrap();

        pool.release(first);
        assert_eq!(pool.allocate_any().unwrap(), first);
    }

    #[test]
    fn test_seed_is_deterministic() {
        let net = subnet("10.0.0.0/22");
        let mut a = AddressPool::seed(net, net.last(), None);
        let mut b = AddressPool::seed(net, net.last(), None);
        assert_eq!(drain(&mut a), drain(&mut b));
    }
}
