// ============================================
// File: crates/streamvpn-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Centralizes the identifiers and address types shared by the server
//! and client, so the session registry, the address pool and the
//! configuration layer all speak about the same values.
//!
//! ## Main Functionality
//! - `SessionId`: Random identifier for one accepted connection
//! - `Subnet`: Virtual network base + mask, parsed from CIDR notation
//!
//! ## ⚠️ Important Note for Next Developer
//! - `Subnet` always stores a normalized base (`base & mask == base`)
//! - Address arithmetic is done on host-order `u32`; wire bytes are
//!   handled in `streamvpn-core`, never here
//!
//! ## Last Modified
//! v0.1.0 - Initial type definitions

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::CommonError;

// ============================================
// Constants
// ============================================

/// Size of SessionId in bytes
pub const SESSION_ID_SIZE: usize = 8;

// ============================================
// SessionId
// ============================================

/// Unique identifier for an accepted tunnel connection.
///
/// Generated once per connection by the server and used as the key of
/// the session registry and as a structured logging field. It never
/// appears on the wire.
///
/// # Example
/// ```
/// use streamvpn_common::types::SessionId;
///
/// let id = SessionId::generate();
/// let parsed: SessionId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; SESSION_ID_SIZE]);

impl SessionId {
    /// Generates a new random `SessionId`.
    #[must_use]
    pub fn generate() -> Self {
        let mut id = [0u8; SESSION_ID_SIZE];
        rand::thread_rng().fill_bytes(&mut id);
        Self(id)
    }

    /// Creates a `SessionId` from raw bytes.
    ///
    /// Returns `None` unless `bytes` is exactly [`SESSION_ID_SIZE`] long.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let id: [u8; SESSION_ID_SIZE] = bytes.try_into().ok()?;
        Some(Self(id))
    }

    /// Returns the raw bytes of the session ID.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SESSION_ID_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", hex::encode(self.0))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for SessionId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|e| CommonError::invalid_input("session_id", e.to_string()))?;
        Self::from_bytes(&bytes)
            .ok_or_else(|| CommonError::invalid_length(SESSION_ID_SIZE, bytes.len()))
    }
}

// ============================================
// Subnet
// ============================================

/// A virtual IPv4 network: normalized base address plus netmask.
///
/// # Invariant
/// `base & mask == base`. Every virtual address leased to a client
/// satisfies `addr & mask == base`.
///
/// # Serialization
/// Serialized as CIDR text (`"10.0.0.0/16"`) so it can be used directly
/// in TOML configuration.
///
/// # Example
/// ```
/// use streamvpn_common::types::Subnet;
/// use std::net::Ipv4Addr;
///
/// let subnet: Subnet = "10.0.0.0/16".parse().unwrap();
/// assert!(subnet.contains(Ipv4Addr::new(10, 0, 3, 7)));
/// assert!(!subnet.contains(Ipv4Addr::new(10, 1, 0, 1)));
/// assert_eq!(subnet.mask(), Ipv4Addr::new(255, 255, 0, 0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subnet {
    base: Ipv4Addr,
    prefix_len: u8,
}

impl Subnet {
    /// Creates a subnet from a network address and prefix length.
    ///
    /// Host bits set in `network` are cleared.
    ///
    /// # Errors
    /// Returns `OutOfRange` if `prefix_len > 32`.
    pub fn new(network: Ipv4Addr, prefix_len: u8) -> Result<Self, CommonError> {
        if prefix_len > 32 {
            return Err(CommonError::out_of_range(prefix_len, 0, 32));
        }
        let base = Ipv4Addr::from(u32::from(network) & prefix_to_mask(prefix_len));
        Ok(Self { base, prefix_len })
    }

    /// Creates a subnet in const context, clamping `prefix_len` to 32.
    #[must_use]
    pub const fn clamped(network: Ipv4Addr, prefix_len: u8) -> Self {
        let prefix_len = if prefix_len > 32 { 32 } else { prefix_len };
        let masked = u32::from_be_bytes(network.octets()) & prefix_to_mask(prefix_len);
        let [a, b, c, d] = masked.to_be_bytes();
        Self {
            base: Ipv4Addr::new(a, b, c, d),
            prefix_len,
        }
    }

    /// Returns the network base address.
    #[must_use]
    pub const fn base(&self) -> Ipv4Addr {
        self.base
    }

    /// Returns the CIDR prefix length.
    #[must_use]
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns the netmask as an address.
    #[must_use]
    pub fn mask(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.mask_bits())
    }

    /// Returns the netmask in host byte order.
    #[must_use]
    pub fn mask_bits(&self) -> u32 {
        prefix_to_mask(self.prefix_len)
    }

    /// Returns the last address covered by this subnet (the broadcast).
    #[must_use]
    pub fn last(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.base) | !self.mask_bits())
    }

    /// Checks whether `addr & mask == base`.
    #[must_use]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & self.mask_bits() == u32::from(self.base)
    }

    /// Checks whether `addr` is the network or broadcast address.
    #[must_use]
    pub fn is_network_or_broadcast(&self, addr: Ipv4Addr) -> bool {
        let host = u32::from(addr) & !self.mask_bits();
        host == 0 || host == !self.mask_bits()
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix_len)
    }
}

impl FromStr for Subnet {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (network, prefix) = s
            .split_once('/')
            .ok_or_else(|| CommonError::invalid_input("subnet", "must be in CIDR notation"))?;

        let network: Ipv4Addr = network
            .trim()
            .parse()
            .map_err(|_| CommonError::invalid_input("subnet", "invalid network address"))?;

        let prefix: u8 = prefix
            .trim()
            .parse()
            .map_err(|_| CommonError::invalid_input("subnet", "invalid prefix length"))?;

        Self::new(network, prefix)
    }
}

impl TryFrom<String> for Subnet {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Subnet> for String {
    fn from(subnet: Subnet) -> Self {
        subnet.to_string()
    }
}

/// Converts a prefix length (0-32) to a host-order netmask.
#[must_use]
pub const fn prefix_to_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else if prefix_len >= 32 {
        u32::MAX
    } else {
        !0u32 << (32 - prefix_len)
    }
}

// ============================================
// Tests
// ============================================
