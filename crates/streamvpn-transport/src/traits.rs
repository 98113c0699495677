// ============================================
// File: crates/streamvpn-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! The client's forwarding loop consumes the virtual interface as a
//! read/write pair of raw IP packets. Putting that behind a trait keeps
//! the loop testable with an in-memory device.
//!
//! ## Main Functionality
//! - `TunDevice`: TUN device read/write + address assignment hook
//! - `TunConfig`: device creation parameters
//!
//! ## ⚠️ Important Note for Next Developer
//! - Devices are shared across tasks behind `Arc`, hence `Send + Sync`
//! - `assign_address` is the only place the interface address is set;
//!   the tunnel logic calls it once negotiation reports a lease
//!
//! ## Last Modified
//! v0.1.0 - `TunDevice` and `TunConfig`

use std::net::Ipv4Addr;

use async_trait::async_trait;

use crate::error::{Result, TransportError};

// ============================================
// TunDevice Trait
// ============================================

/// Packet-level view of a virtual point-to-point interface.
///
/// # Data Format
/// Data read from and written to the device is raw IP packets
/// (no Ethernet headers, no packet-info prefix).
///
/// # Example
/// ```ignore
/// async fn pump<T: TunDevice>(tun: &T) -> Result<()> {
///     let mut packet = vec![0u8; usize::from(tun.mtu())];
///     loop {
///         let n = tun.read(&mut packet).await?;
///         forward(&packet[..n]).await?;
///     }
/// }
/// ```
#[async_trait]
pub trait TunDevice: Send + Sync {
    /// Reads one IP packet from the device.
    ///
    /// # Errors
    /// Fails when the descriptor is closed or the OS reports an error
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Writes one IP packet to the device.
    ///
    /// # Errors
    /// Fails when the packet cannot be handed to the kernel
    async fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Interface name as the kernel reports it.
    fn name(&self) -> &str;

    /// Largest packet the interface accepts.
    fn mtu(&self) -> u16;

    /// Returns the currently assigned address, if any.
    fn address(&self) -> Option<Ipv4Addr>;

    /// Assigns the negotiated tunnel address to the interface.
    ///
    /// # Arguments
    /// * `addr` - Leased virtual address
    /// * `netmask` - Netmask of the virtual network
    /// * `host_route` - Also install a host route for `addr` (static leases)
    ///
    /// # Errors
    /// Returns error if the OS rejects the configuration
    async fn assign_address(&self, addr: Ipv4Addr, netmask: Ipv4Addr, host_route: bool)
        -> Result<()>;

    /// Brings the device up.
    ///
    /// # Errors
    /// Fails when the link flags cannot be changed
    async fn up(&self) -> Result<()>;

    /// Brings the device down.
    ///
    /// # Errors
    /// Fails when the link flags cannot be changed
    async fn down(&self) -> Result<()>;

    /// Whether the link is currently administratively up.
    fn is_up(&self) -> bool;
}

// ============================================
// TunConfig
// ============================================

/// Parameters used when opening a TUN device.
///
/// # Example
/// ```
/// use streamvpn_transport::traits::TunConfig;
///
/// let config = TunConfig::new("svpn0").with_mtu(1400);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct TunConfig {
    /// Device name (e.g., "tun0"). Empty lets the kernel choose.
    pub name: String,
    /// MTU size.
    pub mtu: u16,
    /// Keep the interface after the descriptor is closed.
    pub persist: bool,
}

impl TunConfig {
    /// Configuration for `name` with a 1400-byte MTU.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mtu: 1400,
            persist: false,
        }
    }

    /// Sets the MTU.
    #[must_use]
    pub const fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    /// Sets the persist flag.
    #[must_use]
    pub const fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Checks the name length and MTU range.
    ///
    /// # Errors
    /// `InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.name.len() > 15 {
            return Err(TransportError::invalid_config(
                "name",
                "interface names are limited to 15 bytes",
            ));
        }

        if self.mtu < 576 {
            return Err(TransportError::invalid_config(
                "mtu",
                "below the IPv4 minimum of 576",
            ));
        }

        if self.mtu > 9000 {
            return Err(TransportError::invalid_config(
                "mtu",
                "above the 9000-byte jumbo limit",
            ));
        }

        Ok(())
    }
}

impl Default for TunConfig {
    fn default() -> Self {
        Self::new("")
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_tunnel_mtu() {
        let config = TunConfig::new("svpn0");
        assert_eq!(config.name, "svpn0");
        assert_eq!(config.mtu, 1400);
        assert!(!config.persist);
    }

    #[test]
    fn test_validate_bounds() {
        assert!(TunConfig::new("tun0").validate().is_ok());

        // Kernel-assigned name is allowed
        assert!(TunConfig::default().validate().is_ok());

        assert!(TunConfig::new("a".repeat(20)).validate().is_err());
        assert!(TunConfig::new("tun0").with_mtu(100).validate().is_err());
        assert!(TunConfig::new("tun0").with_mtu(10000).validate().is_err());
    }
}
