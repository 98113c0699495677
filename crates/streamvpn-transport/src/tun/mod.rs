// ============================================
// File: crates/streamvpn-transport/src/tun/mod.rs
// ============================================
//! # TUN Device Module
//!
//! ## Creation Reason
//! The client injects packets received from the tunnel into the local
//! IP stack, and captures outgoing packets for the tunnel, through a
//! layer-3 virtual interface.
//!
//! ## Platform Implementations
//! - `linux`: `/dev/net/tun` with `IFF_TUN | IFF_NO_PI`
//! - `mock`: In-memory channels for tests
//!
//! ```text
//!   application ──► kernel routing ──► svpn0 ──► client.read() ──► tunnel
//!   application ◄── kernel routing ◄── svpn0 ◄── client.write() ◄── tunnel
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Creating and configuring the device needs root or `CAP_NET_ADMIN`
//! - The device starts without an address; the tunnel assigns one after
//!   address negotiation
//!
//! ## Last Modified
//! v0.1.0 - Initial TUN module structure

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(target_os = "linux")]
pub use linux::LinuxTun;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockTun;
