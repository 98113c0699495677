// ============================================
// File: crates/streamvpn-core/src/lib.rs
// ============================================
//! # StreamVPN Core - Tunnel Protocol Library
//!
//! ## Creation Reason
//! Holds the pure, I/O-free part of the tunnel protocol so the server
//! and client share one definition of the wire format and of the
//! keepalive rules.
//!
//! ## Main Functionality
//!
//! ### Protocol Module ([`protocol`])
//! - `TunnelHeader`: 20-byte IPv4-shaped unit header
//! - `classify`: tagged decode of a unit into control/data kinds
//! - Length-prefixed framing (`encode_frame`, `FrameDecoder`)
//! - Handshake messages (identity, challenge, response)
//!
//! ### Keepalive Module ([`keepalive`])
//! - `KeepaliveMonitor`: idle deadline, bounded probing, echo rule
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │     streamvpn-server          streamvpn-client      │
//! │            │                         │              │
//! │            └───────────┬─────────────┘              │
//! │                        ▼                            │
//! │   streamvpn-core ◄── streamvpn-transport            │
//! │   You are here                                      │
//! │            │                                        │
//! │            ▼                                        │
//! │     streamvpn-common                                │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - No tokio here; timers take `std::time::Instant` from the caller
//! - Header sentinel checks compare raw wire bytes, never host-order ints
//! - The handshake is an inert placeholder, not authentication
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod keepalive;
pub mod protocol;

// Re-export commonly used items
pub use error::{CoreError, Result};
pub use keepalive::{KeepaliveAction, KeepaliveMonitor, ProbeDecision};
pub use protocol::{
    classify, encode_frame, FrameDecoder, HandshakePhase, Identity, TunnelHeader, UnitKind,
};
