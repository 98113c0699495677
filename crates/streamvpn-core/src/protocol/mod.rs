// ============================================
// File: crates/streamvpn-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Creation Reason
//! Defines the wire protocol spoken over the tunnel's TCP stream.
//!
//! ### Submodules
//! - [`header`]: The 20-byte unit header and `classify`
//! - [`codec`]: Binary encode/decode for headers and handshake messages
//! - [`framing`]: 2-byte length prefix around every unit
//! - [`handshake`]: Identity / challenge / response messages
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Handshake Phase                          │
//! │  Client ───────── identity ─────────────────────────► Server │
//! │  Client ◄──────── challenge (identity echoed) ─────── Server │
//! │  Client ───────── response (32 bytes) ──────────────► Server │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    Negotiation Phase                        │
//! │  Client ───────── address request (20-byte unit) ───► Server │
//! │  Client ◄──────── address reply   (20-byte unit) ──── Server │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    Forwarding Phase                         │
//! │  Client ═════════ IPv4 packets / keepalives ════════ Server │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//! Every message above travels inside one frame: `[len: u16 BE][payload]`.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Header fields are big-endian (network order)
//! - Control units are recognised only when exactly 20 bytes long
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod codec;
pub mod framing;
pub mod handshake;
pub mod header;

// Re-export primary types
pub use codec::{Codec, ProtocolCodec};
pub use framing::{encode_frame, FrameDecoder, FRAME_PREFIX_LEN, MAX_FRAME_SIZE};
pub use handshake::{challenge_response, ChallengeResponse, HandshakePhase, Identity, RESPONSE_LEN};
pub use header::{classify, TunnelHeader, UnitKind, HEADER_LEN};
