// ============================================
// File: crates/streamvpn-transport/src/lib.rs
// ============================================
//! # StreamVPN Transport - Network I/O Layer
//!
//! ## Creation Reason
//! Provides the OS-facing half of the tunnel: TCP sockets carrying the
//! framed unit stream, and TUN devices carrying raw IP packets on the
//! client.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`traits`]: `TunDevice` trait and `TunConfig`
//! - [`tcp`]: Listener / connector construction with socket2
//! - [`framed`]: Cancel-safe framed reader and framed writer
//! - [`tun`]: TUN device implementations (Linux, mock)
//! - [`error`]: Transport-specific error types
//!
//! ## Data Flow
//! ```text
//! ┌──────────────┐   raw IPv4    ┌──────────────┐  frames over TCP  ┌──────────┐
//! │  TUN device  │ ◄───────────► │    client    │ ◄═══════════════► │  server  │
//! └──────────────┘               └──────────────┘                   └──────────┘
//! ```
//!
//! ## Platform Support
//! | Platform | TCP | TUN |
//! |----------|-----|-----|
//! | Linux | ✅ | ✅ |
//! | other | ✅ | ❌ (mock only) |
//!
//! ## ⚠️ Important Note for Next Developer
//! - TUN operations require elevated privileges
//! - Mock TUN is available with the `mock` feature
//! - `FramedReader::next_frame` is safe to use inside `tokio::select!`
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod framed;
pub mod tcp;
pub mod traits;
pub mod tun;

// Re-export primary types
pub use error::{Result, TransportError};
pub use framed::{framed_split, FramedReader, FramedWriter};
pub use traits::{TunConfig, TunDevice};

#[cfg(target_os = "linux")]
pub use tun::linux::LinuxTun;
