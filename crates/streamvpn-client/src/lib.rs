// ============================================
// File: crates/streamvpn-client/src/lib.rs
// ============================================
//! # StreamVPN Client Library
//!
//! ## Creation Reason
//! Connects a local TUN device to a StreamVPN server and keeps the tunnel
//! up across network interruptions.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: TOML configuration
//! - [`reconnector`]: Connect, handshake, negotiate, forward, reconnect
//! - [`error`]: Client-specific error types
//!
//! ## Data Flow
//! ```text
//! ┌──────────┐  raw IPv4   ┌───────────────────┐  framed units  ┌────────┐
//! │ TUN dev  │ ◄─────────► │ ClientReconnector │ ◄════TCP═════► │ server │
//! └──────────┘             └───────────────────┘                └────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Creating the TUN device needs root or `CAP_NET_ADMIN`
//! - The negotiated address survives reconnects
//!
//! ## Last Modified
//! v0.1.0 - Initial client library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod reconnector;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use reconnector::{Backoff, ClientReconnector, ClientState};
