// ============================================
// File: crates/streamvpn-server/src/lib.rs
// ============================================
//! # StreamVPN Server Library
//!
//! ## Creation Reason
//! Accepts tunnel connections, leases each client a virtual address and
//! relays tunnel units between clients.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: TOML configuration
//! - [`keyfile`]: Identity/secret lookup
//! - [`server`]: Accept loop and lifecycle
//! - [`services`]: Address pool, registry, handshake, connection worker
//! - [`error`]: Server-specific error types
//!
//! ## Data Flow
//! ```text
//! client A ══TCP══► worker A ──► registry.lookup_route(dst) ──► queue B ──► worker B ══TCP══► client B
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The server has no TUN device; it only relays between clients
//! - Configuration changes require a restart
//!
//! ## Last Modified
//! v0.1.0 - Initial server library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod keyfile;
pub mod server;
pub mod services;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use server::Server;
