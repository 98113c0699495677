// ============================================
// File: crates/streamvpn-common/src/lib.rs
// ============================================
//! # StreamVPN Common - Shared Utilities Library
//!
//! ## Creation Reason
//! Provides the foundational types shared by every StreamVPN crate so the
//! server and client agree on how sessions and virtual subnets are named.
//!
//! ## Main Functionality
//! - [`types`]: `SessionId` and `Subnet` (virtual network + mask)
//! - [`time`]: `AtomicInstant` for lock-free activity tracking
//! - [`error`]: Common error type and result alias
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │     streamvpn-server          streamvpn-client      │
//! │            │                         │              │
//! │            └───────────┬─────────────┘              │
//! │                        ▼                            │
//! │   streamvpn-core ◄── streamvpn-transport            │
//! │            │                                        │
//! │            ▼                                        │
//! │     streamvpn-common  ◄── You are here              │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate is the foundation - changes affect everything
//! - No internal crate dependencies (leaf node)
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod time;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{CommonError, Result};
pub use types::{SessionId, Subnet};
