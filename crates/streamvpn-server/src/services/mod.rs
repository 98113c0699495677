// ============================================
// File: crates/streamvpn-server/src/services/mod.rs
// ============================================
//! # Server Services
//!
//! ## Creation Reason
//! Groups the session and address logic of the tunnel server.
//!
//! ## Service Architecture
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 ConnectionWorker (per TCP)                │
//! │   ┌──────────────────┐        ┌───────────────────────┐  │
//! │   │ SessionHandshake │ ─────► │    forwarding loop    │  │
//! │   └──────────────────┘        └───────────┬───────────┘  │
//! └───────────────────────────────────────────┼──────────────┘
//!                                             ▼
//!                      ┌────────────────────────────────────┐
//!                      │   SessionRegistry (one mutex)      │
//!                      │   ├── AddressPool                  │
//!                      │   ├── sessions                     │
//!                      │   └── routes                       │
//!                      └────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `AddressPool` is only ever touched through `SessionRegistry`
//! - Workers never reach into each other; they exchange units through
//!   the outbound queues the registry hands out
//!
//! ## Last Modified
//! v0.1.0 - Initial services structure

pub mod address_pool;
pub mod handshake;
pub mod registry;
pub mod worker;

pub use address_pool::AddressPool;
pub use handshake::{HandshakeOutcome, SessionHandshake};
pub use registry::{SessionInfo, SessionRegistry};
pub use worker::{ConnectionWorker, WorkerSettings};
