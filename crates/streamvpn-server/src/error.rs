// ============================================
// File: crates/streamvpn-server/src/error.rs
// ============================================
//! # Server Error Types
//!
//! ## Propagation
//! Everything except `ConfigLoad`, `ConfigInvalid`, `Keyfile` and
//! `StartupFailed` is confined to the session that produced it: the
//! owning worker logs it, tears the session down and exits.
//!
//! ## Last Modified
//! v0.1.0 - Initial server error definitions

use std::net::Ipv4Addr;

use thiserror::Error;

use streamvpn_common::error::CommonError;
use streamvpn_common::SessionId;
use streamvpn_core::error::CoreError;
use streamvpn_core::HandshakePhase;
use streamvpn_transport::error::TransportError;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server error types.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        /// Path of the configuration file
        path: String,
        /// Underlying reason
        reason: String,
    },

    /// A configuration value is invalid.
    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        /// Dotted field path
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// Keyfile could not be read or parsed.
    #[error("Keyfile error in '{path}': {reason}")]
    Keyfile {
        /// Keyfile path
        path: String,
        /// Underlying reason
        reason: String,
    },

    /// No free virtual address remains.
    #[error("Virtual address pool exhausted")]
    PoolExhausted,

    /// A static request named an address that is not free.
    #[error("Virtual address {0} is already in use")]
    AddressInUse(Ipv4Addr),

    /// An address outside the configured range was named.
    #[error("Virtual address {0} is outside the configured range")]
    AddressOutOfRange(Ipv4Addr),

    /// Too many concurrent sessions.
    #[error("Session limit reached: max {limit} sessions")]
    SessionLimitReached {
        /// Configured maximum
        limit: usize,
    },

    /// Referenced session is not registered.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// The client did not complete a handshake phase in time.
    #[error("Handshake timed out in phase {phase}")]
    HandshakeTimeout {
        /// Phase that timed out
        phase: HandshakePhase,
    },

    /// The client sent something the handshake cannot accept.
    #[error("Handshake protocol error in phase {phase}: {reason}")]
    HandshakeProtocol {
        /// Phase in which the violation occurred
        phase: HandshakePhase,
        /// What was wrong
        reason: String,
    },

    /// The peer did not answer any keepalive probe.
    #[error("Peer unresponsive after {probes} keepalive probes")]
    KeepaliveTimeout {
        /// Probes sent before giving up
        probes: u32,
    },

    /// Server could not start (bind, pool seeding, keyfile).
    #[error("Server failed to start: {reason}")]
    StartupFailed {
        /// Why startup failed
        reason: String,
    },

    /// Common error.
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Core protocol error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Creates a `ConfigLoad` error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConfigInvalid` error.
    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Keyfile` error.
    pub fn keyfile(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Keyfile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `HandshakeProtocol` error.
    pub fn handshake_protocol(phase: HandshakePhase, reason: impl Into<String>) -> Self {
        Self::HandshakeProtocol {
            phase,
            reason: reason.into(),
        }
    }

    /// Creates a `StartupFailed` error.
    pub fn startup_failed(reason: impl Into<String>) -> Self {
        Self::StartupFailed {
            reason: reason.into(),
        }
    }

    /// Returns `true` for configuration errors.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. } | Self::Keyfile { .. }
        )
    }

    /// Returns `true` for errors that end a single session.
    #[must_use]
    pub const fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::AddressInUse(_)
                | Self::AddressOutOfRange(_)
                | Self::SessionLimitReached { .. }
                | Self::SessionNotFound(_)
                | Self::HandshakeTimeout { .. }
                | Self::HandshakeProtocol { .. }
                | Self::KeepaliveTimeout { .. }
                | Self::Core(_)
                | Self::Transport(_)
        )
    }

    /// Returns `true` if the server process cannot continue.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. }
                | Self::ConfigInvalid { .. }
                | Self::Keyfile { .. }
                | Self::StartupFailed { .. }
        )
    }

    /// Returns `true` if the client may usefully retry the request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::PoolExhausted | Self::SessionLimitReached { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::config_load("/etc/streamvpn/server.toml", "file not found");
        assert!(err.to_string().contains("/etc/streamvpn/server.toml"));

        let err = ServerError::AddressInUse(Ipv4Addr::new(10, 0, 0, 7));
        assert!(err.to_string().contains("10.0.0.7"));

        let err = ServerError::HandshakeTimeout {
            phase: HandshakePhase::AwaitResponse,
        };
        assert!(err.to_string().contains("await_response"));
    }

    #[test]
    fn test_error_classification() {
        let config_err = ServerError::config_invalid("vpn.gateway_ip", "outside range");
        assert!(config_err.is_config_error());
        assert!(config_err.is_fatal());
        assert!(!config_err.is_session_error());

        let in_use = ServerError::AddressInUse(Ipv4Addr::new(10, 0, 0, 2));
        assert!(in_use.is_session_error());
        assert!(!in_use.is_fatal());
        assert!(!in_use.is_retryable());

        assert!(ServerError::PoolExhausted.is_retryable());
        assert!(ServerError::startup_failed("bind").is_fatal());
    }
}
