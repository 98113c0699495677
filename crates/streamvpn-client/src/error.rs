// ============================================
// File: crates/streamvpn-client/src/error.rs
// ============================================
//! # Client Error Types
//!
//! ## Propagation
//! Connection-scoped errors (transport, handshake, negotiation, keepalive)
//! send the reconnector back to `Reconnecting`. Configuration errors,
//! TUN failures, an initial static rejection and `ReconnectExhausted`
//! end the client.
//!
//! ## Last Modified
//! v0.1.0 - Initial client error definitions

use std::net::Ipv4Addr;

use thiserror::Error;

use streamvpn_common::error::CommonError;
use streamvpn_core::error::CoreError;
use streamvpn_transport::error::TransportError;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client error types.
#[derive(Error, Debug)]
pub enum ClientError {
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

    /// The server closed the connection instead of granting a static address.
    #[error("Server refused static address {0}: already in use")]
    AddressInUse(Ipv4Addr),

    /// The server did not answer a handshake step in time.
    #[error("Handshake timed out waiting for {step}")]
    HandshakeTimeout {
        /// Step that timed out
        step: &'static str,
    },

    /// The server sent something the handshake cannot accept.
    #[error("Handshake protocol error: {reason}")]
    HandshakeProtocol {
        /// What was wrong
        reason: String,
    },

    /// No address reply arrived in time.
    #[error("Address negotiation timed out after {timeout_secs}s")]
    NegotiationTimeout {
        /// Timeout that elapsed
        timeout_secs: u64,
    },

    /// The server did not answer any keepalive probe.
    #[error("Server unresponsive after {probes} keepalive probes")]
    KeepaliveTimeout {
        /// Probes sent before giving up
        probes: u32,
    },

    /// The server closed the tunnel connection.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Every reconnect attempt failed.
    #[error("Gave up after {attempts} reconnect attempts: {last_error}")]
    ReconnectExhausted {
        /// Attempts made
        attempts: u32,
        /// Error from the final attempt
        last_error: String,
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

impl ClientError {
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

    /// Creates a `HandshakeProtocol` error.
    pub fn handshake_protocol(reason: impl Into<String>) -> Self {
        Self::HandshakeProtocol {
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` for configuration errors.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigLoad { .. } | Self::ConfigInvalid { .. })
    }

    /// Returns `true` if a fresh connection may get past this error.
    ///
    /// `AddressInUse` is not retryable here; the reconnector decides
    /// separately whether a rejection after a reconnect is stale state
    /// on the server.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HandshakeTimeout { .. }
            | Self::HandshakeProtocol { .. }
            | Self::NegotiationTimeout { .. }
            | Self::KeepaliveTimeout { .. }
            | Self::ConnectionClosed
            | Self::Core(_)
            | Self::Io(_) => true,
            Self::Transport(e) => {
                e.is_retryable()
                    || matches!(e, TransportError::Framing(_) | TransportError::Io { .. })
            }
            _ => false,
        }
    }

    /// Returns `true` if the client must stop.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }
}

// ============================================
// Unit Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::AddressInUse(Ipv4Addr::new(10, 0, 0, 7));
        assert!(err.to_string().contains("10.0.0.7"));

        let err = ClientError::HandshakeTimeout { step: "challenge" };
        assert!(err.to_string().contains("challenge"));
    }

    #[test]
    fn test_error_classification() {
        assert!(ClientError::ConnectionClosed.is_retryable());
        assert!(ClientError::KeepaliveTimeout { probes: 3 }.is_retryable());
        assert!(ClientError::NegotiationTimeout { timeout_secs: 10 }.is_retryable());

        assert!(ClientError::AddressInUse(Ipv4Addr::new(10, 0, 0, 7)).is_fatal());
        assert!(ClientError::config_invalid("tunnel.mtu", "too small").is_fatal());
        assert!(ClientError::config_load("/x", "missing").is_config_error());
    }

    #[test]
    fn test_transport_classification() {
        let connect = TransportError::connect_failed("127.0.0.1:2002", "refused");
        assert!(ClientError::from(connect).is_retryable());

        let tun = TransportError::tun_create_failed("tun0", "permission denied");
        assert!(ClientError::from(tun).is_fatal());
    }
}
