// ============================================
// File: crates/streamvpn-transport/src/error.rs
// ============================================
//! # Tunnel Transport Errors
//!
//! ## Creation Reason
//! Defines error types for the tunnel's TCP sockets, framed I/O and TUN
//! devices.
//!
//! ## Error Categories
//! 1. **Network Errors**: bind, connect, accept, send, receive
//! 2. **Framing Errors**: wrapped `CoreError` from the frame decoder
//! 3. **TUN Errors**: device creation, configuration, read/write
//! 4. **System Errors**: permission denied, timeouts
//!
//! ## ⚠️ Important Note for Next Developer
//! - A session's transport error ends that session only; callers decide
//!   whether to reconnect (client) or tear down (server)
//! - TUN creation and configuration usually need `CAP_NET_ADMIN`
//!
//! ## Last Modified
//! v0.1.0 - Socket, framing and TUN error variants

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use streamvpn_common::error::CommonError;
use streamvpn_core::error::CoreError;

// ============================================
// Result Type Alias
// ============================================

/// Shorthand for results carrying a [`TransportError`].
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Failures raised by sockets, framed streams and TUN devices.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Network Errors
    // ========================================

    /// The listener could not bind.
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed {
        /// Requested listen address
        addr: SocketAddr,
        /// Why binding failed
        reason: String,
    },

    /// Failed to connect to the server.
    #[error("Failed to connect to {target}: {reason}")]
    ConnectFailed {
        /// Host and port we tried
        target: String,
        /// Why the connection failed
        reason: String,
    },

    /// Accepting a connection failed.
    #[error("Failed to accept connection: {reason}")]
    AcceptFailed {
        /// Why accept failed
        reason: String,
    },

    /// Writing to the peer failed.
    #[error("Failed to send: {reason}")]
    SendFailed {
        /// Why send failed
        reason: String,
    },

    /// Reading from the peer failed.
    #[error("Failed to read from peer: {reason}")]
    ReceiveFailed {
        /// Why receive failed
        reason: String,
    },

    /// Address string could not be resolved.
    #[error("Invalid address: {addr}")]
    InvalidAddress {
        /// Address as given
        addr: String,
    },

    // ========================================
    // Framing Errors
    // ========================================

    /// The byte stream violated the framing rules.
    #[error("Framing error: {0}")]
    Framing(#[from] CoreError),

    // ========================================
    // TUN Device Errors
    // ========================================

    /// Opening the TUN device failed.
    #[error("Cannot open TUN device '{name}': {reason}")]
    TunCreateFailed {
        /// Requested device name
        name: String,
        /// Why creation failed
        reason: String,
    },

    /// Setting an address, MTU or link state on the device failed.
    #[error("Cannot configure TUN device '{name}': {reason}")]
    TunConfigFailed {
        /// Device name
        name: String,
        /// OS error text
        reason: String,
    },

    /// Reading a packet from the device failed.
    #[error("Error reading from TUN: {reason}")]
    TunReadFailed {
        /// Why read failed
        reason: String,
    },

    /// Writing a packet to the device failed.
    #[error("Error writing to TUN: {reason}")]
    TunWriteFailed {
        /// Why write failed
        reason: String,
    },

    // ========================================
    // Configuration / System Errors
    // ========================================

    /// A device or socket parameter is out of range.
    #[error("Invalid transport setting {field}: {reason}")]
    InvalidConfig {
        /// Offending parameter
        field: String,
        /// Why it's invalid
        reason: String,
    },

    /// The OS refused the operation.
    #[error("Not permitted: {operation}")]
    PermissionDenied {
        /// Refused operation
        operation: String,
    },

    /// Operation timed out.
    #[error("Timed out during {operation}")]
    Timeout {
        /// Operation that ran out of time
        operation: String,
    },

    /// Raw socket or file descriptor error.
    #[error("I/O failure during {context}")]
    Io {
        /// Operation in progress
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Shared type validation error.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TransportError {
    // ========================================
    // Constructors
    // ========================================

    /// Builds a `BindFailed`.
    pub fn bind_failed(addr: SocketAddr, reason: impl Into<String>) -> Self {
        Self::BindFailed {
            addr,
            reason: reason.into(),
        }
    }

    /// Creates a `ConnectFailed` error.
    pub fn connect_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Builds a `TunCreateFailed`.
    pub fn tun_create_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TunCreateFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `TunConfigFailed` error.
    pub fn tun_config_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TunConfigFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Wraps an OS error with the operation it interrupted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Builds an `InvalidConfig`.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this error is transient and a reconnect may
    /// succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. }
            | Self::ConnectFailed { .. }
            | Self::SendFailed { .. }
            | Self::ReceiveFailed { .. } => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::WouldBlock
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    /// Returns `true` when running as root would likely fix the error.
    #[must_use]
    pub const fn requires_privileges(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied { .. } | Self::TunCreateFailed { .. }
        )
    }

    /// Returns `true` for failures on the virtual interface side.
    #[must_use]
    pub const fn is_tun_error(&self) -> bool {
        matches!(
            self,
            Self::TunCreateFailed { .. }
                | Self::TunConfigFailed { .. }
                | Self::TunReadFailed { .. }
                | Self::TunWriteFailed { .. }
        )
    }
}

// ============================================
// Conversions
// ============================================

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            context: "socket operation".into(),
            source: err,
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::bind_failed("127.0.0.1:2002".parse().unwrap(), "address in use");
        assert!(err.to_string().contains("127.0.0.1:2002"));
        assert!(err.to_string().starts_with("Failed to bind"));
    }

    #[test]
    fn test_retry_and_privilege_flags() {
        let connect = TransportError::connect_failed("vpn.example.com:2002", "refused");
        assert!(connect.is_retryable());
        assert!(!connect.is_tun_error());

        let open = TransportError::tun_create_failed("svpn0", "EPERM");
        assert!(open.is_tun_error());
        assert!(open.requires_privileges());
        assert!(!open.is_retryable());
    }

    #[test]
    fn test_reset_io_error_is_retryable() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let err = TransportError::from(io_err);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_framing_error_conversion() {
        let err: TransportError = CoreError::FrameEmpty.into();
        assert!(matches!(err, TransportError::Framing(CoreError::FrameEmpty)));
        assert!(!err.is_retryable());
    }
}
