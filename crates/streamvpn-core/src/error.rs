// ============================================
// File: crates/streamvpn-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines error types for framing and message parsing in the tunnel
//! protocol.
//!
//! ## Error Categories
//! 1. **Framing Errors**: empty, oversized or truncated frames
//! 2. **Message Errors**: short or malformed headers and handshake messages
//!
//! ## ⚠️ Important Note for Next Developer
//! - Framing errors are terminal for the connection that produced them
//! - Never include identity secrets in error messages
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use streamvpn_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for protocol operations.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Framing Errors
    // ========================================

    /// A frame declared a zero-length payload.
    #[error("Empty frame")]
    FrameEmpty,

    /// A frame exceeds the configured maximum size.
    #[error("Frame too large: max {max} bytes, got {actual}")]
    FrameTooLarge {
        /// Maximum allowed size
        max: usize,
        /// Declared or actual size
        actual: usize,
    },

    /// The stream ended inside a frame.
    #[error("Stream ended mid-frame: expected {expected} bytes, got {actual}")]
    TruncatedFrame {
        /// Bytes the frame needed
        expected: usize,
        /// Bytes that were buffered
        actual: usize,
    },

    // ========================================
    // Message Errors
    // ========================================

    /// Message is too short to be valid.
    #[error("Message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort {
        /// Minimum expected length
        expected: usize,
        /// Actual length received
        actual: usize,
    },

    /// Message is malformed.
    #[error("Malformed message: {reason}")]
    MalformedMessage {
        /// What's wrong with the message
        reason: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    /// Creates a `MalformedMessage` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    /// Creates a `MessageTooShort` error.
    #[must_use]
    pub const fn too_short(expected: usize, actual: usize) -> Self {
        Self::MessageTooShort { expected, actual }
    }

    /// Returns `true` if the byte stream can no longer be trusted to be
    /// aligned on frame boundaries.
    #[must_use]
    pub const fn is_framing_error(&self) -> bool {
        matches!(
            self,
            Self::FrameEmpty | Self::FrameTooLarge { .. } | Self::TruncatedFrame { .. }
        )
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
        let err = CoreError::too_short(20, 7);
        assert!(err.to_string().contains("20"));
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn test_error_classification() {
        assert!(CoreError::FrameEmpty.is_framing_error());
        assert!(CoreError::TruncatedFrame { expected: 20, actual: 3 }.is_framing_error());
        assert!(!CoreError::malformed("bad identity").is_framing_error());
    }

    #[test]
    fn test_common_error_conversion() {
        let common = CommonError::invalid_input("field", "bad value");
        let core: CoreError = common.into();
        assert!(matches!(core, CoreError::Common(_)));
    }
}
