// ============================================
// File: crates/streamvpn-core/src/protocol/handshake.rs
// ============================================
//! # Handshake Messages
//!
//! ## Creation Reason
//! Defines the three messages exchanged before address negotiation and
//! the phases a connection moves through while exchanging them.
//!
//! ## Handshake Flow
//! ```text
//! AwaitIdentity ──identity──► AwaitResponse ──response──► Established
//!       │                           │
//!       └────── timeout / EOF ──────┴──► connection closed
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - SECURITY GAP: the server never verifies the response. The shape of
//!   a challenge/response exchange is kept for wire compatibility only;
//!   it authenticates nothing.
//! - The response is SHA-256(challenge) so it is at least deterministic
//!   and fixed-size.
//!
//! ## Last Modified
//! v0.1.0 - Initial handshake messages

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Maximum identity length in bytes.
pub const MAX_IDENTITY_LEN: usize = 255;

/// Length of the client's challenge response.
pub const RESPONSE_LEN: usize = 32;

// ============================================
// HandshakePhase
// ============================================

/// Server-side handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakePhase {
    /// Waiting for the client's identity.
    AwaitIdentity,
    /// Challenge sent, waiting for the response.
    AwaitResponse,
    /// Handshake complete; address negotiation may begin.
    Established,
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitIdentity => "await_identity",
            Self::AwaitResponse => "await_response",
            Self::Established => "established",
        };
        f.write_str(name)
    }
}

// ============================================
// Identity
// ============================================

/// Identity asserted by a client (its device name by default).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Creates an identity after validating its length.
    ///
    /// # Errors
    /// `MalformedMessage` if empty, longer than [`MAX_IDENTITY_LEN`]
    /// bytes, or containing whitespace (keyfile entries are
    /// whitespace-separated).
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(CoreError::malformed("identity is empty"));
        }
        if value.len() > MAX_IDENTITY_LEN {
            return Err(CoreError::malformed(format!(
                "identity exceeds {MAX_IDENTITY_LEN} bytes"
            )));
        }
        if value.chars().any(char::is_whitespace) {
            return Err(CoreError::malformed("identity contains whitespace"));
        }
        Ok(Self(value))
    }

    /// Returns the identity text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================
// ChallengeResponse
// ============================================

/// The client's 32-byte answer to the server's challenge.
#[derive(Clone, PartialEq, Eq)]
pub struct ChallengeResponse([u8; RESPONSE_LEN]);

impl ChallengeResponse {
    /// Wraps raw response bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; RESPONSE_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw response bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; RESPONSE_LEN] {
        &self.0
    }
}

impl fmt::Debug for ChallengeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChallengeResponse({:02x}{:02x}{:02x}{:02x}...)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Computes the client's response to `challenge`.
#[must_use]
pub fn challenge_response(challenge: &[u8]) -> ChallengeResponse {
    let digest = Sha256::digest(challenge);
    let mut out = [0u8; RESPONSE_LEN];
    out.copy_from_slice(&digest);
    ChallengeResponse(out)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_validation() {
        assert!(Identity::new("tun0").is_ok());
        assert!(Identity::new("").is_err());
        assert!(Identity::new("a".repeat(MAX_IDENTITY_LEN + 1)).is_err());
        assert!(Identity::new("two words").is_err());
    }

    #[test]
    fn test_challenge_response_deterministic() {
        let a = challenge_response(b"tun0");
        let b = challenge_response(b"tun0");
        let c = challenge_response(b"tun1");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_bytes().len(), RESPONSE_LEN);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(HandshakePhase::AwaitIdentity.to_string(), "await_identity");
        assert_eq!(HandshakePhase::AwaitResponse.to_string(), "await_response");
    }
}
