// ============================================
// File: crates/streamvpn-server/src/services/handshake.rs
// ============================================
//! # Session Handshake
//!
//! ## Creation Reason
//! Every connection starts with an identity exchange before any tunnel
//! unit is accepted.
//!
//! ## Handshake Flow
//! ```text
//!  client                                   server
//!    │ ── frame: identity ("tun0") ──────────► │  AwaitIdentity
//!    │                                         │  keyfile lookup (logged only)
//!    │ ◄───────────── frame: challenge ─────── │  identity echoed verbatim
//!    │ ── frame: 32-byte response ───────────► │  AwaitResponse
//!    │                                         │  Established
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - SECURITY GAP: the response is never verified. Any 32 bytes are
//!   accepted and the keyfile result does not gate anything. Real
//!   authentication must replace this phase, not be layered after it.
//! - Each wait is bounded by the handshake timeout; a timeout or a
//!   malformed message ends the connection before it is registered
//!
//! ## Last Modified
//! v0.1.0 - Initial handshake

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use streamvpn_core::protocol::{ChallengeResponse, Codec, HandshakePhase, Identity, ProtocolCodec};
use streamvpn_transport::{FramedReader, FramedWriter};

use crate::error::{Result, ServerError};
use crate::keyfile::{KeyLookup, Keyfile};

/// Result of a completed handshake.
#[derive(Debug, Clone)]
pub struct HandshakeOutcome {
    /// Identity the client asserted.
    pub identity: Identity,
}

/// Server side of the identity/challenge exchange.
#[derive(Debug, Clone)]
pub struct SessionHandshake {
    keyfile: Arc<Keyfile>,
    timeout: Duration,
}

impl SessionHandshake {
    /// Creates a handshake driver.
    ///
    /// # Arguments
    /// * `keyfile` - Identity/secret table consulted for every client
    /// * `timeout` - Bound on each individual wait
    #[must_use]
    pub fn new(keyfile: Arc<Keyfile>, timeout: Duration) -> Self {
        Self { keyfile, timeout }
    }

    /// Runs the handshake to `Established`.
    ///
    /// # Errors
    /// - `HandshakeTimeout`: a phase did not complete in time
    /// - `HandshakeProtocol`: EOF, bad framing or a malformed message
    /// - `Transport`: the challenge could not be written
    pub async fn run<R, W>(
        &self,
        reader: &mut FramedReader<R>,
        writer: &mut FramedWriter<W>,
        peer: SocketAddr,
    ) -> Result<HandshakeOutcome>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut phase = HandshakePhase::AwaitIdentity;

        let mut frame = self.receive(reader, phase).await?;
        let challenge = frame.clone();
        let identity: Identity = ProtocolCodec
            .decode(&mut frame)
            .map_err(|e| ServerError::handshake_protocol(phase, e.to_string()))?;

        let known_identity = match self.keyfile.lookup(identity.as_str()) {
            KeyLookup::Found(_) => {
                debug!(peer = %peer, identity = %identity, "Identity found in keyfile");
                true
            }
            KeyLookup::NotFound => {
                debug!(peer = %peer, identity = %identity, "Identity not in keyfile");
                false
            }
        };

        tokio::time::timeout(self.timeout, writer.send(&challenge))
            .await
            .map_err(|_| ServerError::HandshakeTimeout { phase })??;
        phase = HandshakePhase::AwaitResponse;

        let mut frame = self.receive(reader, phase).await?;
        let _response: ChallengeResponse = ProtocolCodec
            .decode(&mut frame)
            .map_err(|e| ServerError::handshake_protocol(phase, e.to_string()))?;

        warn!(
            peer = %peer,
            identity = %identity,
            "Challenge response accepted without verification (security gap)"
        );

        phase = HandshakePhase::Established;
        info!(peer = %peer, identity = %identity, known_identity, %phase, "Handshake complete");

        Ok(HandshakeOutcome { identity })
    }

    async fn receive<R>(&self, reader: &mut FramedReader<R>, phase: HandshakePhase) -> Result<Bytes>
    where
        R: AsyncRead + Unpin,
    {
        match tokio::time::timeout(self.timeout, reader.next_frame()).await {
            Err(_) => Err(ServerError::HandshakeTimeout { phase }),
            Ok(Ok(Some(frame))) => Ok(frame),
            Ok(Ok(None)) => Err(ServerError::handshake_protocol(
                phase,
                "connection closed during handshake",
            )),
            Ok(Err(e)) => Err(ServerError::handshake_protocol(phase, e.to_string())),
        }
    }
}

// ============================================
// Tests
// ============================================
