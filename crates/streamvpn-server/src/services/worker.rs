// ============================================
// File: crates/streamvpn-server/src/services/worker.rs
// ============================================
//! # Connection Worker
//!
//! ## Creation Reason
//! One task per accepted connection owns that connection's socket for
//! its whole life: handshake, address negotiation, forwarding, keepalive
//! and teardown.
//!
//! ## Main Logical Flow
//! ```text
//! accept ──► handshake ──► register ──► ┌──────── select! ────────┐
//!                                       │ inbound frame           │──► classify ─┬─ keepalive: echo/consume
//!                                       │ outbound queue          │              ├─ address request: lease + reply
//!                                       │ idle deadline           │              ├─ static request: claim + reply
//!                                       │ shutdown broadcast      │              └─ data: route to peer queue
//!                                       └────────────┬────────────┘
//!                                                    ▼
//!                                   teardown (exactly once) ──► close
//! ```
//!
//! ## Error Handling
//! - `PoolExhausted`: logged, no reply, session continues
//! - `AddressInUse` / `AddressOutOfRange` on a static request: the
//!   session is torn down without a reply
//! - A full or closed peer queue drops the unit; the sender's own
//!   session is unaffected
//! - Framing, transport and keepalive errors end this session only
//!
//! ## ⚠️ Important Note for Next Developer
//! - Only this task ever writes to its socket. Other workers reach it
//!   through the outbound queue registered in the `SessionRegistry`.
//! - `FramedReader::next_frame` is cancel-safe; `FramedWriter::send` is
//!   only ever awaited inside a branch body, never raced
//!
//! ## Last Modified
//! v0.1.0 - Initial connection worker

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use streamvpn_common::time::AtomicInstant;
use streamvpn_common::SessionId;
use streamvpn_core::protocol::{classify, ProtocolCodec, TunnelHeader, UnitKind};
use streamvpn_core::{KeepaliveAction, KeepaliveMonitor, ProbeDecision};
use streamvpn_transport::{framed_split, FramedReader, FramedWriter};

use crate::config::LimitsConfig;
use crate::error::{Result, ServerError};
use crate::services::handshake::SessionHandshake;
use crate::services::registry::SessionRegistry;

// ============================================
// WorkerSettings
// ============================================

/// Timing and sizing knobs shared by every worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Quiet period before the first keepalive probe.
    pub idle_timeout: Duration,
    /// Wait between probes.
    pub keepalive_retry_delay: Duration,
    /// Unanswered probes before the session expires.
    pub keepalive_max_probes: u32,
    /// Largest accepted frame.
    pub max_frame_size: usize,
    /// Depth of each session's outbound queue.
    pub outbound_queue: usize,
}

impl WorkerSettings {
    /// Derives worker settings from the `[limits]` section.
    #[must_use]
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            idle_timeout: limits.idle_timeout(),
            keepalive_retry_delay: limits.keepalive_retry_delay(),
            keepalive_max_probes: limits.keepalive_max_probes,
            max_frame_size: limits.max_frame_size,
            outbound_queue: limits.outbound_queue,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_limits(&LimitsConfig::default())
    }
}

/// Per-session unit counters, logged at teardown.
#[derive(Debug, Default, Clone, Copy)]
struct UnitStats {
    received: u64,
    forwarded: u64,
    dropped: u64,
    delivered: u64,
}

// ============================================
// ConnectionWorker
// ============================================

/// Drives one client connection from accept to teardown.
#[derive(Debug, Clone)]
pub struct ConnectionWorker {
    registry: Arc<SessionRegistry>,
    handshake: SessionHandshake,
    settings: WorkerSettings,
}

/// Mutable state of one running session.
struct SessionState {
    id: SessionId,
    peer: SocketAddr,
    lease: Option<Ipv4Addr>,
    activity: Arc<AtomicInstant>,
    keepalive: KeepaliveMonitor,
    stats: UnitStats,
}

impl ConnectionWorker {
    /// Creates a worker template; clone it per connection.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        handshake: SessionHandshake,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            registry,
            handshake,
            settings,
        }
    }

    /// Serves one connection until it closes, fails or the server stops.
    ///
    /// The session is registered after a successful handshake and torn
    /// down exactly once before this returns.
    ///
    /// # Errors
    /// Returns the error that ended the session; `Ok(())` for an orderly
    /// close or server shutdown.
    pub async fn run<S>(
        &self,
        stream: S,
        peer: SocketAddr,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send,
    {
        let (mut reader, mut writer) = framed_split(stream, self.settings.max_frame_size);

        let outcome = tokio::select! {
            outcome = self.handshake.run(&mut reader, &mut writer, peer) => outcome.map_err(|e| {
                warn!(peer = %peer, error = %e, "Handshake failed");
                e
            })?,
            _ = shutdown.recv() => return Ok(()),
        };

        let (outbound_tx, outbound_rx) = mpsc::channel(self.settings.outbound_queue);
        let activity = Arc::new(AtomicInstant::now());
        let id = self.registry.register(peer, outbound_tx, Arc::clone(&activity)).map_err(|e| {
            warn!(peer = %peer, error = %e, "Session rejected");
            e
        })?;
        info!(session_id = %id, peer = %peer, identity = %outcome.identity, "Session established");

        let mut state = SessionState {
            id,
            peer,
            lease: None,
            activity,
            keepalive: KeepaliveMonitor::new(
                self.settings.idle_timeout,
                self.settings.keepalive_retry_delay,
                self.settings.keepalive_max_probes,
                Instant::now(),
            ),
            stats: UnitStats::default(),
        };

        let result = self
            .forward(&mut state, &mut reader, &mut writer, outbound_rx, &mut shutdown)
            .await;

        self.registry.teardown(id);
        if let Err(e) = writer.shutdown().await {
            trace!(session_id = %id, "Shutdown after teardown failed: {}", e);
        }

        match &result {
            Ok(()) => info!(
                session_id = %id,
                received = state.stats.received,
                forwarded = state.stats.forwarded,
                delivered = state.stats.delivered,
                dropped = state.stats.dropped,
                "Session closed"
            ),
            Err(e) => warn!(session_id = %id, peer = %state.peer, error = %e, "Session ended with error"),
        }
        result
    }

    async fn forward<R, W>(
        &self,
        state: &mut SessionState,
        reader: &mut FramedReader<R>,
        writer: &mut FramedWriter<W>,
        mut outbound: mpsc::Receiver<Bytes>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let deadline = tokio::time::Instant::from_std(state.keepalive.deadline());

            tokio::select! {
                frame = reader.next_frame() => {
                    let Some(unit) = frame? else {
                        debug!(session_id = %state.id, "Peer closed connection");
                        return Ok(());
                    };
                    state.stats.received += 1;
                    state.activity.touch();
                    self.handle_unit(state, unit, writer).await?;
                }
                Some(unit) = outbound.recv() => {
                    writer.send(&unit).await?;
                    state.stats.delivered += 1;
                }
                () = tokio::time::sleep_until(deadline) => {
                    match state.keepalive.on_deadline(Instant::now()) {
                        ProbeDecision::SendProbe { attempt } => {
                            debug!(session_id = %state.id, attempt, "Sending keepalive probe");
                            writer.send(&ProtocolCodec::encode_header(&TunnelHeader::keepalive())).await?;
                        }
                        ProbeDecision::Expired => {
                            return Err(ServerError::KeepaliveTimeout {
                                probes: self.settings.keepalive_max_probes,
                            });
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!(session_id = %state.id, "Closing session for server shutdown");
                    return Ok(());
                }
            }
        }
    }

    async fn handle_unit<W>(
        &self,
        state: &mut SessionState,
        unit: Bytes,
        writer: &mut FramedWriter<W>,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let now = Instant::now();

        match classify(&unit) {
            UnitKind::Keepalive => match state.keepalive.on_keepalive(now) {
                KeepaliveAction::Echo => {
                    trace!(session_id = %state.id, "Echoing keepalive");
                    writer.send(&unit).await?;
                }
                KeepaliveAction::Consume => {
                    trace!(session_id = %state.id, "Keepalive probe answered");
                }
            },

            UnitKind::AddressRequest => {
                state.keepalive.record_activity(now);
                match self.registry.assign_dynamic(state.id) {
                    Ok(addr) => {
                        state.lease = Some(addr);
                        self.reply_with_lease(&unit, addr, writer).await?;
                    }
                    Err(ServerError::PoolExhausted) => {
                        warn!(session_id = %state.id, "No free address for dynamic request");
                    }
                    Err(e) => return Err(e),
                }
            }

            UnitKind::StaticRequest(requested) => {
                state.keepalive.record_activity(now);
                match self.registry.claim_static(state.id, requested) {
                    Ok(addr) => {
                        state.lease = Some(addr);
                        self.reply_with_lease(&unit, addr, writer).await?;
                    }
                    Err(e) => {
                        warn!(session_id = %state.id, virtual_ip = %requested, error = %e, "Static request rejected");
                        return Err(e);
                    }
                }
            }

            UnitKind::Data { destination } => {
                state.keepalive.record_activity(now);
                self.route(state, destination, unit);
            }

            UnitKind::Handshake => {
                state.keepalive.record_activity(now);
                state.stats.dropped += 1;
                debug!(session_id = %state.id, len = unit.len(), "Dropping short unit");
            }
        }

        Ok(())
    }

    async fn reply_with_lease<W>(
        &self,
        request: &[u8],
        addr: Ipv4Addr,
        writer: &mut FramedWriter<W>,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let reply = ProtocolCodec::decode_header(request)?.into_address_reply(addr);
        writer.send(&ProtocolCodec::encode_header(&reply)).await?;
        Ok(())
    }

    /// Hands a data unit to the worker owning `destination`.
    fn route(&self, state: &mut SessionState, destination: Ipv4Addr, unit: Bytes) {
        if state.lease.is_none() {
            state.stats.dropped += 1;
            debug!(session_id = %state.id, destination = %destination, "Dropping data from unaddressed session");
            return;
        }

        let Some(peer_queue) = self.registry.lookup_route(destination) else {
            state.stats.dropped += 1;
            trace!(session_id = %state.id, destination = %destination, "No route, dropping");
            return;
        };

        match peer_queue.try_send(unit) {
            Ok(()) => {
                state.stats.forwarded += 1;
                trace!(session_id = %state.id, destination = %destination, "Unit forwarded");
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                state.stats.dropped += 1;
                debug!(session_id = %state.id, destination = %destination, "Peer queue full, dropping");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                state.stats.dropped += 1;
                debug!(session_id = %state.id, destination = %destination, "Peer queue closed, dropping");
            }
        }
    }
}

// ============================================
// Tests
// ============================================
