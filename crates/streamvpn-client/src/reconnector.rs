// ============================================
// File: crates/streamvpn-client/src/reconnector.rs
// ============================================
//! # Client Reconnector
//!
//! ## Creation Reason
//! Keeps the client's tunnel up: connects, authenticates, negotiates a
//! virtual address, forwards packets between the TUN device and the
//! server, and reconnects with backoff when the connection drops.
//!
//! ## State Machine
//! ```text
//!  Connecting ──► Handshaking ──► Negotiating ──► Forwarding
//!      ▲                                              │
//!      │            connection lost / timeout         │
//!      └──────────── Reconnecting { attempt } ◄───────┘
//! ```
//!
//! ## Main Functionality
//! - `Backoff`: capped exponential delay between attempts
//! - `ClientReconnector`: drives the state machine until shutdown or a
//!   fatal error
//!
//! ## ⚠️ Important Note for Next Developer
//! - Once an address has been negotiated it is never forgotten: every
//!   reconnect sends a static request for it
//! - A static rejection is terminal only if no address was ever
//!   negotiated; after a reconnect the server may still hold the stale
//!   session, so the attempt is retried under backoff
//! - The TUN address is only reconfigured when it actually changes
//!
//! ## Last Modified
//! v0.1.0 - Initial reconnector implementation

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use streamvpn_core::protocol::{
    challenge_response, classify, Identity, ProtocolCodec, TunnelHeader, UnitKind, HEADER_LEN,
    MAX_FRAME_SIZE,
};
use streamvpn_core::{KeepaliveAction, KeepaliveMonitor, ProbeDecision};
use streamvpn_transport::tcp;
use streamvpn_transport::{framed_split, FramedReader, FramedWriter, TunDevice};

use crate::config::{ClientConfig, ReconnectSection};
use crate::error::{ClientError, Result};

// ============================================
// ClientState
// ============================================

/// Where the reconnector currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Opening the TCP connection.
    Connecting,
    /// Exchanging identity and challenge.
    Handshaking,
    /// Waiting for the address reply.
    Negotiating,
    /// Tunnel established, relaying packets.
    Forwarding,
    /// Waiting before the next attempt.
    Reconnecting {
        /// Consecutive failed attempts so far
        attempt: u32,
    },
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Handshaking => f.write_str("handshaking"),
            Self::Negotiating => f.write_str("negotiating"),
            Self::Forwarding => f.write_str("forwarding"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
        }
    }
}

// ============================================
// Backoff
// ============================================

/// Capped exponential backoff: `min(initial * 2^attempt, max)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    limit: Option<u32>,
    attempt: u32,
}

impl Backoff {
    /// Creates a backoff; `limit = None` never runs out.
    #[must_use]
    pub const fn new(initial: Duration, max: Duration, limit: Option<u32>) -> Self {
        Self {
            initial,
            max,
            limit,
            attempt: 0,
        }
    }

    /// Creates a backoff from the `[reconnect]` section.
    #[must_use]
    pub const fn from_config(config: &ReconnectSection) -> Self {
        Self::new(
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
            config.attempt_limit(),
        )
    }

    /// Returns the delay before the next attempt, or `None` once the
    /// attempt limit is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.limit.is_some_and(|limit| self.attempt >= limit) {
            return None;
        }

        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let delay = self.initial.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }

    /// Forgets past failures.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Returns the number of delays handed out since the last reset.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}

// ============================================
// TunnelStats
// ============================================

/// Per-connection packet counters.
#[derive(Debug, Default, Clone, Copy)]
struct TunnelStats {
    to_server: u64,
    to_tun: u64,
    probes: u64,
}

// ============================================
// ClientReconnector
// ============================================

/// Client-side tunnel state machine.
pub struct ClientReconnector<T: TunDevice> {
    config: ClientConfig,
    identity: Identity,
    tun: Arc<T>,
    state: ClientState,
    lease: Option<Ipv4Addr>,
    assigned: Option<Ipv4Addr>,
    backoff: Backoff,
}

impl<T: TunDevice> ClientReconnector<T> {
    /// Creates a reconnector for `tun`.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` if the configured identity is unusable.
    pub fn new(config: ClientConfig, tun: Arc<T>) -> Result<Self> {
        let identity = Identity::new(config.identity())
            .map_err(|e| ClientError::config_invalid("server.identity", e.to_string()))?;
        let backoff = Backoff::from_config(&config.reconnect);

        Ok(Self {
            config,
            identity,
            tun,
            state: ClientState::Connecting,
            lease: None,
            assigned: None,
            backoff,
        })
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> ClientState {
        self.state
    }

    /// Returns the most recently negotiated address.
    #[must_use]
    pub const fn lease(&self) -> Option<Ipv4Addr> {
        self.lease
    }

    /// Runs until `shutdown` fires or a fatal error occurs.
    ///
    /// # Errors
    /// - `AddressInUse`: the first static request was refused
    /// - `ReconnectExhausted`: the attempt limit was reached
    /// - TUN and configuration errors
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        loop {
            let err = match self.connect_once(&mut shutdown).await {
                Ok(()) => {
                    info!("Tunnel client stopped");
                    return Ok(());
                }
                Err(e) => e,
            };

            if !self.should_retry(&err) {
                error!(state = %self.state, error = %err, "Tunnel failed");
                return Err(err);
            }

            let Some(delay) = self.backoff.next_delay() else {
                error!(attempts = self.backoff.attempt(), error = %err, "Reconnect attempts exhausted");
                return Err(ClientError::ReconnectExhausted {
                    attempts: self.backoff.attempt(),
                    last_error: err.to_string(),
                });
            };

            self.state = ClientState::Reconnecting {
                attempt: self.backoff.attempt(),
            };
            warn!(
                error = %err,
                attempt = self.backoff.attempt(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Tunnel connection lost, reconnecting"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("Tunnel client stopped while waiting to reconnect");
                    return Ok(());
                }
            }
        }
    }

    fn should_retry(&self, err: &ClientError) -> bool {
        match err {
            ClientError::AddressInUse(_) => self.lease.is_some(),
            e => e.is_retryable(),
        }
    }

    /// One connection from connect to loss. `Ok(())` means shutdown.
    async fn connect_once(&mut self, shutdown: &mut broadcast::Receiver<()>) -> Result<()> {
        self.state = ClientState::Connecting;
        let target = self.config.server.target();
        let timeout = self.config.timeouts.handshake_timeout();

        let stream = tokio::select! {
            stream = tcp::connect(&target, timeout) => stream?,
            _ = shutdown.recv() => return Ok(()),
        };
        info!(server = %target, "Connected to tunnel server");

        let (mut reader, mut writer) = framed_split(stream, MAX_FRAME_SIZE);

        self.state = ClientState::Handshaking;
        tokio::select! {
            result = self.handshake(&mut reader, &mut writer) => result?,
            _ = shutdown.recv() => return Ok(()),
        }

        self.state = ClientState::Negotiating;
        let requested = self.lease.or(self.config.tunnel.static_address);
        let leased = tokio::select! {
            leased = self.negotiate(requested, &mut reader, &mut writer) => leased?,
            _ = shutdown.recv() => return Ok(()),
        };
        self.apply_lease(leased).await?;

        self.backoff.reset();
        self.state = ClientState::Forwarding;
        info!(virtual_ip = %leased, device = %self.tun.name(), "Tunnel established");

        let mut stats = TunnelStats::default();
        let result = self
            .forward(&mut reader, &mut writer, &mut stats, shutdown)
            .await;

        if let Err(e) = writer.shutdown().await {
            trace!("Socket shutdown failed: {}", e);
        }
        info!(
            to_server = stats.to_server,
            to_tun = stats.to_tun,
            probes = stats.probes,
            "Tunnel connection closed"
        );
        result
    }

    // ========================================
    // Handshake and negotiation
    // ========================================

    async fn handshake<R, W>(
        &self,
        reader: &mut FramedReader<R>,
        writer: &mut FramedWriter<W>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        writer.send(self.identity.as_str().as_bytes()).await?;

        let challenge = match tokio::time::timeout(
            self.config.timeouts.handshake_timeout(),
            reader.next_frame(),
        )
        .await
        {
            Err(_) => return Err(ClientError::HandshakeTimeout { step: "challenge" }),
            Ok(frame) => frame?.ok_or_else(|| {
                ClientError::handshake_protocol("server closed the connection during the handshake")
            })?,
        };

        if challenge.as_ref() != self.identity.as_str().as_bytes() {
            debug!(len = challenge.len(), "Challenge differs from the identity sent");
        }

        writer.send(challenge_response(&challenge).as_bytes()).await?;
        debug!(identity = %self.identity, "Handshake complete");
        Ok(())
    }

    async fn negotiate<R, W>(
        &self,
        requested: Option<Ipv4Addr>,
        reader: &mut FramedReader<R>,
        writer: &mut FramedWriter<W>,
    ) -> Result<Ipv4Addr>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let request = requested.map_or_else(TunnelHeader::address_request, TunnelHeader::static_request);
        writer.send(&ProtocolCodec::encode_header(&request)).await?;
        match requested {
            Some(addr) => debug!(virtual_ip = %addr, "Static address requested"),
            None => debug!("Dynamic address requested"),
        }

        let timeout = self.config.timeouts.handshake_timeout();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let frame = tokio::time::timeout_at(deadline, reader.next_frame())
                .await
                .map_err(|_| ClientError::NegotiationTimeout {
                    timeout_secs: timeout.as_secs(),
                })??;

            let Some(unit) = frame else {
                return Err(requested.map_or(ClientError::ConnectionClosed, ClientError::AddressInUse));
            };

            match classify(&unit) {
                UnitKind::Keepalive => writer.send(&unit).await?,
                UnitKind::Data { destination } if unit.len() == HEADER_LEN => {
                    let reply = ProtocolCodec::decode_header(&unit)?;
                    if !reply.source_addr().is_unspecified() {
                        debug!("Ignoring non-reply control unit during negotiation");
                        continue;
                    }
                    if let Some(addr) = requested {
                        if addr != destination {
                            return Err(ClientError::handshake_protocol(format!(
                                "requested {addr}, server replied {destination}"
                            )));
                        }
                    }
                    return Ok(destination);
                }
                other => debug!(kind = ?other, len = unit.len(), "Ignoring unit during negotiation"),
            }
        }
    }

    /// Configures the TUN device for `leased` if it changed.
    async fn apply_lease(&mut self, leased: Ipv4Addr) -> Result<()> {
        if self.assigned != Some(leased) {
            let host_route = self.config.tunnel.static_address.is_some();
            self.tun
                .assign_address(leased, self.config.tunnel.netmask, host_route)
                .await?;
            self.assigned = Some(leased);
            info!(
                virtual_ip = %leased,
                netmask = %self.config.tunnel.netmask,
                host_route,
                "Virtual address assigned"
            );
        } else {
            debug!(virtual_ip = %leased, "Address unchanged, keeping interface configuration");
        }

        if !self.tun.is_up() {
            self.tun.up().await?;
        }

        self.lease = Some(leased);
        Ok(())
    }

    // ========================================
    // Forwarding
    // ========================================

    async fn forward<R, W>(
        &self,
        reader: &mut FramedReader<R>,
        writer: &mut FramedWriter<W>,
        stats: &mut TunnelStats,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let timeouts = &self.config.timeouts;
        let mut keepalive = KeepaliveMonitor::new(
            timeouts.idle_timeout(),
            timeouts.keepalive_retry_delay(),
            timeouts.keepalive_max_probes,
            Instant::now(),
        );
        let mut buf = vec![0u8; MAX_FRAME_SIZE];

        loop {
            let deadline = tokio::time::Instant::from_std(keepalive.deadline());

            tokio::select! {
                read = self.tun.read(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        continue;
                    }
                    writer.send(&buf[..n]).await?;
                    stats.to_server += 1;
                    trace!(len = n, "Packet sent to server");
                }
                frame = reader.next_frame() => {
                    let Some(unit) = frame? else {
                        debug!("Server closed connection");
                        return Err(ClientError::ConnectionClosed);
                    };
                    self.handle_unit(unit, &mut keepalive, writer, stats).await?;
                }
                () = tokio::time::sleep_until(deadline) => {
                    match keepalive.on_deadline(Instant::now()) {
                        ProbeDecision::SendProbe { attempt } => {
                            debug!(attempt, "Sending keepalive probe");
                            writer.send(&ProtocolCodec::encode_header(&TunnelHeader::keepalive())).await?;
                            stats.probes += 1;
                        }
                        ProbeDecision::Expired => {
                            return Err(ClientError::KeepaliveTimeout {
                                probes: timeouts.keepalive_max_probes,
                            });
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down tunnel");
                    return Ok(());
                }
            }
        }
    }

    async fn handle_unit<W>(
        &self,
        unit: Bytes,
        keepalive: &mut KeepaliveMonitor,
        writer: &mut FramedWriter<W>,
        stats: &mut TunnelStats,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let now = Instant::now();

        match classify(&unit) {
            UnitKind::Keepalive => match keepalive.on_keepalive(now) {
                KeepaliveAction::Echo => {
                    trace!("Echoing keepalive");
                    writer.send(&unit).await?;
                }
                KeepaliveAction::Consume => trace!("Keepalive probe answered"),
            },
            UnitKind::Data { .. } => {
                keepalive.record_activity(now);
                self.tun.write(&unit).await?;
                stats.to_tun += 1;
            }
            other => {
                keepalive.record_activity(now);
                debug!(kind = ?other, len = unit.len(), "Ignoring control unit");
            }
        }

        Ok(())
    }
}

impl<T: TunDevice> fmt::Debug for ClientReconnector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientReconnector")
            .field("server", &self.config.server.address)
            .field("identity", &self.identity.as_str())
            .field("state", &self.state)
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}

// ============================================
// Unit Tests
// ============================================
