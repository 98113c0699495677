// ============================================
// File: crates/streamvpn-transport/src/tcp.rs
// ============================================
//! # TCP Tunnel Sockets
//!
//! ## Creation Reason
//! The tunnel runs over one TCP connection per client. This module
//! builds the listening socket (with `SO_REUSEADDR` so the server can
//! restart immediately) and the client's outbound connection.
//!
//! ## Socket Options
//! - Listener: `SO_REUSEADDR`, non-blocking, backlog 1024
//! - Streams: `TCP_NODELAY` (units are small and latency-sensitive),
//!   `SO_KEEPALIVE` as a backstop to the in-band keepalive
//!
//! ## Last Modified
//! v0.1.0 - Initial TCP transport

use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Listen backlog for the tunnel socket.
const LISTEN_BACKLOG: i32 = 1024;

/// Binds the tunnel listener.
///
/// # Errors
/// - `BindFailed`: if the socket cannot be bound or put in listening mode
pub fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| TransportError::io("creating TCP socket", e))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| TransportError::io("setting SO_REUSEADDR", e))?;

    socket
        .set_nonblocking(true)
        .map_err(|e| TransportError::io("setting non-blocking", e))?;

    socket
        .bind(&addr.into())
        .map_err(|e| TransportError::bind_failed(addr, e.to_string()))?;

    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|e| TransportError::bind_failed(addr, format!("listen failed: {e}")))?;

    let std_listener: std::net::TcpListener = socket.into();
    let listener = TcpListener::from_std(std_listener)
        .map_err(|e| TransportError::io("converting to Tokio listener", e))?;

    let local = listener
        .local_addr()
        .map_err(|e| TransportError::io("getting local address", e))?;
    info!("Tunnel listener bound to {}", local);

    Ok(listener)
}

/// Connects to the tunnel server at `target` (`host:port`).
///
/// # Errors
/// - `InvalidAddress`: if `target` does not resolve
/// - `Timeout`: if no connection is established within `timeout`
/// - `ConnectFailed`: if every resolved address refused
pub async fn connect(target: &str, timeout: Duration) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(target)
        .await
        .map_err(|_| TransportError::InvalidAddress {
            addr: target.to_string(),
        })?
        .collect();

    if addrs.is_empty() {
        return Err(TransportError::InvalidAddress {
            addr: target.to_string(),
        });
    }

    let mut last_error = String::from("no address attempted");
    for addr in addrs {
        debug!("Connecting to {}", addr);
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                configure_stream(&stream)?;
                return Ok(stream);
            }
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => {
                return Err(TransportError::Timeout {
                    operation: format!("connect to {addr}"),
                })
            }
        }
    }

    Err(TransportError::connect_failed(target, last_error))
}

/// Applies per-connection socket options.
///
/// # Errors
/// Returns `Io` if an option cannot be set.
pub fn configure_stream(stream: &TcpStream) -> Result<()> {
    stream
        .set_nodelay(true)
        .map_err(|e| TransportError::io("setting TCP_NODELAY", e))?;
    SockRef::from(stream)
        .set_keepalive(true)
        .map_err(|e| TransportError::io("setting SO_KEEPALIVE", e))?;
    Ok(())
}

// ============================================
// Tests
// ============================================
