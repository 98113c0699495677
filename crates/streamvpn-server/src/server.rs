// ============================================
// File: crates/streamvpn-server/src/server.rs
// ============================================
//! # Tunnel Server
//!
//! ## Creation Reason
//! Owns the listening socket and the shared session registry, and spawns
//! one [`ConnectionWorker`] per accepted connection.
//!
//! ## Main Functionality
//! - `Server`: lifecycle (bind, serve, shutdown)
//! - Periodic stats task reporting session and pool usage
//!
//! ## Lifecycle
//! ```text
//! new(config) ──► run() ──► bind ──► serve(listener) ──► Ctrl+C / shutdown()
//!                                        │
//!                                        ├── accept loop ──► spawn worker
//!                                        └── stats task
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Startup errors (keyfile, empty pool, bind) are returned to the caller;
//!   everything after that is per-session and only logged
//! - Workers get their own shutdown receiver, subscribed before spawn
//!
//! ## Last Modified
//! v0.1.0 - Initial server implementation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use streamvpn_transport::tcp::{bind_listener, configure_stream};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::keyfile::Keyfile;
use crate::services::{
    AddressPool, ConnectionWorker, SessionHandshake, SessionRegistry, WorkerSettings,
};

/// Interval between usage reports.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// How long shutdown waits for workers to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Back-off after a failed `accept`.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

// ============================================
// Server
// ============================================

/// The tunnel server.
pub struct Server {
    config: ServerConfig,
    shutdown_tx: broadcast::Sender<()>,
    stopping: AtomicBool,
}

impl Server {
    /// Creates a server; nothing is bound until [`Self::run`] or [`Self::serve`].
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            shutdown_tx,
            stopping: AtomicBool::new(false),
        }
    }

    /// Returns the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the configured listen address.
    ///
    /// # Errors
    /// Returns `StartupFailed` if the address cannot be bound.
    pub fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.network.listen_addr;
        bind_listener(addr)
            .map_err(|e| ServerError::startup_failed(format!("cannot listen on {addr}: {e}")))
    }

    /// Binds, serves and stops on Ctrl+C.
    ///
    /// # Errors
    /// Returns startup errors; see [`Self::serve`].
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind()?;

        let serve = self.serve(listener);
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => result,
            () = wait_for_ctrl_c() => {
                info!("Received shutdown signal");
                self.shutdown();
                serve.await
            }
        }
    }

    /// Serves connections on `listener` until [`Self::shutdown`] is called.
    ///
    /// # Errors
    /// Returns `Keyfile` if the keyfile cannot be loaded and
    /// `StartupFailed` if the configured range leaves no leasable address.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if self.stopping.load(Ordering::SeqCst) {
            return Ok(());
        }

        let registry = Arc::new(self.build_registry()?);
        let keyfile = Arc::new(self.load_keyfile().await?);
        let worker = ConnectionWorker::new(
            Arc::clone(&registry),
            SessionHandshake::new(keyfile, self.config.limits.handshake_timeout()),
            WorkerSettings::from_limits(&self.config.limits),
        );

        let local_addr = listener
            .local_addr()
            .map_or_else(|_| "unknown".to_string(), |a| a.to_string());
        info!(
            listen = %local_addr,
            network = %self.config.vpn.virtual_ip_range,
            gateway = %self.config.vpn.gateway_ip,
            available = registry.available_addresses(),
            max_sessions = self.config.limits.max_sessions,
            "Server started"
        );

        let stats_task = self.spawn_stats_task(Arc::clone(&registry));
        let mut workers: JoinSet<Result<()>> = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = configure_stream(&stream) {
                            warn!(peer = %peer, error = %e, "Failed to configure socket");
                        }
                        debug!(peer = %peer, "Accepted connection");
                        let worker = worker.clone();
                        let shutdown = self.shutdown_tx.subscribe();
                        workers.spawn(async move { worker.run(stream, peer, shutdown).await });
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    log_worker_exit(joined);
                }
                _ = shutdown_rx.recv() => {
                    debug!("Accept loop stopping");
                    break;
                }
            }
        }

        drop(listener);
        drain_workers(&mut workers).await;
        let _ = stats_task.await;

        info!(
            sessions = registry.session_count(),
            available = registry.available_addresses(),
            "Server stopped"
        );
        Ok(())
    }

    /// Signals the accept loop, the stats task and every worker to stop.
    pub fn shutdown(&self) {
        info!("Initiating server shutdown");
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    // ========================================
    // Startup helpers
    // ========================================

    fn build_registry(&self) -> Result<SessionRegistry> {
        let vpn = &self.config.vpn;
        let pool = AddressPool::seed(
            vpn.virtual_ip_range,
            vpn.effective_range_end(),
            Some(vpn.gateway_ip),
        );

        if pool.available() == 0 {
            return Err(ServerError::startup_failed(format!(
                "no leasable addresses in {} up to {}",
                vpn.virtual_ip_range,
                vpn.effective_range_end()
            )));
        }

        Ok(SessionRegistry::new(pool, self.config.limits.max_sessions))
    }

    async fn load_keyfile(&self) -> Result<Keyfile> {
        match &self.config.keyfile.path {
            Some(path) => Keyfile::load(path).await,
            None => {
                info!("No keyfile configured; identities will not be looked up");
                Ok(Keyfile::empty())
            }
        }
    }

    fn spawn_stats_task(&self, registry: Arc<SessionRegistry>) -> tokio::task::JoinHandle<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(STATS_INTERVAL);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let sessions = registry.snapshot();
                        let leased = sessions.iter().filter(|s| s.lease.is_some()).count();
                        let max_idle_secs = sessions.iter().map(|s| s.idle.as_secs()).max().unwrap_or(0);
                        info!(
                            sessions = sessions.len(),
                            leased,
                            available = registry.available_addresses(),
                            max_idle_secs,
                            "Server stats"
                        );
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Stats task stopping");
                        break;
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listen_addr", &self.config.network.listen_addr)
            .field("network", &self.config.vpn.virtual_ip_range)
            .field("stopping", &self.stopping.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// ============================================
// Helper Functions
// ============================================

async fn drain_workers(workers: &mut JoinSet<Result<()>>) {
    if workers.is_empty() {
        return;
    }

    debug!(remaining = workers.len(), "Waiting for workers");
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while let Some(joined) = workers.join_next().await {
            log_worker_exit(joined);
        }
    })
    .await;

    if drained.is_err() {
        warn!(remaining = workers.len(), "Workers did not stop in time; aborting");
        workers.abort_all();
    }
}

fn log_worker_exit(joined: std::result::Result<Result<()>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.is_fatal() => error!(error = %e, "Worker failed"),
        Ok(Err(e)) => debug!(error = %e, "Worker ended with error"),
        Err(e) if e.is_cancelled() => {}
        Err(e) => error!(error = %e, "Worker panicked"),
    }
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

// ============================================
// Unit Tests
// ============================================
