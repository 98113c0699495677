// ============================================
// File: crates/streamvpn-server/src/services/registry.rs
// ============================================
//! # Session Registry
//!
//! ## Creation Reason
//! The only state shared between connection workers: which sessions
//! exist, which virtual address each one holds, and how to reach the
//! worker that owns a given address.
//!
//! ## Main Functionality
//! - `register` / `teardown`: session lifetime
//! - `assign_dynamic` / `claim_static`: address negotiation
//! - `lookup_route`: destination address → owning worker's queue
//! - `snapshot`: per-session lease, age and idle time for the stats task
//!
//! ## Locking
//! ```text
//! ┌──────────────── Mutex<RegistryInner> ────────────────┐
//! │  AddressPool        sessions            routes       │
//! │  (free set)   HashMap<SessionId,   HashMap<Ipv4Addr, │
//! │               SessionEntry>        SessionId>        │
//! └──────────────────────────────────────────────────────┘
//! ```
//! One lock covers all three so an observer never sees an address that is
//! both leased and free. Forwarding only clones the peer's sender under
//! the lock; the send itself happens outside it.
//!
//! ## ⚠️ Important Note for Next Developer
//! - `teardown` must be called exactly once per session, by the worker
//!   that registered it. A second call returns `None` and does nothing.
//! - Never hold the guard across an `.await`
//! - The activity stamp is shared with the owning worker, which updates
//!   it without locking; only `snapshot` reads it under the lock
//!
//! ## Last Modified
//! v0.1.0 - Initial session registry

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use streamvpn_common::time::AtomicInstant;
use streamvpn_common::SessionId;

use crate::error::{Result, ServerError};
use crate::services::address_pool::AddressPool;

// ============================================
// SessionEntry
// ============================================

/// Registry-side state of one connected client.
struct SessionEntry {
    peer: SocketAddr,
    lease: Option<Ipv4Addr>,
    outbound: mpsc::Sender<Bytes>,
    connected_at: Instant,
    last_activity: Arc<AtomicInstant>,
}

/// Point-in-time view of a session, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Session identifier
    pub id: SessionId,
    /// Peer's real address
    pub peer: SocketAddr,
    /// Leased virtual address, if negotiated
    pub lease: Option<Ipv4Addr>,
    /// Time since the session was registered
    pub age: Duration,
    /// Time since the last inbound unit
    pub idle: Duration,
}

struct RegistryInner {
    pool: AddressPool,
    sessions: HashMap<SessionId, SessionEntry>,
    routes: HashMap<Ipv4Addr, SessionId>,
}

impl RegistryInner {
    /// Points `addr` at `id`, releasing `id`'s previous lease if different.
    fn bind_lease(&mut self, id: SessionId, addr: Ipv4Addr) -> Result<()> {
        let entry = self
            .sessions
            .get_mut(&id)
            .ok_or(ServerError::SessionNotFound(id))?;

        if let Some(previous) = entry.lease.replace(addr) {
            if previous != addr {
                self.routes.remove(&previous);
                self.pool.release(previous);
            }
        }
        self.routes.insert(addr, id);
        Ok(())
    }
}

// ============================================
// SessionRegistry
// ============================================

/// Active sessions and the address pool, behind one lock.
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    max_sessions: usize,
}

impl SessionRegistry {
    /// Creates a registry owning `pool`.
    #[must_use]
    pub fn new(pool: AddressPool, max_sessions: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                pool,
                sessions: HashMap::new(),
                routes: HashMap::new(),
            }),
            max_sessions,
        }
    }

    /// Registers a new, unaddressed session.
    ///
    /// # Arguments
    /// * `peer` - Client's real address
    /// * `outbound` - Queue drained by the session's own worker
    /// * `activity` - Last-inbound stamp the worker keeps current
    ///
    /// # Errors
    /// Returns `SessionLimitReached` when `max_sessions` are active.
    pub fn register(
        &self,
        peer: SocketAddr,
        outbound: mpsc::Sender<Bytes>,
        activity: Arc<AtomicInstant>,
    ) -> Result<SessionId> {
        let mut inner = self.inner.lock();
        if inner.sessions.len() >= self.max_sessions {
            return Err(ServerError::SessionLimitReached {
                limit: self.max_sessions,
            });
        }

        let mut id = SessionId::generate();
        while inner.sessions.contains_key(&id) {
            id = SessionId::generate();
        }

        inner.sessions.insert(
            id,
            SessionEntry {
                peer,
                lease: None,
                outbound,
                connected_at: Instant::now(),
                last_activity: activity,
            },
        );

        info!(
            session_id = %id,
            peer = %peer,
            active = inner.sessions.len(),
            "Session registered"
        );
        Ok(id)
    }

    /// Leases any free address to `id`, or returns its existing lease.
    ///
    /// # Errors
    /// - `SessionNotFound` if `id` is not registered
    /// - `PoolExhausted` if no address is free
    pub fn assign_dynamic(&self, id: SessionId) -> Result<Ipv4Addr> {
        let mut inner = self.inner.lock();
        let entry = inner
            .sessions
            .get(&id)
            .ok_or(ServerError::SessionNotFound(id))?;

        if let Some(existing) = entry.lease {
            debug!(session_id = %id, virtual_ip = %existing, "Re-supplying existing lease");
            return Ok(existing);
        }

        let addr = inner.pool.allocate_any()?;
        inner.bind_lease(id, addr)?;

        info!(session_id = %id, virtual_ip = %addr, "Dynamic address assigned");
        Ok(addr)
    }

    /// Leases exactly `addr` to `id`.
    ///
    /// A previous, different lease held by `id` is released.
    ///
    /// # Errors
    /// - `SessionNotFound` if `id` is not registered
    /// - `AddressOutOfRange` if the pool would never lease `addr`
    /// - `AddressInUse` if another session holds `addr`
    pub fn claim_static(&self, id: SessionId, addr: Ipv4Addr) -> Result<Ipv4Addr> {
        let mut inner = self.inner.lock();
        let entry = inner
            .sessions
            .get(&id)
            .ok_or(ServerError::SessionNotFound(id))?;

        if entry.lease == Some(addr) {
            return Ok(addr);
        }

        if !inner.pool.is_leasable(addr) {
            return Err(ServerError::AddressOutOfRange(addr));
        }
        if !inner.pool.claim(addr) {
            return Err(ServerError::AddressInUse(addr));
        }
        inner.bind_lease(id, addr)?;

        info!(session_id = %id, virtual_ip = %addr, "Static address claimed");
        Ok(addr)
    }

    /// Returns the outbound queue of the session leasing `addr`.
    #[must_use]
    pub fn lookup_route(&self, addr: Ipv4Addr) -> Option<mpsc::Sender<Bytes>> {
        let inner = self.inner.lock();
        let id = inner.routes.get(&addr)?;
        inner.sessions.get(id).map(|entry| entry.outbound.clone())
    }

    /// Removes `id` and releases its lease.
    ///
    /// # Returns
    /// The released address, or `None` if the session had no lease or
    /// was already gone.
    pub fn teardown(&self, id: SessionId) -> Option<Ipv4Addr> {
        let mut inner = self.inner.lock();
        let entry = inner.sessions.remove(&id)?;

        let mut released = None;
        if let Some(addr) = entry.lease {
            if inner.routes.get(&addr) == Some(&id) {
                inner.routes.remove(&addr);
            }
            if inner.pool.release(addr) {
                released = Some(addr);
            }
        }

        info!(
            session_id = %id,
            peer = %entry.peer,
            virtual_ip = ?entry.lease,
            duration_secs = entry.connected_at.elapsed().as_secs(),
            active = inner.sessions.len(),
            "Session torn down"
        );
        released
    }

    /// Returns the number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Returns the number of free addresses.
    #[must_use]
    pub fn available_addresses(&self) -> usize {
        self.inner.lock().pool.available()
    }

    /// Returns a snapshot of every session.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let inner = self.inner.lock();
        inner
            .sessions
            .iter()
            .map(|(id, entry)| SessionInfo {
                id: *id,
                peer: entry.peer,
                lease: entry.lease,
                age: entry.connected_at.elapsed(),
                idle: entry.last_activity.elapsed(),
            })
            .collect()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SessionRegistry")
            .field("sessions", &inner.sessions.len())
            .field("routes", &inner.routes.len())
            .field("pool", &inner.pool)
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use streamvpn_common::Subnet;

    fn registry(max_sessions: usize) -> SessionRegistry {
        let subnet: Subnet = "10.0.0.0/24".parse().unwrap();
        let pool = AddressPool::seed(subnet, subnet.last(), Some(Ipv4Addr::new(10, 0, 0, 1)));
        SessionRegistry::new(pool, max_sessions)
    }

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 0, 2, 1], port))
    }

    fn session(registry: &SessionRegistry, port: u16) -> (SessionId, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(8);
        let id = registry
            .register(peer(port), tx, Arc::new(AtomicInstant::now()))
            .unwrap();
        (id, rx)
    }

    fn lease_of(registry: &SessionRegistry, id: SessionId) -> Option<Ipv4Addr> {
        registry
            .snapshot()
            .into_iter()
            .find(|info| info.id == id)
            .and_then(|info| info.lease)
    }

    #[test]
    fn test_dynamic_assignment_is_sticky() {
        let registry = registry(10);
        let (id, _rx) = session(&registry, 1000);

        let first = registry.assign_dynamic(id).unwrap();
        assert_eq!(first, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(registry.assign_dynamic(id).unwrap(), first);
        assert_eq!(lease_of(&registry, id), Some(first));
    }

    #[test]
    fn test_teardown_returns_address_for_reuse() {
        let registry = registry(10);
        let (a, _rx_a) = session(&registry, 1000);
        let addr = registry.assign_dynamic(a).unwrap();
        let available = registry.available_addresses();

        assert_eq!(registry.teardown(a), Some(addr));
        assert_eq!(registry.available_addresses(), available + 1);
        assert!(registry.lookup_route(addr).is_none());

        let (b, _rx_b) = session(&registry, 1001);
        assert_eq!(registry.assign_dynamic(b).unwrap(), addr);
    }

    #[test]
    fn test_teardown_twice_is_harmless() {
        let registry = registry(10);
        let (id, _rx) = session(&registry, 1000);
        registry.assign_dynamic(id).unwrap();
        let available = registry.available_addresses();

        assert!(registry.teardown(id).is_some());
        assert!(registry.teardown(id).is_none());
        assert_eq!(registry.available_addresses(), available + 1);
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_static_conflict_keeps_original_holder() {
        let registry = registry(10);
        let (holder, _rx_h) = session(&registry, 1000);
        let (intruder, _rx_i) = session(&registry, 1001);
        let addr = Ipv4Addr::new(10, 0, 0, 50);

        assert_eq!(registry.claim_static(holder, addr).unwrap(), addr);
        assert!(matches!(
            registry.claim_static(intruder, addr),
            Err(ServerError::AddressInUse(a)) if a == addr
        ));

        assert_eq!(lease_of(&registry, holder), Some(addr));
        assert_eq!(lease_of(&registry, intruder), None);
    }

    #[test]
    fn test_static_claim_out_of_range() {
        let registry = registry(10);
        let (id, _rx) = session(&registry, 1000);

        assert!(matches!(
            registry.claim_static(id, Ipv4Addr::new(10, 0, 0, 1)),
            Err(ServerError::AddressOutOfRange(_))
        ));
        assert!(matches!(
            registry.claim_static(id, Ipv4Addr::new(172, 16, 0, 9)),
            Err(ServerError::AddressOutOfRange(_))
        ));
    }

    #[test]
    fn test_static_reclaim_of_own_address() {
        let registry = registry(10);
        let (id, _rx) = session(&registry, 1000);
        let addr = Ipv4Addr::new(10, 0, 0, 9);

        registry.claim_static(id, addr).unwrap();
        assert_eq!(registry.claim_static(id, addr).unwrap(), addr);
    }

    #[test]
    fn test_static_claim_releases_previous_lease() {
        let registry = registry(10);
        let (id, _rx) = session(&registry, 1000);
        let dynamic = registry.assign_dynamic(id).unwrap();
        let wanted = Ipv4Addr::new(10, 0, 0, 77);

        registry.claim_static(id, wanted).unwrap();
        assert!(registry.lookup_route(dynamic).is_none());
        assert!(registry.lookup_route(wanted).is_some());

        let (other, _rx_o) = session(&registry, 1001);
        assert_eq!(registry.assign_dynamic(other).unwrap(), dynamic);
    }

    #[tokio::test]
    async fn test_lookup_route_reaches_owner_queue() {
        let registry = registry(10);
        let (id, mut rx) = session(&registry, 1000);
        let addr = registry.assign_dynamic(id).unwrap();

        let tx = registry.lookup_route(addr).unwrap();
        tx.send(Bytes::from_static(b"unit")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"unit"));

        assert!(registry.lookup_route(Ipv4Addr::new(10, 0, 0, 200)).is_none());
    }

    #[test]
    fn test_session_limit() {
        let registry = registry(1);
        let (_id, _rx) = session(&registry, 1000);

        let (tx, _rx2) = mpsc::channel(1);
        assert!(matches!(
            registry.register(peer(1001), tx, Arc::new(AtomicInstant::now())),
            Err(ServerError::SessionLimitReached { limit: 1 })
        ));
    }

    #[test]
    fn test_unknown_session() {
        let registry = registry(10);
        let ghost = SessionId::generate();
        assert!(matches!(
            registry.assign_dynamic(ghost),
            Err(ServerError::SessionNotFound(_))
        ));
        assert!(registry.teardown(ghost).is_none());
    }

    #[test]
    fn test_snapshot_reads_shared_activity() {
        let registry = registry(10);
        let stale = Instant::now().checked_sub(Duration::from_secs(30)).unwrap();
        let activity = Arc::new(AtomicInstant::from_instant(stale));
        let (tx, _rx) = mpsc::channel(8);
        let id = registry.register(peer(1000), tx, activity.clone()).unwrap();
        registry.assign_dynamic(id).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, id);
        assert_eq!(snapshot[0].peer, peer(1000));
        assert_eq!(snapshot[0].lease, Some(Ipv4Addr::new(10, 0, 0, 2)));
        assert!(snapshot[0].idle >= Duration::from_secs(30));

        // The owner's stamp is visible without going through the registry
        activity.touch();
        assert!(registry.snapshot()[0].idle < Duration::from_secs(1));
    }
}
