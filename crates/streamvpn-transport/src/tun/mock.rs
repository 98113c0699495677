// ============================================
// File: crates/streamvpn-transport/src/tun/mock.rs
// ============================================
//! # Mock TUN Device
//!
//! ## Creation Reason
//! Lets the client's forwarding loop run in tests without privileges.
//!
//! ## Main Functionality
//! - `inject_packet`: queue a packet for the next `read()`
//! - `next_written`: await the next packet the tunnel wrote
//! - `assignments`: every `assign_address` call, in order
//!
//! ## ⚠️ Important Note for Next Developer
//! - Test-only (`mock` feature); `read()` is cancel-safe so it can sit in
//!   a `select!` like the real device
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Result, TransportError};
use crate::traits::{TunConfig, TunDevice};

/// Maximum number of packets held in either direction.
const MAX_QUEUE_SIZE: usize = 1024;

/// One recorded `assign_address` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    /// Leased address
    pub address: Ipv4Addr,
    /// Netmask
    pub netmask: Ipv4Addr,
    /// Whether a host route was requested
    pub host_route: bool,
}

/// In-memory TUN device.
pub struct MockTun {
    config: TunConfig,
    inbound: Mutex<VecDeque<Vec<u8>>>,
    inbound_ready: Notify,
    written: Mutex<VecDeque<Vec<u8>>>,
    written_ready: Notify,
    assignments: Mutex<Vec<Assignment>>,
    is_up: AtomicBool,
}

impl MockTun {
    /// Creates a new mock device.
    #[must_use]
    pub fn new(config: TunConfig) -> Self {
        Self {
            config,
            inbound: Mutex::new(VecDeque::new()),
            inbound_ready: Notify::new(),
            written: Mutex::new(VecDeque::new()),
            written_ready: Notify::new(),
            assignments: Mutex::new(Vec::new()),
            is_up: AtomicBool::new(false),
        }
    }

    /// Queues a packet to be returned by `read()`.
    ///
    /// # Panics
    /// Panics if more than 1024 packets are already queued.
    pub fn inject_packet(&self, packet: impl Into<Vec<u8>>) {
        let mut queue = self.inbound.lock();
        assert!(queue.len() < MAX_QUEUE_SIZE, "mock TUN inbound queue overflow");
        queue.push_back(packet.into());
        drop(queue);
        self.inbound_ready.notify_one();
    }

    /// Waits for the next packet written to the device.
    pub async fn next_written(&self) -> Vec<u8> {
        loop {
            let notified = self.written_ready.notified();
            if let Some(packet) = self.written.lock().pop_front() {
                return packet;
            }
            notified.await;
        }
    }

    /// Drains every packet written so far.
    #[must_use]
    pub fn take_written(&self) -> Vec<Vec<u8>> {
        self.written.lock().drain(..).collect()
    }

    /// Returns every address assignment made so far.
    #[must_use]
    pub fn assignments(&self) -> Vec<Assignment> {
        self.assignments.lock().clone()
    }
}

#[async_trait]
impl TunDevice for MockTun {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let notified = self.inbound_ready.notified();
            if let Some(packet) = self.inbound.lock().pop_front() {
                let len = packet.len().min(buf.len());
                buf[..len].copy_from_slice(&packet[..len]);
                return Ok(len);
            }
            notified.await;
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut queue = self.written.lock();
        if queue.len() >= MAX_QUEUE_SIZE {
            return Err(TransportError::TunWriteFailed {
                reason: "mock write queue full".into(),
            });
        }
        queue.push_back(buf.to_vec());
        drop(queue);
        self.written_ready.notify_one();
        Ok(buf.len())
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn mtu(&self) -> u16 {
        self.config.mtu
    }

    fn address(&self) -> Option<Ipv4Addr> {
        self.assignments.lock().last().map(|a| a.address)
    }

    async fn assign_address(&self, addr: Ipv4Addr, netmask: Ipv4Addr, host_route: bool) -> Result<()> {
        self.assignments.lock().push(Assignment {
            address: addr,
            netmask,
            host_route,
        });
        Ok(())
    }

    async fn up(&self) -> Result<()> {
        self.is_up.store(true, Ordering::Release);
        Ok(())
    }

    async fn down(&self) -> Result<()> {
        self.is_up.store(false, Ordering::Release);
        Ok(())
    }

    fn is_up(&self) -> bool {
        self.is_up.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for MockTun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTun")
            .field("name", &self.config.name)
            .field("address", &self.address())
            .field("pending_reads", &self.inbound.lock().len())
            .field("written", &self.written.lock().len())
            .finish()
    }
}

impl Default for MockTun {
    fn default() -> Self {
        Self::new(TunConfig::new("mock0"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_inject_then_read() {
        let tun = MockTun::default();
        tun.inject_packet(b"ip packet".to_vec());

        let mut buf = [0u8; 64];
        let len = tun.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"ip packet");
    }

    #[tokio::test]
    async fn test_read_waits_for_injection() {
        let tun = std::sync::Arc::new(MockTun::default());
        let reader = {
            let tun = tun.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 16];
                let len = tun.read(&mut buf).await.unwrap();
                buf[..len].to_vec()
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        tun.inject_packet(b"late".to_vec());
        assert_eq!(reader.await.unwrap(), b"late");
    }

    #[tokio::test]
    async fn test_written_packets_observable() {
        let tun = MockTun::default();
        tun.write(b"one").await.unwrap();
        tun.write(b"two").await.unwrap();

        assert_eq!(tun.next_written().await, b"one");
        assert_eq!(tun.take_written(), vec![b"two".to_vec()]);
    }

    #[tokio::test]
    async fn test_assignments_recorded() {
        let tun = MockTun::default();
        assert!(tun.address().is_none());

        let mask = Ipv4Addr::new(255, 255, 0, 0);
        tun.assign_address(Ipv4Addr::new(10, 0, 0, 2), mask, false)
            .await
            .unwrap();
        tun.assign_address(Ipv4Addr::new(10, 0, 0, 9), mask, true)
            .await
            .unwrap();

        assert_eq!(tun.address(), Some(Ipv4Addr::new(10, 0, 0, 9)));
        let recorded = tun.assignments();
        assert_eq!(recorded.len(), 2);
        assert!(recorded[1].host_route);
    }

    #[tokio::test]
    async fn test_up_down() {
        let tun = MockTun::default();
        tun.up().await.unwrap();
        assert!(tun.is_up());
        tun.down().await.unwrap();
        assert!(!tun.is_up());
    }
}
