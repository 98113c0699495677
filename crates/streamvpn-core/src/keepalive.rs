// ============================================
// File: crates/streamvpn-core/src/keepalive.rs
// ============================================
//! # Keepalive Monitor
//!
//! ## Creation Reason
//! Both ends of the tunnel detect dead peers the same way: after an idle
//! period they send a keepalive unit and wait a short time for any
//! inbound traffic, retrying a bounded number of times.
//!
//! ## Main Logical Flow
//! ```text
//!            inbound unit                 deadline, probes < max
//!   ┌────────────────────────┐        ┌─────────────────────────┐
//!   ▼                        │        │                         ▼
//! Idle ──deadline──► Probing(n) ──────┘                   SendProbe
//!                        │
//!                        └── deadline, probes == max ──► Expired
//! ```
//!
//! ## Echo Rule
//! A received keepalive is echoed unchanged unless this side has a probe
//! outstanding; then it is the reply and is consumed. Two peers applying
//! the same rule can never bounce one keepalive back and forth forever.
//!
//! ## Last Modified
//! v0.1.0 - Initial keepalive monitor

use std::time::{Duration, Instant};

// ============================================
// Decisions
// ============================================

/// What to do with a received keepalive unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveAction {
    /// Send the unit back unchanged.
    Echo,
    /// The unit answers our own probe; drop it.
    Consume,
}

/// What to do when the deadline fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeDecision {
    /// Send a keepalive probe; `attempt` starts at 1.
    SendProbe {
        /// Probe number within the current idle episode.
        attempt: u32,
    },
    /// All probes went unanswered; the peer is considered dead.
    Expired,
}

// ============================================
// KeepaliveMonitor
// ============================================

/// Tracks the idle deadline and outstanding probes of one connection.
///
/// # Example
/// ```
/// use std::time::{Duration, Instant};
/// use streamvpn_core::keepalive::{KeepaliveMonitor, ProbeDecision};
///
/// let now = Instant::now();
/// let mut monitor = KeepaliveMonitor::new(
///     Duration::from_secs(60),
///     Duration::from_secs(1),
///     3,
///     now,
/// );
/// assert_eq!(monitor.deadline(), now + Duration::from_secs(60));
/// assert_eq!(
///     monitor.on_deadline(monitor.deadline()),
///     ProbeDecision::SendProbe { attempt: 1 }
/// );
/// ```
#[derive(Debug, Clone)]
pub struct KeepaliveMonitor {
    idle_timeout: Duration,
    retry_delay: Duration,
    max_probes: u32,
    outstanding: u32,
    deadline: Instant,
}

impl KeepaliveMonitor {
    /// Creates a monitor whose first deadline is `now + idle_timeout`.
    ///
    /// `max_probes` is raised to at least 1.
    #[must_use]
    pub fn new(idle_timeout: Duration, retry_delay: Duration, max_probes: u32, now: Instant) -> Self {
        Self {
            idle_timeout,
            retry_delay,
            max_probes: max_probes.max(1),
            outstanding: 0,
            deadline: now + idle_timeout,
        }
    }

    /// Returns the instant at which [`Self::on_deadline`] should be called.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Returns the number of unanswered probes.
    #[must_use]
    pub const fn outstanding_probes(&self) -> u32 {
        self.outstanding
    }

    /// Records inbound traffic: clears probes and restarts the idle timer.
    pub fn record_activity(&mut self, now: Instant) {
        self.outstanding = 0;
        self.deadline = now + self.idle_timeout;
    }

    /// Handles a received keepalive unit.
    pub fn on_keepalive(&mut self, now: Instant) -> KeepaliveAction {
        let action = if self.outstanding > 0 {
            KeepaliveAction::Consume
        } else {
            KeepaliveAction::Echo
        };
        self.record_activity(now);
        action
    }

    /// Handles an expired deadline.
    pub fn on_deadline(&mut self, now: Instant) -> ProbeDecision {
        if self.outstanding >= self.max_probes {
            return ProbeDecision::Expired;
        }
        self.outstanding += 1;
        self.deadline = now + self.retry_delay;
        ProbeDecision::SendProbe {
            attempt: self.outstanding,
        }
    }
}

// ============================================
// Tests
// ============================================
