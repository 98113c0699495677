// ============================================
// File: crates/streamvpn-transport/src/tun/linux.rs
// ============================================
//! # Linux TUN Device
//!
//! ## Creation Reason
//! Client-side virtual interface backed by `/dev/net/tun`.
//!
//! ## Lifecycle
//! 1. `create`: open the clone device, `TUNSETIFF` with
//!    `IFF_TUN | IFF_NO_PI`, switch to non-blocking, wrap in `AsyncFd`
//! 2. `up`: set MTU and bring the link up (no address yet)
//! 3. `assign_address`: called by the tunnel once a lease is known;
//!    may be called again after a reconnect with a different lease
//! 4. `down` / drop
//!
//! ## Required Capabilities
//! `CAP_NET_ADMIN` or root. Interface configuration shells out to
//! `ip(8)`.
//!
//! ## ⚠️ Important Note for Next Developer
//! - `ip addr replace` is used instead of `add` so that a reconnect with
//!   the same lease is idempotent; a changed lease flushes the old one
//!   first
//! - The host route installed for static leases is replaced, never added
//!
//! ## Last Modified
//! v0.1.0 - Initial Linux TUN implementation

#![cfg(target_os = "linux")]

use std::fs::{File, OpenOptions};
use std::net::Ipv4Addr;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use nix::libc;
use parking_lot::Mutex;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{TunConfig, TunDevice};

// ============================================
// Constants
// ============================================

/// Clone device for TUN interfaces.
const TUN_CLONE_PATH: &str = "/dev/net/tun";

/// Layer-3 device, no Ethernet header.
const IFF_TUN: libc::c_short = 0x0001;

/// No 4-byte packet-info prefix on reads and writes.
const IFF_NO_PI: libc::c_short = 0x1000;

/// `_IOW('T', 202, int)`
const TUNSETIFF: libc::c_ulong = 0x4004_54ca;

/// `_IOW('T', 203, int)`
const TUNSETPERSIST: libc::c_ulong = 0x4004_54cb;

// ============================================
// ifreq
// ============================================

/// The subset of `struct ifreq` that `TUNSETIFF` reads and writes.
#[repr(C)]
struct InterfaceRequest {
    name: [libc::c_char; libc::IFNAMSIZ],
    flags: libc::c_short,
    _pad: [u8; 22],
}

impl InterfaceRequest {
    fn tun(name: &str) -> Self {
        let mut req = Self {
            name: [0; libc::IFNAMSIZ],
            flags: IFF_TUN | IFF_NO_PI,
            _pad: [0; 22],
        };
        for (slot, byte) in req
            .name
            .iter_mut()
            .zip(name.bytes().take(libc::IFNAMSIZ - 1))
        {
            *slot = byte as libc::c_char;
        }
        req
    }

    fn name(&self) -> String {
        #[allow(clippy::cast_sign_loss)]
        let bytes: Vec<u8> = self
            .name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Converts a dotted netmask to a prefix length.
fn prefix_len(netmask: Ipv4Addr) -> u32 {
    u32::from(netmask).count_ones()
}

// ============================================
// LinuxTun
// ============================================

/// Linux TUN device.
///
/// # Example
/// ```ignore
/// let tun = LinuxTun::create(TunConfig::new("svpn0").with_mtu(1400))?;
/// tun.up().await?;
/// tun.assign_address(lease, Ipv4Addr::new(255, 255, 0, 0), false).await?;
/// ```
pub struct LinuxTun {
    fd: AsyncFd<File>,
    config: TunConfig,
    /// Currently assigned (address, netmask)
    assigned: Mutex<Option<(Ipv4Addr, Ipv4Addr)>>,
    is_up: AtomicBool,
}

impl LinuxTun {
    /// Creates the TUN interface.
    ///
    /// # Errors
    /// - `PermissionDenied`: the clone device cannot be opened
    /// - `TunCreateFailed`: the ioctl or non-blocking switch failed
    pub fn create(config: TunConfig) -> Result<Self> {
        config.validate()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(TUN_CLONE_PATH)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    TransportError::PermissionDenied {
                        operation: format!("open {TUN_CLONE_PATH}"),
                    }
                } else {
                    TransportError::tun_create_failed(&config.name, e.to_string())
                }
            })?;
        let raw = file.as_raw_fd();

        let mut req = InterfaceRequest::tun(&config.name);
        // SAFETY: `req` is a properly sized, initialized ifreq prefix and
        // `raw` is an open descriptor for the lifetime of the call.
        if unsafe { libc::ioctl(raw, TUNSETIFF, &mut req) } < 0 {
            let err = std::io::Error::last_os_error();
            return Err(TransportError::tun_create_failed(
                &config.name,
                format!("TUNSETIFF failed: {err}"),
            ));
        }

        if config.persist {
            // SAFETY: integer-argument ioctl on an open descriptor.
            if unsafe { libc::ioctl(raw, TUNSETPERSIST, 1) } < 0 {
                warn!(
                    "Failed to mark TUN device persistent: {}",
                    std::io::Error::last_os_error()
                );
            }
        }

        set_nonblocking(raw).map_err(|e| TransportError::tun_create_failed(&config.name, e.to_string()))?;

        let fd = AsyncFd::new(file)
            .map_err(|e| TransportError::tun_create_failed(&config.name, e.to_string()))?;

        let mut config = config;
        config.name = req.name();
        info!(device = %config.name, mtu = config.mtu, "TUN device created");

        Ok(Self {
            fd,
            config,
            assigned: Mutex::new(None),
            is_up: AtomicBool::new(false),
        })
    }

    /// Runs `ip <args>`, mapping failures to `TunConfigFailed`.
    async fn ip(&self, args: &[&str]) -> Result<()> {
        debug!(device = %self.config.name, "ip {}", args.join(" "));

        let output = Command::new("ip")
            .args(args)
            .output()
            .await
            .map_err(|e| {
                TransportError::tun_config_failed(&self.config.name, format!("cannot run ip: {e}"))
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(TransportError::tun_config_failed(
                &self.config.name,
                format!(
                    "ip {} failed: {}",
                    args.join(" "),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ))
        }
    }
}

fn set_nonblocking(raw: libc::c_int) -> std::io::Result<()> {
    // SAFETY: fcntl on an open descriptor with standard commands.
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[async_trait]
impl TunDevice for LinuxTun {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let mut guard = self
                .fd
                .ready(Interest::READABLE)
                .await
                .map_err(|e| TransportError::TunReadFailed {
                    reason: e.to_string(),
                })?;

            match guard.try_io(|inner| {
                // SAFETY: `buf` is a valid writable region of `buf.len()` bytes.
                let n = unsafe {
                    libc::read(
                        inner.get_ref().as_raw_fd(),
                        buf.as_mut_ptr().cast::<libc::c_void>(),
                        buf.len(),
                    )
                };
                usize::try_from(n).map_err(|_| std::io::Error::last_os_error())
            }) {
                Ok(result) => {
                    return result.map_err(|e| TransportError::TunReadFailed {
                        reason: e.to_string(),
                    })
                }
                Err(_would_block) => continue,
            }
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        loop {
            let mut guard = self
                .fd
                .ready(Interest::WRITABLE)
                .await
                .map_err(|e| TransportError::TunWriteFailed {
                    reason: e.to_string(),
                })?;

            match guard.try_io(|inner| {
                // SAFETY: `buf` is a valid readable region of `buf.len()` bytes.
                let n = unsafe {
                    libc::write(
                        inner.get_ref().as_raw_fd(),
                        buf.as_ptr().cast::<libc::c_void>(),
                        buf.len(),
                    )
                };
                usize::try_from(n).map_err(|_| std::io::Error::last_os_error())
            }) {
                Ok(result) => {
                    return result.map_err(|e| TransportError::TunWriteFailed {
                        reason: e.to_string(),
                    })
                }
                Err(_would_block) => continue,
            }
        }
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn mtu(&self) -> u16 {
        self.config.mtu
    }

    fn address(&self) -> Option<Ipv4Addr> {
        self.assigned.lock().map(|(addr, _)| addr)
    }

    async fn assign_address(&self, addr: Ipv4Addr, netmask: Ipv4Addr, host_route: bool) -> Result<()> {
        let previous = *self.assigned.lock();
        if let Some((old, _)) = previous.filter(|(old, _)| *old != addr) {
            debug!(device = %self.config.name, old = %old, "Removing previous lease");
            self.ip(&["addr", "flush", "dev", &self.config.name]).await?;
        }

        let cidr = format!("{addr}/{}", prefix_len(netmask));
        self.ip(&["addr", "replace", &cidr, "dev", &self.config.name])
            .await?;

        if host_route {
            let host = format!("{addr}/32");
            self.ip(&["route", "replace", &host, "dev", &self.config.name])
                .await?;
        }

        *self.assigned.lock() = Some((addr, netmask));
        info!(device = %self.config.name, address = %cidr, host_route, "Tunnel address assigned");
        Ok(())
    }

    async fn up(&self) -> Result<()> {
        let mtu = self.config.mtu.to_string();
        self.ip(&["link", "set", "dev", &self.config.name, "mtu", &mtu])
            .await?;
        self.ip(&["link", "set", "dev", &self.config.name, "up"])
            .await?;

        self.is_up.store(true, Ordering::Release);
        info!(device = %self.config.name, "TUN device up");
        Ok(())
    }

    async fn down(&self) -> Result<()> {
        if let Err(e) = self.ip(&["link", "set", "dev", &self.config.name, "down"]).await {
            warn!("{}", e);
        }
        self.is_up.store(false, Ordering::Release);
        info!(device = %self.config.name, "TUN device down");
        Ok(())
    }

    fn is_up(&self) -> bool {
        self.is_up.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for LinuxTun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinuxTun")
            .field("name", &self.config.name)
            .field("address", &self.address())
            .field("mtu", &self.config.mtu)
            .field("is_up", &self.is_up())
            .finish()
    }
}

// ============================================
// Tests
// ============================================
