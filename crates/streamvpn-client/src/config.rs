// ============================================
// File: crates/streamvpn-client/src/config.rs
// ============================================
//! # Client Configuration
//!
//! ## Creation Reason
//! Collects the client's server address, tunnel device settings,
//! timeouts and reconnect policy in one TOML file.
//!
//! ## Configuration Sections
//! - `server`: Tunnel server address and asserted identity
//! - `tunnel`: TUN device, optional static address, netmask
//! - `timeouts`: Handshake, idle and keepalive timing
//! - `reconnect`: Backoff policy
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [server]
//! address = "vpn.example.com:2002"
//!
//! [tunnel]
//! device_name = "tun0"
//! static_address = "10.0.0.42"
//!
//! [reconnect]
//! initial_backoff_ms = 1000
//! max_backoff_ms = 30000
//! max_attempts = 0
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `max_attempts = 0` means retry forever
//! - The identity defaults to the device name
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use streamvpn_core::protocol::Identity;
use streamvpn_transport::TunConfig;

use crate::error::{ClientError, Result};

/// Port used when `server.address` carries none.
pub const DEFAULT_SERVER_PORT: u16 = 2002;

// ============================================
// ClientConfig
// ============================================

/// Main client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server section.
    #[serde(default)]
    pub server: ServerSection,

    /// Tunnel device section.
    #[serde(default)]
    pub tunnel: TunnelSection,

    /// Timeouts section.
    #[serde(default)]
    pub timeouts: TimeoutsSection,

    /// Reconnect policy.
    #[serde(default)]
    pub reconnect: ReconnectSection,

    /// Logging section.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ClientConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `ConfigLoad` if the file cannot be read or parsed and
    /// `ConfigInvalid` if a value fails validation.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ClientError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ClientError::config_load(&path_str, e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    /// Same as [`Self::load`].
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ClientError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.tunnel.validate()?;
        self.timeouts.validate()?;
        self.reconnect.validate()?;

        Identity::new(self.identity())
            .map_err(|e| ClientError::config_invalid("server.identity", e.to_string()))?;
        Ok(())
    }

    /// Returns the identity asserted during the handshake.
    #[must_use]
    pub fn identity(&self) -> &str {
        self.server
            .identity
            .as_deref()
            .unwrap_or(&self.tunnel.device_name)
    }
}

// ============================================
// ServerSection
// ============================================

/// Tunnel server section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// `host:port` or bare `host`.
    #[serde(default = "default_server_address")]
    pub address: String,

    /// Identity sent during the handshake.
    #[serde(default)]
    pub identity: Option<String>,
}

fn default_server_address() -> String {
    format!("127.0.0.1:{DEFAULT_SERVER_PORT}")
}

impl ServerSection {
    fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(ClientError::config_invalid(
                "server.address",
                "must not be empty",
            ));
        }
        Ok(())
    }

    /// Returns the connect target, appending the default port if absent.
    #[must_use]
    pub fn target(&self) -> String {
        let address = self.address.trim();
        if address.parse::<SocketAddr>().is_ok() {
            return address.to_string();
        }
        match address.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => format!("[{address}]:{DEFAULT_SERVER_PORT}"),
            Ok(IpAddr::V4(_)) => format!("{address}:{DEFAULT_SERVER_PORT}"),
            Err(_) if !address.contains(':') => format!("{address}:{DEFAULT_SERVER_PORT}"),
            Err(_) => address.to_string(),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: default_server_address(),
            identity: None,
        }
    }
}

// ============================================
// TunnelSection
// ============================================

/// Tunnel device section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelSection {
    /// TUN device name.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Device MTU.
    #[serde(default = "default_mtu")]
    pub mtu: u16,

    /// Address to request instead of a dynamic lease.
    #[serde(default)]
    pub static_address: Option<Ipv4Addr>,

    /// Netmask applied to the leased address.
    #[serde(default = "default_netmask")]
    pub netmask: Ipv4Addr,
}

fn default_device_name() -> String {
    "tun0".to_string()
}

fn default_mtu() -> u16 {
    1400
}

fn default_netmask() -> Ipv4Addr {
    Ipv4Addr::new(255, 255, 0, 0)
}

impl TunnelSection {
    fn validate(&self) -> Result<()> {
        self.tun_config()
            .validate()
            .map_err(|e| ClientError::config_invalid("tunnel", e.to_string()))?;

        if self.device_name.is_empty() {
            return Err(ClientError::config_invalid(
                "tunnel.device_name",
                "must not be empty",
            ));
        }

        let mask = u32::from(self.netmask);
        if mask == 0 || mask.leading_ones() + mask.trailing_zeros() != 32 {
            return Err(ClientError::config_invalid(
                "tunnel.netmask",
                format!("{} is not a contiguous netmask", self.netmask),
            ));
        }

        if let Some(addr) = self.static_address {
            if addr.is_unspecified() || addr.is_broadcast() {
                return Err(ClientError::config_invalid(
                    "tunnel.static_address",
                    format!("{addr} cannot be leased"),
                ));
            }
        }

        Ok(())
    }

    /// Builds the TUN device configuration.
    #[must_use]
    pub fn tun_config(&self) -> TunConfig {
        TunConfig::new(&self.device_name).with_mtu(self.mtu)
    }
}

impl Default for TunnelSection {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            mtu: default_mtu(),
            static_address: None,
            netmask: default_netmask(),
        }
    }
}

// ============================================
// TimeoutsSection
// ============================================

/// Timeouts section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsSection {
    /// Connect, handshake and negotiation timeout in seconds.
    #[serde(default = "default_handshake")]
    pub handshake: u64,

    /// Session timeout in seconds; the idle deadline is a quarter of it.
    #[serde(default = "default_session_timeout")]
    pub session_timeout: u64,

    /// Wait between keepalive probes, in milliseconds.
    #[serde(default = "default_keepalive_retry_delay_ms")]
    pub keepalive_retry_delay_ms: u64,

    /// Unanswered probes before the connection is dropped.
    #[serde(default = "default_keepalive_max_probes")]
    pub keepalive_max_probes: u32,
}

fn default_handshake() -> u64 {
    10
}

fn default_session_timeout() -> u64 {
    240
}

fn default_keepalive_retry_delay_ms() -> u64 {
    1000
}

fn default_keepalive_max_probes() -> u32 {
    3
}

impl TimeoutsSection {
    fn validate(&self) -> Result<()> {
        if self.handshake == 0 {
            return Err(ClientError::config_invalid(
                "timeouts.handshake",
                "must be greater than 0",
            ));
        }
        if self.session_timeout < 4 {
            return Err(ClientError::config_invalid(
                "timeouts.session_timeout",
                "must be at least 4 seconds",
            ));
        }
        if self.keepalive_max_probes == 0 {
            return Err(ClientError::config_invalid(
                "timeouts.keepalive_max_probes",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Returns the connect/handshake/negotiation timeout.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake)
    }

    /// Returns the idle period after which a keepalive probe is sent.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout) / 4
    }

    /// Returns the delay between keepalive probes.
    #[must_use]
    pub const fn keepalive_retry_delay(&self) -> Duration {
        Duration::from_millis(self.keepalive_retry_delay_ms)
    }
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            handshake: default_handshake(),
            session_timeout: default_session_timeout(),
            keepalive_retry_delay_ms: default_keepalive_retry_delay_ms(),
            keepalive_max_probes: default_keepalive_max_probes(),
        }
    }
}

// ============================================
// ReconnectSection
// ============================================

/// Reconnect policy section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSection {
    /// First backoff delay in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Consecutive failed attempts before giving up; 0 retries forever.
    #[serde(default)]
    pub max_attempts: u32,
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl ReconnectSection {
    fn validate(&self) -> Result<()> {
        if self.initial_backoff_ms == 0 {
            return Err(ClientError::config_invalid(
                "reconnect.initial_backoff_ms",
                "must be greater than 0",
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ClientError::config_invalid(
                "reconnect.max_backoff_ms",
                "must not be below initial_backoff_ms",
            ));
        }
        Ok(())
    }

    /// Returns `None` when attempts are unlimited.
    #[must_use]
    pub const fn attempt_limit(&self) -> Option<u32> {
        if self.max_attempts == 0 {
            None
        } else {
            Some(self.max_attempts)
        }
    }
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: 0,
        }
    }
}

// ============================================
// LoggingSection
// ============================================

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.target(), "127.0.0.1:2002");
        assert_eq!(config.identity(), "tun0");
        assert_eq!(config.tunnel.netmask, Ipv4Addr::new(255, 255, 0, 0));
        assert_eq!(config.timeouts.idle_timeout(), Duration::from_secs(60));
        assert_eq!(config.reconnect.attempt_limit(), None);
    }

    #[test]
    fn test_full_config_format() {
        let toml = r#"
            [server]
            address = "vpn.example.com:4000"
            identity = "laptop"

            [tunnel]
            device_name = "svpn0"
            mtu = 1300
            static_address = "10.0.0.42"
            netmask = "255.255.255.0"

            [timeouts]
            handshake = 5
            session_timeout = 120
            keepalive_retry_delay_ms = 250
            keepalive_max_probes = 5

            [reconnect]
            initial_backoff_ms = 200
            max_backoff_ms = 5000
            max_attempts = 7

            [logging]
            level = "debug"
        "#;

        let config = ClientConfig::from_str(toml).unwrap();
        assert_eq!(config.server.target(), "vpn.example.com:4000");
        assert_eq!(config.identity(), "laptop");
        assert_eq!(config.tunnel.static_address, Some(Ipv4Addr::new(10, 0, 0, 42)));
        assert_eq!(config.tunnel.tun_config().mtu, 1300);
        assert_eq!(config.timeouts.handshake_timeout(), Duration::from_secs(5));
        assert_eq!(config.timeouts.keepalive_retry_delay(), Duration::from_millis(250));
        assert_eq!(config.reconnect.attempt_limit(), Some(7));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_target_appends_default_port() {
        let mut server = ServerSection::default();

        server.address = "vpn.example.com".into();
        assert_eq!(server.target(), "vpn.example.com:2002");

        server.address = "192.0.2.10".into();
        assert_eq!(server.target(), "192.0.2.10:2002");

        server.address = "::1".into();
        assert_eq!(server.target(), "[::1]:2002");

        server.address = "[::1]:9000".into();
        assert_eq!(server.target(), "[::1]:9000");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_mask = r#"
            [tunnel]
            netmask = "255.0.255.0"
        "#;
        assert!(matches!(
            ClientConfig::from_str(bad_mask),
            Err(ClientError::ConfigInvalid { .. })
        ));

        let bad_backoff = r#"
            [reconnect]
            initial_backoff_ms = 5000
            max_backoff_ms = 1000
        "#;
        assert!(ClientConfig::from_str(bad_backoff).is_err());

        let long_name = r#"
            [tunnel]
            device_name = "a-very-long-device-name"
        "#;
        assert!(ClientConfig::from_str(long_name).is_err());

        let broadcast = r#"
            [tunnel]
            static_address = "255.255.255.255"
        "#;
        assert!(ClientConfig::from_str(broadcast).is_err());
    }
}
