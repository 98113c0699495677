// ============================================
// File: crates/streamvpn-server/src/config.rs
// ============================================
//! # Server Configuration
//!
//! ## Creation Reason
//! Collects every tunable of the tunnel server in one TOML file.
//!
//! ## Configuration Sections
//! - `network`: TCP listen address
//! - `vpn`: Virtual address range and reserved gateway
//! - `keyfile`: Optional identity/secret file
//! - `limits`: Session cap, timeouts, keepalive and framing limits
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [network]
//! listen_addr = "0.0.0.0:2002"
//!
//! [vpn]
//! virtual_ip_range = "10.0.0.0/16"
//! gateway_ip = "10.0.0.1"
//!
//! [keyfile]
//! path = "/etc/streamvpn/keys"
//!
//! [limits]
//! max_sessions = 1000
//! session_timeout = 240
//! handshake_timeout = 10
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - All config changes require a server restart
//! - `range_end` narrows the pool inside the CIDR; it never widens it
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use streamvpn_common::Subnet;
use streamvpn_core::protocol::MAX_FRAME_SIZE;

use crate::error::{Result, ServerError};

// ============================================
// ServerConfig
// ============================================

/// Main server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Virtual network configuration.
    #[serde(default)]
    pub vpn: VpnConfig,

    /// Keyfile configuration.
    #[serde(default)]
    pub keyfile: KeyfileConfig,

    /// Resource limits and timeouts.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `ConfigLoad` if the file cannot be read or parsed and
    /// `ConfigInvalid` if a value fails validation.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        debug!(path = %shown, "Reading server configuration");

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ServerError::config_load(&shown, e.to_string()))?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ServerError::config_load(&shown, e.to_string()))?;
        config.validate()?;

        info!(
            path = %shown,
            listen = %config.network.listen_addr,
            range = %config.vpn.virtual_ip_range,
            "Server configuration loaded"
        );
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    /// Same as [`Self::load`].
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.vpn.validate()?;
        self.limits.validate()?;
        Ok(())
    }

    /// Serializes configuration to a TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

// ============================================
// NetworkConfig
// ============================================

/// Network configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// TCP listen address. Port 0 picks an ephemeral port.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 2002))
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

// ============================================
// VpnConfig
// ============================================

/// Virtual network configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpnConfig {
    /// Virtual network in CIDR notation.
    #[serde(default = "default_ip_range")]
    pub virtual_ip_range: Subnet,

    /// Highest address handed out; defaults to the end of the range.
    #[serde(default)]
    pub range_end: Option<Ipv4Addr>,

    /// Server's own virtual address, never leased.
    #[serde(default = "default_gateway_ip")]
    pub gateway_ip: Ipv4Addr,
}

fn default_ip_range() -> Subnet {
    Subnet::clamped(Ipv4Addr::new(10, 0, 0, 0), 16)
}

fn default_gateway_ip() -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, 1)
}

impl VpnConfig {
    fn validate(&self) -> Result<()> {
        if self.virtual_ip_range.prefix_len() > 30 {
            return Err(ServerError::config_invalid(
                "vpn.virtual_ip_range",
                "prefix length must be <= 30 to leave leasable addresses",
            ));
        }

        if !self.virtual_ip_range.contains(self.gateway_ip) {
            return Err(ServerError::config_invalid(
                "vpn.gateway_ip",
                format!("{} is not inside {}", self.gateway_ip, self.virtual_ip_range),
            ));
        }

        if let Some(end) = self.range_end {
            if !self.virtual_ip_range.contains(end) {
                return Err(ServerError::config_invalid(
                    "vpn.range_end",
                    format!("{end} is not inside {}", self.virtual_ip_range),
                ));
            }
        }

        Ok(())
    }

    /// Returns the highest address the pool may lease.
    #[must_use]
    pub fn effective_range_end(&self) -> Ipv4Addr {
        self.range_end
            .unwrap_or_else(|| self.virtual_ip_range.last())
    }
}

impl Default for VpnConfig {
    fn default() -> Self {
        Self {
            virtual_ip_range: default_ip_range(),
            range_end: None,
            gateway_ip: default_gateway_ip(),
        }
    }
}

// ============================================
// KeyfileConfig
// ============================================

/// Keyfile configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyfileConfig {
    /// Path to the keyfile. Absent means every lookup misses.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ============================================
// LimitsConfig
// ============================================

/// Resource limits and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Session timeout in seconds; the idle deadline is a quarter of it.
    #[serde(default = "default_session_timeout")]
    pub session_timeout: u64,

    /// Per-phase handshake timeout in seconds.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,

    /// Wait between keepalive probes, in milliseconds.
    #[serde(default = "default_keepalive_retry_delay_ms")]
    pub keepalive_retry_delay_ms: u64,

    /// Unanswered probes before a session is torn down.
    #[serde(default = "default_keepalive_max_probes")]
    pub keepalive_max_probes: u32,

    /// Largest accepted frame payload.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Per-session outbound queue depth (units from other sessions).
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

fn default_max_sessions() -> usize {
    1000
}

fn default_session_timeout() -> u64 {
    240
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_keepalive_retry_delay_ms() -> u64 {
    1000
}

fn default_keepalive_max_probes() -> u32 {
    3
}

fn default_max_frame_size() -> usize {
    MAX_FRAME_SIZE
}

fn default_outbound_queue() -> usize {
    256
}

impl LimitsConfig {
    fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            return Err(ServerError::config_invalid(
                "limits.max_sessions",
                "must be greater than 0",
            ));
        }

        if self.session_timeout < 4 {
            return Err(ServerError::config_invalid(
                "limits.session_timeout",
                "must be at least 4 seconds",
            ));
        }

        if self.handshake_timeout == 0 {
            return Err(ServerError::config_invalid(
                "limits.handshake_timeout",
                "must be greater than 0",
            ));
        }

        if self.keepalive_max_probes == 0 {
            return Err(ServerError::config_invalid(
                "limits.keepalive_max_probes",
                "must be greater than 0",
            ));
        }

        if self.max_frame_size < 20 || self.max_frame_size > MAX_FRAME_SIZE {
            return Err(ServerError::config_invalid(
                "limits.max_frame_size",
                format!("must be between 20 and {MAX_FRAME_SIZE}"),
            ));
        }

        if self.outbound_queue == 0 {
            return Err(ServerError::config_invalid(
                "limits.outbound_queue",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Returns the idle period after which a keepalive probe is sent.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout) / 4
    }

    /// Returns the per-phase handshake timeout.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout)
    }

    /// Returns the delay between keepalive probes.
    #[must_use]
    pub const fn keepalive_retry_delay(&self) -> Duration {
        Duration::from_millis(self.keepalive_retry_delay_ms)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            session_timeout: default_session_timeout(),
            handshake_timeout: default_handshake_timeout(),
            keepalive_retry_delay_ms: default_keepalive_retry_delay_ms(),
            keepalive_max_probes: default_keepalive_max_probes(),
            max_frame_size: default_max_frame_size(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
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
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.listen_addr.port(), 2002);
        assert_eq!(config.vpn.virtual_ip_range.to_string(), "10.0.0.0/16");
        assert_eq!(config.limits.idle_timeout(), Duration::from_secs(60));
        assert!(config.keyfile.path.is_none());
    }

    #[test]
    fn test_full_config_format() {
        let toml = r#"
            [network]
            listen_addr = "127.0.0.1:4000"

            [vpn]
            virtual_ip_range = "10.8.0.0/24"
            range_end = "10.8.0.100"
            gateway_ip = "10.8.0.1"

            [keyfile]
            path = "/etc/streamvpn/keys"

            [limits]
            max_sessions = 50
            session_timeout = 120
            handshake_timeout = 5
            keepalive_retry_delay_ms = 500
            keepalive_max_probes = 2

            [logging]
            level = "debug"
        "#;

        let config = ServerConfig::from_str(toml).unwrap();
        assert_eq!(config.network.listen_addr.port(), 4000);
        assert_eq!(config.vpn.effective_range_end(), Ipv4Addr::new(10, 8, 0, 100));
        assert_eq!(config.keyfile.path, Some(PathBuf::from("/etc/streamvpn/keys")));
        assert_eq!(config.limits.max_sessions, 50);
        assert_eq!(config.limits.idle_timeout(), Duration::from_secs(30));
        assert_eq!(config.limits.keepalive_retry_delay(), Duration::from_millis(500));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_range_end_defaults_to_broadcast() {
        let config = ServerConfig::default();
        assert_eq!(config.vpn.effective_range_end(), Ipv4Addr::new(10, 0, 255, 255));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let gateway_outside = r#"
            [vpn]
            virtual_ip_range = "10.8.0.0/24"
            gateway_ip = "10.9.0.1"
        "#;
        assert!(matches!(
            ServerConfig::from_str(gateway_outside),
            Err(ServerError::ConfigInvalid { .. })
        ));

        let bad_cidr = r#"
            [vpn]
            virtual_ip_range = "10.8.0.0"
        "#;
        assert!(matches!(
            ServerConfig::from_str(bad_cidr),
            Err(ServerError::ConfigLoad { .. })
        ));

        let zero_sessions = r#"
            [limits]
            max_sessions = 0
        "#;
        assert!(ServerConfig::from_str(zero_sessions).is_err());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = ServerConfig::default();
        let parsed = ServerConfig::from_str(&config.to_toml()).unwrap();
        assert_eq!(parsed.vpn.gateway_ip, config.vpn.gateway_ip);
    }
}
