//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::cache::{ttl_from_millis, CacheSettings, TierSettings};

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default TTL in milliseconds; zero or negative never expires
    pub default_ttl_ms: i64,
    /// Local tier capacity
    pub l1_max_entries: usize,
    /// Longest time an entry stays in the local tier, in milliseconds
    pub l1_ttl_ms: i64,
    /// Run with the local tier in front of storage
    pub l1_enabled: bool,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `L1_MAX_ENTRIES` - Local tier capacity (default: 10000)
    /// - `L1_TTL_MS` - Local tier lifetime bound in milliseconds (default: 60000)
    /// - `L1_ENABLED` - Enable the local tier (default: true)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_ttl_ms: env_or("DEFAULT_TTL_MS", defaults.default_ttl_ms),
            l1_max_entries: env_or("L1_MAX_ENTRIES", defaults.l1_max_entries),
            l1_ttl_ms: env_or("L1_TTL_MS", defaults.l1_ttl_ms),
            l1_enabled: env_or("L1_ENABLED", defaults.l1_enabled),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
        }
    }

    /// Engine-facing subset.
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            default_ttl: ttl_from_millis(self.default_ttl_ms),
        }
    }

    pub fn tier_settings(&self) -> TierSettings {
        TierSettings {
            enabled: self.l1_enabled,
            max_entries: self.l1_max_entries,
            ttl: ttl_from_millis(self.l1_ttl_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl_ms: 300_000,
            l1_max_entries: 10_000,
            l1_ttl_ms: 60_000,
            l1_enabled: true,
            server_port: 3000,
            cleanup_interval: 1,
        }
    }
}

/// Reads and parses `name`, falling back to `default` if unset or unparseable.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
