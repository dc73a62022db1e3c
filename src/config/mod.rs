//! Configuration module
//!
//! The configuration is loaded once at process start (YAML file, then
//! environment overrides, then CLI overrides) and is immutable afterwards.

use crate::tunnel::CandidateEndpoint;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Region value that merges every configured pool
pub const REGION_AUTO: &str = "AUTO";

/// Endpoint used when the selected fallback pool is empty
pub const DEFAULT_FALLBACK: &str = "104.16.0.0:443";

/// Environment variable overriding `secret`
pub const ENV_SECRET: &str = "WS_RELAY_SECRET";
/// Environment variable replacing `fallback.addresses` (comma separated)
pub const ENV_FALLBACK: &str = "WS_RELAY_FALLBACK";
/// Environment variable overriding `fallback.region`
pub const ENV_REGION: &str = "WS_RELAY_REGION";
/// Environment variable overriding `listen`
pub const ENV_LISTEN: &str = "WS_RELAY_LISTEN";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ingress listen address
    pub listen: String,

    /// Bearer token required on upgrade requests
    pub secret: Option<String>,

    /// Log level
    #[serde(rename = "log-level")]
    pub log_level: String,

    /// Per-dial connect timeout; unset relies on the OS connect timeout
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: Option<u64>,

    /// Fallback endpoint selection
    pub fallback: FallbackConfig,
}

impl Config {
    /// Load configuration from file (synchronous)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load from string.
    ///
    /// Only the YAML shape is checked here; call [`Config::validate`] once
    /// environment and command line overrides have been applied.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(ENV_SECRET) {
            self.secret = if secret.is_empty() { None } else { Some(secret) };
        }

        if let Some(list) = lookup(ENV_FALLBACK) {
            self.fallback.addresses = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(region) = lookup(ENV_REGION) {
            self.fallback.region = region;
        }

        if let Some(listen) = lookup(ENV_LISTEN) {
            self.listen = listen;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.listen
            .parse::<SocketAddr>()
            .map_err(|e| Error::config(format!("Invalid listen address '{}': {}", self.listen, e)))?;

        if let Some(0) = self.connect_timeout_ms {
            return Err(Error::config("connect-timeout-ms must be greater than zero"));
        }

        self.fallback.validate()
    }

    /// Connect timeout as a Duration
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Bearer token, treating an empty string as unset
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: "0.0.0.0:8080".to_string(),
            secret: None,
            log_level: "info".to_string(),
            connect_timeout_ms: None,
            fallback: FallbackConfig::default(),
        }
    }
}

/// Fallback endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Pool to draw from (`AUTO` merges all pools)
    pub region: String,

    /// Regional pools of `host[:port]` entries
    pub pools: BTreeMap<String, Vec<String>>,

    /// Extra entries, always part of the merged pool
    pub addresses: Vec<String>,

    /// Used when the selected pool is empty
    pub default: String,
}

impl FallbackConfig {
    /// Look up a configured pool by region, ignoring case
    pub fn pool(&self, region: &str) -> Option<&Vec<String>> {
        self.pools
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(region))
            .map(|(_, entries)| entries)
    }

    /// Whether the configured region selects the merged pool
    pub fn is_auto(&self) -> bool {
        self.region.eq_ignore_ascii_case(REGION_AUTO)
    }

    fn validate(&self) -> Result<()> {
        if !self.is_auto() && self.pool(&self.region).is_none() {
            return Err(Error::config(format!(
                "Unknown fallback region '{}' (expected {} or one of: {})",
                self.region,
                REGION_AUTO,
                self.pools.keys().cloned().collect::<Vec<_>>().join(", ")
            )));
        }

        let entries = self
            .pools
            .values()
            .flatten()
            .chain(self.addresses.iter())
            .chain(std::iter::once(&self.default));

        for entry in entries {
            CandidateEndpoint::parse(entry)
                .map_err(|e| Error::config(format!("Invalid fallback entry '{}': {}", entry, e)))?;
        }

        Ok(())
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        FallbackConfig {
            region: REGION_AUTO.to_string(),
            pools: BTreeMap::new(),
            addresses: Vec::new(),
            default: DEFAULT_FALLBACK.to_string(),
        }
    }
}
