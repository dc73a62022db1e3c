//! Fallback address pool
//!
//! Holds the configured fallback endpoints and hands out one at random per
//! session. Nothing is mutated on selection, so the pool is shared freely
//! across sessions.

use crate::common::net::authority;
use crate::config::FallbackConfig;
use crate::{Error, Result};
use rand::seq::SliceRandom;
use std::fmt;
use tracing::warn;

/// A dial candidate: the requested destination or a fallback entry.
///
/// A fallback entry without a port reuses the port the client asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEndpoint {
    pub host: String,
    pub port: Option<u16>,
}

impl CandidateEndpoint {
    pub fn new<S: Into<String>>(host: S, port: Option<u16>) -> Self {
        CandidateEndpoint {
            host: host.into(),
            port,
        }
    }

    /// Parse a `host[:port]` entry, splitting on the last colon.
    ///
    /// Bracketed (`[::1]:443`) and bare (`::1`) IPv6 literals are accepted;
    /// a bare literal never carries a port.
    pub fn parse(entry: &str) -> Result<Self> {
        let entry = entry.trim();

        if let Some(rest) = entry.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| Error::address(format!("unclosed bracket in '{}'", entry)))?;
            let port = match tail.strip_prefix(':') {
                Some(p) => Some(parse_port(entry, p)?),
                None if tail.is_empty() => None,
                None => return Err(Error::address(format!("unexpected '{}' after host", tail))),
            };
            return Self::checked(host, port);
        }

        match entry.rfind(':') {
            None => Self::checked(entry, None),
            Some(idx) if entry[..idx].contains(':') => Self::checked(entry, None),
            Some(idx) => Self::checked(&entry[..idx], Some(parse_port(entry, &entry[idx + 1..])?)),
        }
    }

    fn checked(host: &str, port: Option<u16>) -> Result<Self> {
        if host.is_empty() {
            return Err(Error::address("empty host"));
        }
        Ok(Self::new(host, port))
    }

    /// The port to dial, substituting `requested` when the entry has none
    pub fn port_or(&self, requested: u16) -> u16 {
        self.port.unwrap_or(requested)
    }
}

impl fmt::Display for CandidateEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => f.write_str(&authority(&self.host, port)),
            None => f.write_str(&self.host),
        }
    }
}

fn parse_port(entry: &str, port: &str) -> Result<u16> {
    match port.parse::<u16>() {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(Error::address(format!("invalid port in '{}'", entry))),
    }
}

/// Read-only list of fallback endpoints
#[derive(Debug, Clone)]
pub struct AddressPool {
    entries: Vec<CandidateEndpoint>,
    default: CandidateEndpoint,
}

impl AddressPool {
    pub fn new(entries: Vec<CandidateEndpoint>, default: CandidateEndpoint) -> Self {
        AddressPool { entries, default }
    }

    /// Build the pool selected by the configured region.
    ///
    /// A named region uses that pool alone; `AUTO` (or a region that is not
    /// configured) merges every pool in key order, then the flat address list.
    pub fn from_config(config: &FallbackConfig) -> Self {
        let raw: Vec<&String> = match config.pool(&config.region) {
            Some(pool) if !config.is_auto() => pool.iter().collect(),
            _ => config
                .pools
                .values()
                .flatten()
                .chain(config.addresses.iter())
                .collect(),
        };

        let entries = raw
            .into_iter()
            .filter_map(|entry| match CandidateEndpoint::parse(entry) {
                Ok(endpoint) => Some(endpoint),
                Err(e) => {
                    warn!("Skipping fallback entry '{}': {}", entry, e);
                    None
                }
            })
            .collect();

        let default = CandidateEndpoint::parse(&config.default).unwrap_or_else(|e| {
            warn!("Invalid fallback default '{}': {}", config.default, e);
            CandidateEndpoint::new("104.16.0.0", Some(443))
        });

        Self::new(entries, default)
    }

    /// Pick a fallback endpoint uniformly at random.
    ///
    /// An empty pool yields the configured default.
    pub fn pick_fallback(&self) -> CandidateEndpoint {
        self.entries
            .choose(&mut rand::thread_rng())
            .unwrap_or(&self.default)
            .clone()
    }

    pub fn entries(&self) -> &[CandidateEndpoint] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AddressPool {
    fn default() -> Self {
        Self::from_config(&FallbackConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_host_port() {
        let e = CandidateEndpoint::parse("sg.example.net:8443").unwrap();
        assert_eq!(e, CandidateEndpoint::new("sg.example.net", Some(8443)));
    }

    #[test]
    fn test_parse_host_only() {
        let e = CandidateEndpoint::parse("104.18.2.162").unwrap();
        assert_eq!(e.port, None);
        assert_eq!(e.port_or(2053), 2053);
    }

    #[test]
    fn test_parse_ipv6() {
        let e = CandidateEndpoint::parse("[2606:4700::1]:443").unwrap();
        assert_eq!(e, CandidateEndpoint::new("2606:4700::1", Some(443)));
        assert_eq!(e.to_string(), "[2606:4700::1]:443");

        let bare = CandidateEndpoint::parse("2606:4700::1").unwrap();
        assert_eq!(bare, CandidateEndpoint::new("2606:4700::1", None));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(CandidateEndpoint::parse("").is_err());
        assert!(CandidateEndpoint::parse(":443").is_err());
        assert!(CandidateEndpoint::parse("host:abc").is_err());
        assert!(CandidateEndpoint::parse("host:0").is_err());
        assert!(CandidateEndpoint::parse("[::1").is_err());
    }

    #[test]
    fn test_pick_portless_reuses_requested_port() {
        let pool = AddressPool::new(
            vec![
                CandidateEndpoint::new("a.example", None),
                CandidateEndpoint::new("b.example", None),
            ],
            CandidateEndpoint::new("default.example", Some(443)),
        );
        for _ in 0..32 {
            assert_eq!(pool.pick_fallback().port_or(8443), 8443);
        }
    }

    #[test]
    fn test_pick_stays_within_pool() {
        let pool = AddressPool::new(
            vec![
                CandidateEndpoint::new("a.example", Some(1)),
                CandidateEndpoint::new("b.example", Some(2)),
            ],
            CandidateEndpoint::new("default.example", Some(443)),
        );
        for _ in 0..32 {
            assert!(pool.entries().contains(&pool.pick_fallback()));
        }
    }

    #[test]
    fn test_empty_pool_uses_default() {
        let pool = AddressPool::default();
        assert!(pool.is_empty());
        assert_eq!(
            pool.pick_fallback(),
            CandidateEndpoint::new("104.16.0.0", Some(443))
        );
    }

    fn regional_config(region: &str) -> FallbackConfig {
        let mut pools = BTreeMap::new();
        pools.insert("SG".to_string(), vec!["sg.example:443".to_string()]);
        pools.insert(
            "JP".to_string(),
            vec!["jp.example:443".to_string(), "jp2.example".to_string()],
        );
        FallbackConfig {
            region: region.to_string(),
            pools,
            addresses: vec!["extra.example:8443".to_string()],
            ..FallbackConfig::default()
        }
    }

    #[test]
    fn test_region_selects_single_pool() {
        let pool = AddressPool::from_config(&regional_config("sg"));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.entries()[0].host, "sg.example");
    }

    #[test]
    fn test_auto_merges_pools_in_order() {
        let pool = AddressPool::from_config(&regional_config("AUTO"));
        let hosts: Vec<&str> = pool.entries().iter().map(|e| e.host.as_str()).collect();
        assert_eq!(hosts, vec!["jp.example", "jp2.example", "sg.example", "extra.example"]);
    }
}
