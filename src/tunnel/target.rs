//! Handshake target parsing
//!
//! The first text frame of a session names the destination:
//!
//! ```text
//! CONNECT:example.org:443
//! conn:example.org:443|legacy-payload
//! ```
//!
//! The marker is matched case-insensitively. A missing or out-of-range port
//! falls back to [`DEFAULT_PORT`].

use crate::common::net::authority;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Port used when the handshake omits one
pub const DEFAULT_PORT: u16 = 443;

/// Separator introducing the legacy payload suffix
const LEGACY_SUFFIX: char = '|';

static MARKER_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*conn").expect("static regex"));

static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:connect|conn)(?:\s*:\s*|\s+)").expect("static regex"));

static HOST_PORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\[[^\]]*\]|[^:|\s]+)(?::([^:|\s]*))?").expect("static regex")
});

/// Destination requested by a client handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for HandshakeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&authority(&self.host, self.port))
    }
}

/// Whether a text frame is a connect request at all.
///
/// Frames that do not start with the marker are not handshakes and are
/// ignored by the session.
pub fn is_connect_request(text: &str) -> bool {
    MARKER_PREFIX.is_match(text)
}

/// Parse a handshake frame into a [`HandshakeRequest`]
pub fn parse_target(text: &str) -> Result<HandshakeRequest> {
    if let Some(m) = MARKER.find(text) {
        let rest = &text[m.end()..];
        if let Some(caps) = HOST_PORT.captures(rest) {
            let host = caps.get(1).map(|h| h.as_str()).unwrap_or_default();
            let port = parse_port(caps.get(2).map(|p| p.as_str()))?;
            return build(host, port);
        }
    }

    // Legacy layout: marker:host[:port], tokens split on ':'
    let tokens: Vec<&str> = text.split(':').collect();
    if tokens.len() < 2 {
        return Err(Error::handshake(format!("no target in '{}'", text.trim())));
    }
    let port = parse_port(tokens.get(2).copied())?;
    build(strip_suffix(tokens[1]), port)
}

fn build(host: &str, port: u16) -> Result<HandshakeRequest> {
    let host = strip_suffix(host);
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if host.is_empty() {
        return Err(Error::handshake("empty host"));
    }
    if host.chars().any(char::is_whitespace) {
        return Err(Error::handshake(format!("invalid host '{}'", host)));
    }

    Ok(HandshakeRequest {
        host: host.to_string(),
        port,
    })
}

fn strip_suffix(token: &str) -> &str {
    token.split(LEGACY_SUFFIX).next().unwrap_or_default().trim()
}

fn parse_port(token: Option<&str>) -> Result<u16> {
    let token = match token.map(strip_suffix) {
        Some(t) if !t.is_empty() => t,
        _ => return Ok(DEFAULT_PORT),
    };

    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::handshake(format!("invalid port '{}'", token)));
    }

    match token.parse::<u32>() {
        Ok(port @ 1..=65535) => Ok(port as u16),
        _ => Ok(DEFAULT_PORT),
    }
}
