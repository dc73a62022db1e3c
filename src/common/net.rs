//! Network utilities

use socket2::SockRef;
use tokio::net::TcpStream;

/// Apply the relay's outbound socket tuning.
///
/// Nagle is disabled so small tunnelled writes (TLS records, handshakes) are
/// not held back waiting for coalescing.
#[inline]
pub fn configure_tcp_stream(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
    let sock = SockRef::from(stream);
    let _ = sock.set_keepalive(true);
}

/// Join host and port into a dialable authority, bracketing bare IPv6 literals.
pub fn authority(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
