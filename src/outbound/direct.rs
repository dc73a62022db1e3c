//! Direct TCP dialer

use super::Dialer;
use crate::common::net::{authority, configure_tcp_stream};
use crate::{Error, Result};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Plain TCP dialer with the relay's socket tuning
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    connect_timeout: Option<Duration>,
}

impl TcpDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every connect attempt; without it the OS connect timeout applies
    pub fn with_timeout(connect_timeout: Option<Duration>) -> Self {
        TcpDialer { connect_timeout }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Conn = TcpStream;

    async fn dial(&self, host: &str, port: u16) -> Result<TcpStream> {
        let addr = authority(host, port);
        debug!("Connecting to {}", addr);

        let result = within(self.connect_timeout, TcpStream::connect(addr.as_str()))
            .await
            .map_err(|e| {
                debug!("Connect to {} gave up: {}", addr, e);
                e
            })?;

        let stream = result.map_err(|e| Error::dial(format!("{}: {}", addr, e)))?;
        configure_tcp_stream(&stream);

        debug!("Connected to {}", addr);
        Ok(stream)
    }
}

/// Run `fut` under an optional deadline
async fn within<F: Future>(limit: Option<Duration>, fut: F) -> Result<F::Output> {
    match limit {
        Some(limit) => Ok(tokio::time::timeout(limit, fut).await?),
        None => Ok(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_established() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = TcpDialer::new().dial("127.0.0.1", port).await.unwrap();
        assert!(stream.nodelay().unwrap());
        assert!(listener.accept().await.is_ok());
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = TcpDialer::new().dial("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(err, Error::Dial(_)));
    }

    #[tokio::test]
    async fn test_deadline_elapsed_is_timeout() {
        let err = within(Some(Duration::from_millis(10)), std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_no_deadline_waits() {
        let value = within(None, async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }
}
