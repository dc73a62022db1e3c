//! Outbound connections
//!
//! - [`TcpDialer`]: opens one tuned TCP connection
//! - [`ConnectionRacer`]: races a direct and a fallback dial, first success wins

mod direct;
mod racer;

pub use direct::TcpDialer;
pub use racer::{Branch, ConnectionRacer, RaceOutcome};

use crate::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Trait for anything that can open a byte stream to `host:port`.
///
/// `dial` must only resolve once the connection is established; a pending
/// attempt is never handed to the caller.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// Established connection type
    type Conn: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a connection to `host:port`
    async fn dial(&self, host: &str, port: u16) -> Result<Self::Conn>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted dialer over in-memory duplex pipes

    use super::Dialer;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::DuplexStream;

    /// How a dial to a given host behaves
    #[derive(Debug, Clone, Copy)]
    pub enum Script {
        Connect(Duration),
        Refuse(Duration),
        Hang,
    }

    /// Dialer whose outcome per host is fixed in advance.
    ///
    /// Every successful dial keeps the far end of its pipe so tests can play
    /// the remote side.
    #[derive(Clone, Default)]
    pub struct ScriptedDialer {
        scripts: HashMap<String, Script>,
        peers: Arc<Mutex<Vec<(String, DuplexStream)>>>,
    }

    impl ScriptedDialer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(mut self, host: &str, script: Script) -> Self {
            self.scripts.insert(host.to_string(), script);
            self
        }

        /// Remove and return the remote end of the first connection to `host`
        pub fn take_peer(&self, host: &str) -> Option<DuplexStream> {
            let mut peers = self.peers.lock().unwrap();
            let idx = peers.iter().position(|(h, _)| h == host)?;
            Some(peers.remove(idx).1)
        }

        pub fn connected(&self) -> Vec<String> {
            self.peers.lock().unwrap().iter().map(|(h, _)| h.clone()).collect()
        }
    }

    #[async_trait]
    impl Dialer for ScriptedDialer {
        type Conn = DuplexStream;

        async fn dial(&self, host: &str, _port: u16) -> Result<DuplexStream> {
            match self.scripts.get(host).copied().unwrap_or(Script::Refuse(Duration::ZERO)) {
                Script::Connect(delay) => {
                    tokio::time::sleep(delay).await;
                    let (local, remote) = tokio::io::duplex(64 * 1024);
                    self.peers.lock().unwrap().push((host.to_string(), remote));
                    Ok(local)
                }
                Script::Refuse(delay) => {
                    tokio::time::sleep(delay).await;
                    Err(Error::dial(format!("{}: connection refused", host)))
                }
                Script::Hang => std::future::pending::<Result<DuplexStream>>().await,
            }
        }
    }
}
