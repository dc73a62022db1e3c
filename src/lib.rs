//! ws-relay - WebSocket to TCP tunneling relay
//!
//! A client opens a WebSocket, names a destination in its first text frame
//! (`CONNECT:host:port`), and from then on binary frames are relayed to and
//! from a TCP connection to that destination.
//!
//! The outbound connection is raced: a direct dial and a dial to a randomly
//! picked fallback endpoint start together and the first to connect is used.
//!
//! # Architecture
//!
//! ```text
//!        +-------------+
//!        | hub/ (axum) |   WebSocket upgrade, bearer token
//!        +------+------+
//!               |
//!        +------v------+
//!        |   tunnel/   |   session state machine, pumps,
//!        |             |   target parser, address pool
//!        +------+------+
//!               |
//!        +------v------+
//!        |  outbound/  |   TCP dialer, direct/fallback racer
//!        +-------------+
//! ```

pub mod common;
pub mod config;
pub mod hub;
pub mod outbound;
pub mod tunnel;

pub use common::error::{Error, Result};
pub use config::Config;

use hub::{AppState, RelayRacer};
use outbound::{ConnectionRacer, TcpDialer};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tunnel::AddressPool;

/// Relay version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Relay instance wiring configuration into the ingress and the racer
pub struct Relay {
    config: Arc<Config>,
    racer: Arc<RelayRacer>,
}

impl Relay {
    /// Create a new Relay from configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let pool = AddressPool::from_config(&config.fallback);
        if pool.is_empty() {
            info!(
                "No fallback endpoints configured, using {}",
                config.fallback.default
            );
        } else {
            info!(
                "Loaded {} fallback endpoints (region {})",
                pool.len(),
                config.fallback.region
            );
        }

        let dialer = TcpDialer::with_timeout(config.connect_timeout());
        let racer = Arc::new(ConnectionRacer::new(dialer, pool));

        Ok(Relay {
            config: Arc::new(config),
            racer,
        })
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .listen
            .parse()
            .map_err(|e| Error::config(format!("Invalid listen address: {}", e)))?;
        let listener = TcpListener::bind(addr).await?;

        self.serve(listener, async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
            }
        })
        .await?;

        info!("Relay stopped");
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        hub::start_server(self.app_state(), listener, shutdown).await
    }

    fn app_state(&self) -> AppState {
        AppState::new(self.config.secret(), self.racer.clone())
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Racer shared by all sessions
    pub fn racer(&self) -> &Arc<RelayRacer> {
        &self.racer
    }
}
