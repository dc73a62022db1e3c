//! Ingress (hub) - accepts WebSocket clients and hands them to the tunnel
//!
//! Every path is served by one handler: upgrade requests become tunneling
//! sessions, anything else gets the health banner or `426`.

mod auth;
mod ws;

pub use auth::{auth_middleware, is_websocket_upgrade};
pub use ws::{tunnel_entry, WsSink, ACTIVE_BANNER};

use crate::outbound::{ConnectionRacer, TcpDialer};
use crate::Result;
use axum::{middleware, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Racer used by live sessions
pub type RelayRacer = ConnectionRacer<TcpDialer>;

/// State shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Bearer token for upgrade requests
    pub secret: Option<Arc<str>>,
    /// Direct/fallback racer shared by every session
    pub racer: Arc<RelayRacer>,
}

impl AppState {
    pub fn new(secret: Option<&str>, racer: Arc<RelayRacer>) -> Self {
        AppState {
            secret: secret.map(Arc::from),
            racer,
        }
    }
}

/// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .fallback(tunnel_entry)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router on `listener` until `shutdown` resolves
pub async fn start_server<F>(state: AppState, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    info!("Accepting WebSocket clients on {}", listener.local_addr()?);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}
