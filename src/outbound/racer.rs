//! Direct/fallback connection racing
//!
//! Both attempts start at the same time. The first one to establish a
//! connection wins; the other is aborted, and if it had already connected its
//! socket is dropped (closed) together with the task. The race only fails
//! when both attempts fail.

use super::Dialer;
use crate::common::net::authority;
use crate::tunnel::{AddressPool, HandshakeRequest};
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

/// Which strategy produced a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// The destination the client asked for
    Direct,
    /// An entry drawn from the address pool
    Fallback,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Direct => write!(f, "direct"),
            Branch::Fallback => write!(f, "fallback"),
        }
    }
}

/// The winning connection of a race
pub struct RaceOutcome<C> {
    pub conn: C,
    pub branch: Branch,
    /// Dialed `host:port`
    pub addr: String,
}

impl<C> fmt::Debug for RaceOutcome<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaceOutcome")
            .field("branch", &self.branch)
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

/// Races a direct dial against a fallback dial
pub struct ConnectionRacer<D> {
    dialer: Arc<D>,
    pool: Arc<AddressPool>,
}

impl<D: Dialer> ConnectionRacer<D> {
    pub fn new(dialer: D, pool: AddressPool) -> Self {
        ConnectionRacer {
            dialer: Arc::new(dialer),
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &AddressPool {
        &self.pool
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    /// Connect to `target`, directly or through a fallback endpoint.
    ///
    /// Both candidates are always attempted, even when they name the same
    /// destination.
    pub async fn race(&self, target: &HandshakeRequest) -> Result<RaceOutcome<D::Conn>> {
        let fallback = self.pool.pick_fallback();
        let candidates = [
            (Branch::Direct, target.host.clone(), target.port),
            (Branch::Fallback, fallback.host.clone(), fallback.port_or(target.port)),
        ];

        let mut attempts = JoinSet::new();
        for (branch, host, port) in candidates {
            let dialer = self.dialer.clone();
            attempts.spawn(async move {
                let result = dialer.dial(&host, port).await;
                (branch, authority(&host, port), result)
            });
        }

        let mut failures = Vec::with_capacity(2);
        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok((branch, addr, Ok(conn))) => {
                    debug!("{} wins race for {} via {}", branch, target, addr);
                    if !attempts.is_empty() {
                        debug!("Discarding {} pending attempt(s) for {}", attempts.len(), target);
                    }
                    // Drop aborts the loser; an already-connected loser is closed with it
                    drop(attempts);
                    return Ok(RaceOutcome { conn, branch, addr });
                }
                Ok((branch, addr, Err(e))) => {
                    debug!("{} attempt for {} via {} failed: {}", branch, target, addr, e);
                    failures.push(format!("{} {}: {}", branch, addr, e));
                }
                Err(e) => {
                    failures.push(format!("dial task failed: {}", e));
                }
            }
        }

        Err(Error::dial(format!(
            "all attempts for {} failed ({})",
            target,
            failures.join("; ")
        )))
    }
}
