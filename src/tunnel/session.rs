//! Per-connection session state machine
//!
//! ```text
//! AwaitingHandshake --(CONNECT ok)--> Relaying --> Closed
//!         |                                          ^
//!         +--------(bad target / dial failure)-------+
//! ```
//!
//! Every event goes through [`Session::dispatch`]. Inbound binary frames are
//! written to the remote one at a time: the next event is not taken until
//! the current write has completed, which bounds buffering to a single frame.

use super::pump::{pump_remote_to_client, ClientChannel};
use super::target::{is_connect_request, parse_target};
use super::{Frame, FrameSink};
use crate::outbound::{ConnectionRacer, Dialer};
use crate::{Error, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Acknowledgement sent once the remote connection is up
pub const CONNECTED: &str = "CONNECTED";
/// Sent when the handshake target cannot be parsed
pub const ERR_INVALID_TARGET: &str = "ERROR: Invalid target";
/// Sent when neither the direct nor the fallback attempt connected
pub const ERR_CONNECT_FAILED: &str = "ERROR: Connection failed";

/// Session lifecycle; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingHandshake,
    Relaying,
    Closed,
}

/// Something that happened on the client connection
#[derive(Debug)]
pub enum SessionEvent {
    Binary(Bytes),
    Text(String),
    /// Client closed the connection (or it was closed from our side)
    Closed,
    /// Transport error on the client connection
    Error(Error),
}

impl From<Frame> for SessionEvent {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Binary(data) => SessionEvent::Binary(data),
            Frame::Text(text) => SessionEvent::Text(text),
        }
    }
}

impl From<Option<Result<Frame>>> for SessionEvent {
    fn from(item: Option<Result<Frame>>) -> Self {
        match item {
            Some(Ok(frame)) => frame.into(),
            Some(Err(e)) => SessionEvent::Error(e),
            None => SessionEvent::Closed,
        }
    }
}

/// One tunneling session
pub struct Session<D: Dialer, S: FrameSink> {
    phase: Phase,
    racer: Arc<ConnectionRacer<D>>,
    client: Arc<ClientChannel<S>>,
    /// Write half of the remote socket; only the session writes to it
    writer: Option<WriteHalf<D::Conn>>,
    /// Outbound pump; owns the read half
    pump: Option<JoinHandle<u64>>,
    uploaded: u64,
}

impl<D: Dialer, S: FrameSink> Session<D, S> {
    pub fn new(racer: Arc<ConnectionRacer<D>>, sink: S) -> Self {
        Session {
            phase: Phase::AwaitingHandshake,
            racer,
            client: Arc::new(ClientChannel::new(sink)),
            writer: None,
            pump: None,
            uploaded: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn client(&self) -> &Arc<ClientChannel<S>> {
        &self.client
    }

    /// Drive the session from `inbound` until it is closed
    pub async fn run<I>(mut self, mut inbound: I)
    where
        I: Stream<Item = Result<Frame>> + Unpin,
    {
        while self.phase != Phase::Closed {
            let event = tokio::select! {
                item = inbound.next() => SessionEvent::from(item),
                _ = self.client.closed() => SessionEvent::Closed,
            };
            self.dispatch(event).await;
        }
        self.close().await;
    }

    /// Apply one event to the state machine
    pub async fn dispatch(&mut self, event: SessionEvent) {
        match (self.phase, event) {
            (Phase::Closed, _) => {}
            (_, SessionEvent::Closed) => {
                debug!("Client closed");
                self.close().await;
            }
            (_, SessionEvent::Error(e)) => {
                debug!("Client transport error: {}", e);
                self.close().await;
            }
            (Phase::AwaitingHandshake, SessionEvent::Binary(data)) => {
                trace!("Dropping {} bytes received before handshake", data.len());
            }
            (Phase::Relaying, SessionEvent::Binary(data)) => {
                self.forward(data).await;
            }
            (Phase::AwaitingHandshake, SessionEvent::Text(text)) => {
                if is_connect_request(&text) {
                    self.handshake(&text).await;
                } else {
                    trace!("Ignoring non-handshake text frame");
                }
            }
            (Phase::Relaying, SessionEvent::Text(_)) => {
                trace!("Ignoring text frame while relaying");
            }
        }
    }

    async fn handshake(&mut self, text: &str) {
        let target = match parse_target(text) {
            Ok(target) => target,
            Err(e) => {
                warn!("Rejecting handshake: {}", e);
                self.reject(ERR_INVALID_TARGET).await;
                return;
            }
        };

        debug!("Connecting to {}", target);
        let outcome = match self.racer.race(&target).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{}", e);
                self.reject(ERR_CONNECT_FAILED).await;
                return;
            }
        };

        let (reader, writer) = tokio::io::split(outcome.conn);
        self.writer = Some(writer);
        self.phase = Phase::Relaying;

        if let Err(e) = self.client.send(Frame::Text(CONNECTED.to_string())).await {
            debug!("Failed to acknowledge handshake: {}", e);
            drop(reader);
            self.close().await;
            return;
        }

        info!("Relaying to {} via {} ({})", target, outcome.addr, outcome.branch);
        self.pump = Some(tokio::spawn(pump_remote_to_client(reader, self.client.clone())));
    }

    async fn reject(&mut self, message: &str) {
        if let Err(e) = self.client.send(Frame::Text(message.to_string())).await {
            trace!("Failed to send rejection: {}", e);
        }
        self.close().await;
    }

    async fn forward(&mut self, data: Bytes) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        match write_frame(writer, &data).await {
            Ok(()) => self.uploaded += data.len() as u64,
            Err(e) => {
                debug!("Remote write failed: {}", e);
                self.close().await;
            }
        }
    }

    /// Tear the session down. Safe to call any number of times.
    pub async fn close(&mut self) {
        let was = self.phase;
        self.phase = Phase::Closed;

        if let Some(pump) = self.pump.take() {
            if self.client.is_open() {
                pump.abort();
            } else if let Err(e) = pump.await {
                // Remote side ended first: the pump owns the client close
                trace!("Pump task failed: {}", e);
            }
        }
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                trace!("Remote shutdown failed: {}", e);
            }
        }
        self.client.close().await;

        if was != Phase::Closed {
            debug!("Session closed ({} bytes uploaded)", self.uploaded);
        }
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<()> {
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}
