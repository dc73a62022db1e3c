//! Remote -> client data pump and the shared client channel

use super::{Frame, FrameSink};
use crate::{Error, Result};
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, trace};

/// Read size for the remote -> client direction
pub const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Client sink shared by the session and its outbound pump.
///
/// Tracks whether the client is still open. Closing is idempotent and
/// best-effort: the sink is taken out exactly once and close errors are
/// swallowed.
pub struct ClientChannel<S> {
    sink: Mutex<Option<S>>,
    closed: CancellationToken,
}

impl<S: FrameSink> ClientChannel<S> {
    pub fn new(sink: S) -> Self {
        ClientChannel {
            sink: Mutex::new(Some(sink)),
            closed: CancellationToken::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Resolves once the channel has been closed by anyone
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    pub async fn send(&self, frame: Frame) -> Result<()> {
        if !self.is_open() {
            return Err(Error::stream("client closed"));
        }
        match self.sink.lock().await.as_mut() {
            Some(sink) => sink.send(frame).await,
            None => Err(Error::stream("client closed")),
        }
    }

    pub async fn close(&self) {
        self.closed.cancel();
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                trace!("Client close failed: {}", e);
            }
        }
    }
}

/// Forward remote reads to the client until either side ends.
///
/// Read errors end the loop like EOF. On exit the read half is released and
/// the client is closed if it is still open. Returns the bytes forwarded.
pub async fn pump_remote_to_client<R, S>(mut reader: R, client: Arc<ClientChannel<S>>) -> u64
where
    R: AsyncRead + Unpin,
    S: FrameSink,
{
    let mut buf = BytesMut::with_capacity(RELAY_BUFFER_SIZE);
    let mut total = 0u64;

    loop {
        buf.reserve(RELAY_BUFFER_SIZE);
        match reader.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(n) => total += n as u64,
            Err(e) => {
                trace!("Remote read ended: {}", e);
                break;
            }
        }

        if !client.is_open() {
            break;
        }
        if let Err(e) = client.send(Frame::Binary(buf.split().freeze())).await {
            trace!("Client send failed: {}", e);
            break;
        }
    }

    drop(reader);
    debug!("Remote stream ended after {} bytes", total);
    if client.is_open() {
        client.close().await;
    }
    total
}
