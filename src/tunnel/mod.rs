//! Tunnel core - handshake, connection racing and the relay pumps
//!
//! A client connection is any message stream that delivers [`Frame`]s and
//! accepts frames back through a [`FrameSink`]. [`serve`] runs one session
//! over such a pair until it is fully torn down.

mod pool;
mod pump;
mod session;
mod target;

pub use pool::{AddressPool, CandidateEndpoint};
pub use pump::{pump_remote_to_client, ClientChannel, RELAY_BUFFER_SIZE};
pub use session::{Phase, Session, SessionEvent, CONNECTED, ERR_CONNECT_FAILED, ERR_INVALID_TARGET};
pub use target::{is_connect_request, parse_target, HandshakeRequest, DEFAULT_PORT};

use crate::outbound::{ConnectionRacer, Dialer};
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::sync::Arc;

/// A discrete client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Tunnelled payload
    Binary(Bytes),
    /// Control text (handshake, acknowledgements, errors)
    Text(String),
}

/// Sending half of a client connection
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Send one frame, waiting for the transport to accept it
    async fn send(&mut self, frame: Frame) -> Result<()>;

    /// Close the connection towards the client
    async fn close(&mut self) -> Result<()>;
}

/// Handle a client connection as a tunneling session.
///
/// `inbound` ending means the client closed; an `Err` item is a transport
/// error. Returns once the session is closed and every handle is released.
pub async fn serve<D, S, I>(racer: Arc<ConnectionRacer<D>>, sink: S, inbound: I)
where
    D: Dialer,
    S: FrameSink,
    I: Stream<Item = Result<Frame>> + Unpin + Send,
{
    Session::new(racer, sink).run(inbound).await
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory client sink

    use super::{Frame, FrameSink};
    use crate::{Error, Result};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Sink that delivers frames to an unbounded channel; closing drops the sender
    pub struct ChannelSink {
        tx: Option<mpsc::UnboundedSender<Frame>>,
    }

    impl ChannelSink {
        pub fn pair() -> (Self, mpsc::UnboundedReceiver<Frame>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (ChannelSink { tx: Some(tx) }, rx)
        }
    }

    #[async_trait]
    impl FrameSink for ChannelSink {
        async fn send(&mut self, frame: Frame) -> Result<()> {
            self.tx
                .as_ref()
                .ok_or_else(|| Error::stream("sink closed"))?
                .send(frame)
                .map_err(|_| Error::stream("receiver dropped"))
        }

        async fn close(&mut self) -> Result<()> {
            self.tx.take();
            Ok(())
        }
    }
}
