//! WebSocket entry point
//!
//! Upgrades any request carrying `Upgrade: websocket` and runs a tunneling
//! session over it. Plain requests get a health banner on `/` and `426`
//! everywhere else.

use super::AppState;
use crate::tunnel::{self, Frame, FrameSink};
use crate::{Error, Result};
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::future;
use futures::stream::{SplitSink, Stream, StreamExt};
use futures_util::SinkExt;
use std::net::SocketAddr;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

/// Body of the health page
pub const ACTIVE_BANNER: &str = "ws-relay active";

/// Handler for every route
pub async fn tunnel_entry(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    uri: Uri,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(ws) => {
            let peer = peer
                .map(|ConnectInfo(addr)| addr.to_string())
                .unwrap_or_else(|| "-".to_string());
            ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
        }
        None if uri.path() == "/" => (StatusCode::OK, ACTIVE_BANNER).into_response(),
        None => (StatusCode::UPGRADE_REQUIRED, "Expected WebSocket").into_response(),
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, peer: String) {
    let id = Uuid::new_v4();
    let span = info_span!("session", %id, %peer);

    async move {
        debug!("WebSocket session opened");
        let (sink, stream) = socket.split();
        tunnel::serve(state.racer, WsSink(sink), inbound_frames(stream)).await;
        debug!("WebSocket session finished");
    }
    .instrument(span)
    .await
}

/// Map WebSocket messages to frames; a close message ends the stream
fn inbound_frames<S>(stream: S) -> impl Stream<Item = Result<Frame>> + Unpin + Send
where
    S: Stream<Item = std::result::Result<Message, axum::Error>> + Unpin + Send,
{
    stream
        .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(Bytes::from(data)))),
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
                Ok(_) => None,
                Err(e) => Some(Err(Error::from(e))),
            })
        })
}

/// Sending half of an upgraded WebSocket
pub struct WsSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Binary(data) => Message::Binary(data.to_vec()),
            Frame::Text(text) => Message::Text(text),
        };
        self.0.send(message).await.map_err(Error::from)
    }

    async fn close(&mut self) -> Result<()> {
        self.0.close().await.map_err(Error::from)
    }
}
