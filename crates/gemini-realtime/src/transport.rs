//! Socket transport used by the live session.
//!
//! The connection state machine only talks to the traits in this module, so
//! the WebSocket implementation can be swapped for an in-memory double in
//! tests. A transport is opened by a [`Connector`] and split into a
//! [`FrameSink`] (owned by the state machine, guarded by its lock) and a
//! [`FrameStream`] (owned by the receive loop).

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace};
use url::Url;

/// Close code for a normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to open socket: {0}")]
    Open(String),

    #[error("failed to send frame: {0}")]
    Send(String),

    #[error("failed to receive frame: {0}")]
    Receive(String),

    #[error("socket is closed")]
    Closed,
}

/// Close code and reason reported by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// A frame delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Binary(Bytes),
    Text(String),
    Close(Option<CloseInfo>),
}

/// Write half of an open transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Transmit one text frame.
    async fn send_text(&mut self, payload: String) -> Result<(), TransportError>;

    /// Request a normal-closure shutdown. Completion is observed on the
    /// matching [`FrameStream`], not here.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of an open transport.
#[async_trait]
pub trait FrameStream: Send {
    /// Wait for the next frame.
    ///
    /// `None` means the transport is gone and will never yield again.
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>>;
}

/// Opens transports to the service endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        url: &Url,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError>;
}

// =============================================================================
// WebSocket implementation
// =============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

pub struct WsFrameSink {
    sink: SplitSink<WsStream, Message>,
}

pub struct WsFrameStream {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(
        &self,
        url: &Url,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError> {
        let (ws_stream, response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Open(e.to_string()))?;
        info!(status = %response.status(), host = ?url.host_str(), "Live socket opened");

        let (sink, stream) = ws_stream.split();
        Ok((
            Box::new(WsFrameSink { sink }),
            Box::new(WsFrameStream { stream }),
        ))
    }
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send_text(&mut self, payload: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| match e {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                    TransportError::Closed
                }
                other => TransportError::Send(other.to_string()),
            })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        match self.sink.send(Message::Close(Some(frame))).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                debug!("Close requested on a socket that is already closed");
                Ok(())
            }
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }
}

#[async_trait]
impl FrameStream for WsFrameStream {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            };

            let frame = match message {
                Message::Binary(data) => InboundFrame::Binary(data),
                Message::Text(text) => InboundFrame::Text(text.as_str().to_owned()),
                Message::Close(frame) => InboundFrame::Close(frame.map(|f| CloseInfo {
                    code: u16::from(f.code),
                    reason: f.reason.as_str().to_owned(),
                })),
                // tungstenite answers pings itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    trace!("Skipping control frame");
                    continue;
                }
            };
            return Some(Ok(frame));
        }
    }
}
