//! Gemini Live Client Library Crate
//!
//! Client-side driver for a persistent, bidirectional media session with the
//! Gemini Live API. A [`LiveConnection`] opens the socket, sends the `setup`
//! handshake, runs a background receive loop that turns inbound frames into
//! [`SessionEvent`]s, and gates outbound audio/video until setup has gone out.
//!
//! ```no_run
//! use gemini_realtime::{LiveConnection, SessionConfig, SessionEvent};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let (connection, mut events) = LiveConnection::new(SessionConfig::from_env()?)?;
//! connection.connect().await?;
//! connection.send_user_audio(bytes::Bytes::from(vec![0u8; 3200])).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::ModelAudio(pcm) = event {
//!         println!("{} bytes of model audio", pcm.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod media;
pub mod messages;
mod receive_loop;
pub mod state;
pub mod transport;

pub use config::{
    ConfigError, GenerationConfig, MediaChunkLayout, ReceiveRetryPolicy, ResponseModality,
    SessionConfig,
};
pub use connection::LiveConnection;
pub use error::{RealtimeError, RealtimeResult};
pub use events::{DisconnectReason, EventSink, SessionEvent, dispatch, spawn_event_dispatcher};
pub use media::{ChunkedMedia, MediaKind, MediaSource};
pub use messages::{InboundMessage, OutboundMessage, Role};
pub use state::SessionState;
pub use transport::{
    CloseInfo, Connector, FrameSink, FrameStream, InboundFrame, TransportError, WsConnector,
};
