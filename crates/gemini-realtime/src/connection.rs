//! Connection state machine for a live session.
//!
//! A [`LiveConnection`] opens the socket, sends the setup message, starts the
//! receive loop and exposes the gated send operations. It does not wait for
//! the remote `setupComplete`; that arrives later as
//! [`SessionEvent::ModelSetupFinished`].

use std::sync::{Arc, PoisonError};

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};
use tokio::task::AbortHandle;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::config::SessionConfig;
use crate::error::{RealtimeError, RealtimeResult};
use crate::events::{DisconnectReason, EventEmitter, SessionEvent};
use crate::media::{MediaKind, MediaSource};
use crate::messages::{self, OutboundMessage, Role, SetupPayload};
use crate::receive_loop::ReceiveLoop;
use crate::state::{Link, SessionState};
use crate::transport::{Connector, FrameSink, WsConnector};

/// Client side of one live session.
///
/// Every method takes `&self`; share it behind an `Arc` to send from several
/// tasks while the receive loop runs.
pub struct LiveConnection {
    config: Arc<SessionConfig>,
    connector: Arc<dyn Connector>,
    link: Arc<Mutex<Link>>,
    events: EventEmitter,
    /// Abort handle of the current receive loop, kept outside `link` so drop
    /// never has to wait for the async lock.
    receive_abort: std::sync::Mutex<Option<AbortHandle>>,
}

impl LiveConnection {
    /// Create a connection using the WebSocket transport.
    ///
    /// Returns the receiving end of the session's event channel alongside it.
    pub fn new(
        config: SessionConfig,
    ) -> RealtimeResult<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Create a connection over a custom transport.
    pub fn with_connector(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
    ) -> RealtimeResult<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        config.validate()?;
        let (events, rx) = EventEmitter::channel();
        let connection = Self {
            config: Arc::new(config),
            connector,
            link: Arc::new(Mutex::new(Link::default())),
            events,
            receive_abort: std::sync::Mutex::new(None),
        };
        Ok((connection, rx))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn state(&self) -> SessionState {
        self.link.lock().await.state
    }

    /// Whether realtime media currently passes the outbound gate.
    pub async fn is_ready(&self) -> bool {
        self.link.lock().await.is_ready()
    }

    /// Open the socket, send setup and start the receive loop.
    ///
    /// Returns once the setup message has been written. Fails with
    /// [`RealtimeError::AlreadyConnected`] while any handle exists.
    pub async fn connect(&self) -> RealtimeResult<()> {
        let url = self.config.request_url()?;
        let setup = messages::encode(&OutboundMessage::Setup(self.setup_payload()))?;

        let generation = {
            let mut link = self.link.lock().await;
            if link.state != SessionState::Disconnected {
                return Err(RealtimeError::AlreadyConnected);
            }
            link.state = SessionState::Connecting;
            link.generation += 1;
            link.generation
        };

        info!(model = %self.config.model, generation, "Opening live connection");
        let (mut sink, stream) = match self.connector.open(&url).await {
            Ok(halves) => halves,
            Err(e) => {
                let mut link = self.link.lock().await;
                if link.generation == generation && link.state == SessionState::Connecting {
                    link.state = SessionState::Disconnected;
                }
                error!(error = %e, "Failed to open live connection");
                return Err(RealtimeError::ConnectionFailed(e.to_string()));
            }
        };

        let mut link = self.link.lock().await;
        if link.generation != generation || link.state != SessionState::Connecting {
            drop(link);
            info!(generation, "Connect attempt was cancelled; closing socket");
            close_quietly(sink.as_mut()).await;
            return Err(RealtimeError::ConnectAborted);
        }

        link.state = SessionState::AwaitingHandshake;
        if let Err(e) = sink.send_text(setup).await {
            link.state = SessionState::Disconnected;
            drop(link);
            error!(error = %e, "Failed to send setup message");
            close_quietly(sink.as_mut()).await;
            return Err(RealtimeError::HandshakeFailed(e.to_string()));
        }
        debug!("Setup message sent");

        let receive = ReceiveLoop {
            link: Arc::clone(&self.link),
            generation,
            events: self.events.clone(),
            retry: self.config.receive_retry.clone(),
            accept_text_frames: self.config.accept_text_frames,
        };
        let task = tokio::spawn(
            receive
                .run(stream)
                .instrument(info_span!("live_receive", generation)),
        );

        *self
            .receive_abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task.abort_handle());
        link.sink = Some(sink);
        link.receive_task = Some(task);
        link.state = SessionState::Ready;
        info!(generation, "Live session ready");
        Ok(())
    }

    /// Send a chunk of PCM audio. Dropped silently until the session is ready.
    pub async fn send_user_audio(&self, audio: Bytes) -> RealtimeResult<()> {
        self.send_media(OutboundMessage::AudioInput {
            mime_type: self.config.audio_mime_type(),
            data: audio,
            layout: self.config.media_layout,
        })
        .await
    }

    /// Send one encoded video frame. Dropped silently until the session is ready.
    pub async fn send_user_video(&self, frame: Bytes) -> RealtimeResult<()> {
        self.send_media(OutboundMessage::VideoInput {
            data: frame,
            layout: self.config.media_layout,
        })
        .await
    }

    /// Send a complete text turn.
    ///
    /// Unlike media this is not dropped: it fails with
    /// [`RealtimeError::NotReady`] when the gate is closed.
    pub async fn send_text(&self, role: Role, text: &str) -> RealtimeResult<()> {
        let mut link = self.link.lock().await;
        let sink = link.ready_sink().ok_or(RealtimeError::NotReady)?;
        let payload = messages::encode(&OutboundMessage::TextInput {
            role,
            text: text.to_string(),
        })?;
        sink.send_text(payload).await?;
        Ok(())
    }

    async fn send_media(&self, message: OutboundMessage) -> RealtimeResult<()> {
        let mut link = self.link.lock().await;
        let Some(sink) = link.ready_sink() else {
            trace!("Session not ready; dropping media chunk");
            return Ok(());
        };
        let payload = messages::encode(&message)?;
        sink.send_text(payload).await?;
        Ok(())
    }

    /// Request a normal closure and wait for the receive loop to observe it.
    ///
    /// A no-op when already disconnected. If the close is not observed within
    /// `close_timeout` the receive loop is aborted and the handle cleared here.
    pub async fn disconnect(&self) -> RealtimeResult<()> {
        let (generation, task) = {
            let mut link = self.link.lock().await;
            match link.state {
                SessionState::Disconnected => return Ok(()),
                SessionState::Closing => {
                    debug!("Disconnect already in progress");
                    return Ok(());
                }
                SessionState::Connecting => {
                    link.state = SessionState::Disconnected;
                    link.generation += 1;
                    info!("Cancelled pending connect");
                    return Ok(());
                }
                SessionState::AwaitingHandshake | SessionState::Ready => {}
            }

            link.state = SessionState::Closing;
            if let Some(sink) = link.sink.as_mut()
                && let Err(e) = sink.close().await
            {
                warn!(error = %e, "Failed to send close frame");
            }
            (link.generation, link.receive_task.take())
        };
        info!(generation, "Disconnect requested");

        let Some(mut task) = task else {
            self.finish_teardown(generation, DisconnectReason::Requested)
                .await;
            return Ok(());
        };

        match tokio::time::timeout(self.config.close_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Receive loop ended abnormally"),
            Err(_) => {
                warn!(
                    timeout_ms = self.config.close_timeout.as_millis() as u64,
                    "Close was not observed in time; aborting receive loop"
                );
                task.abort();
                self.finish_teardown(generation, DisconnectReason::CloseTimeout)
                    .await;
                return Ok(());
            }
        }

        // Covers a receive loop that exited without clearing the handle.
        self.finish_teardown(generation, DisconnectReason::Requested)
            .await;
        Ok(())
    }

    /// Push every chunk of `source` through the gated send path.
    ///
    /// Returns the number of chunks pulled from the source.
    pub async fn stream_media<M>(&self, kind: MediaKind, source: &mut M) -> RealtimeResult<usize>
    where
        M: MediaSource + ?Sized,
    {
        let mut chunks = 0;
        while let Some(chunk) = source.next_chunk().await {
            chunks += 1;
            match kind {
                MediaKind::Audio => self.send_user_audio(chunk).await?,
                MediaKind::Video => self.send_user_video(chunk).await?,
            }
        }
        debug!(chunks, ?kind, "Media source exhausted");
        Ok(chunks)
    }

    async fn finish_teardown(&self, generation: u64, reason: DisconnectReason) {
        let teardown = self.link.lock().await.teardown(generation);
        if teardown.is_some() {
            info!(?reason, "Live connection closed");
            self.events.emit(SessionEvent::Disconnected(reason));
        }
    }

    fn setup_payload(&self) -> SetupPayload {
        let generation = &self.config.generation;
        SetupPayload {
            model: self.config.model.clone(),
            response_modalities: generation.response_modalities.clone(),
            voice_name: generation.voice_name.clone(),
            language_code: generation.language_code.clone(),
            temperature: generation.temperature,
            system_instruction: self.config.system_instruction.clone(),
        }
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        let slot = self
            .receive_abort
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = slot.take() {
            task.abort();
        }
    }
}

async fn close_quietly(sink: &mut dyn FrameSink) {
    if let Err(e) = sink.close().await {
        debug!(error = %e, "Close of discarded socket failed");
    }
}
