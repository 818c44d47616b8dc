//! Session events and the sink that consumes them.
//!
//! The receive loop never calls user code directly. It pushes
//! [`SessionEvent`]s into an unbounded channel and moves on, so a consumer
//! that falls behind never stalls frame ingestion or teardown. The owner
//! either drains the receiver itself or hands it to
//! [`spawn_event_dispatcher`] together with an [`EventSink`].

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::transport::CloseInfo;

/// Why a connection handle was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called and the close was observed.
    Requested,
    /// The service or the network closed the socket.
    Remote(Option<CloseInfo>),
    /// The receive retry policy gave up.
    RetriesExhausted,
    /// The close was not observed within the configured timeout.
    CloseTimeout,
}

/// Notification emitted by a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The service acknowledged the setup message.
    ModelSetupFinished,
    /// A chunk of synthesized model audio.
    ModelAudio(Bytes),
    /// The user started speaking over the model; local playback should stop.
    UserInterruption,
    /// Transcript of the model's spoken output.
    OutputTranscription(String),
    Disconnected(DisconnectReason),
}

/// Sending side of the event channel.
#[derive(Debug, Clone)]
pub(crate) struct EventEmitter {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventEmitter {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue an event without waiting on the consumer.
    pub(crate) fn emit(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            trace!("Event receiver dropped; discarding event");
        }
    }
}

/// Observer for session events.
///
/// Every method defaults to a no-op so implementors only override what they
/// care about.
#[async_trait]
pub trait EventSink: Send + 'static {
    async fn on_model_setup_finished(&mut self) {}

    async fn on_model_audio(&mut self, _audio: Bytes) {}

    async fn on_user_interruption(&mut self) {}

    async fn on_output_transcription(&mut self, _text: String) {}

    async fn on_disconnected(&mut self, _reason: DisconnectReason) {}
}

/// Forward one event to the matching sink method.
pub async fn dispatch<S: EventSink + ?Sized>(sink: &mut S, event: SessionEvent) {
    match event {
        SessionEvent::ModelSetupFinished => sink.on_model_setup_finished().await,
        SessionEvent::ModelAudio(audio) => sink.on_model_audio(audio).await,
        SessionEvent::UserInterruption => sink.on_user_interruption().await,
        SessionEvent::OutputTranscription(text) => sink.on_output_transcription(text).await,
        SessionEvent::Disconnected(reason) => sink.on_disconnected(reason).await,
    }
}

/// Drain `events` into `sink` on a separate task, in delivery order.
///
/// The task ends when every sender is gone, returning the sink.
pub fn spawn_event_dispatcher<S: EventSink>(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    mut sink: S,
) -> JoinHandle<S> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            dispatch(&mut sink, event).await;
        }
        sink
    })
}
