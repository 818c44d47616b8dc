//! Background task that reads frames for one connection handle.
//!
//! Frames are decoded and turned into events strictly in delivery order.
//! A receive failure re-checks the shared [`Link`] every time: if the handle
//! is gone (or being closed) the loop ends, otherwise the failure is treated
//! as transient and retried per [`ReceiveRetryPolicy`].

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::ReceiveRetryPolicy;
use crate::events::{DisconnectReason, EventEmitter, SessionEvent};
use crate::messages::{self, InboundMessage};
use crate::state::{Link, SessionState};
use crate::transport::{CloseInfo, FrameStream, InboundFrame, TransportError};

pub(crate) struct ReceiveLoop {
    pub(crate) link: Arc<Mutex<Link>>,
    pub(crate) generation: u64,
    pub(crate) events: EventEmitter,
    pub(crate) retry: ReceiveRetryPolicy,
    pub(crate) accept_text_frames: bool,
}

/// What to do after a failed receive.
enum AfterFailure {
    Retry,
    Stop,
}

impl ReceiveLoop {
    pub(crate) async fn run(self, mut stream: Box<dyn FrameStream>) {
        let mut failures: u32 = 0;

        loop {
            match stream.next_frame().await {
                Some(Ok(frame)) => {
                    failures = 0;
                    match frame {
                        InboundFrame::Binary(data) => self.handle_payload(&data),
                        InboundFrame::Text(text) if self.accept_text_frames => {
                            self.handle_payload(text.as_bytes())
                        }
                        InboundFrame::Text(text) => {
                            warn!(
                                len = text.len(),
                                "Received text frame of unexpected type; discarding"
                            );
                        }
                        InboundFrame::Close(info) => {
                            self.on_closed(info).await;
                            break;
                        }
                    }
                }
                Some(Err(e)) => match self.on_failure(e, &mut failures).await {
                    AfterFailure::Retry => continue,
                    AfterFailure::Stop => break,
                },
                None => {
                    self.on_closed(None).await;
                    break;
                }
            }
        }

        debug!("Receive loop ended");
    }

    fn handle_payload(&self, payload: &[u8]) {
        match messages::decode(payload) {
            Some(InboundMessage::SetupComplete) => {
                info!("Model setup finished");
                self.events.emit(SessionEvent::ModelSetupFinished);
            }
            Some(InboundMessage::AudioOutput {
                audio,
                transcription,
            }) => {
                if !audio.is_empty() {
                    trace!(bytes = audio.len(), "Model audio received");
                    self.events.emit(SessionEvent::ModelAudio(audio));
                }
                if let Some(text) = transcription {
                    self.events.emit(SessionEvent::OutputTranscription(text));
                }
            }
            Some(InboundMessage::Interrupted) => {
                debug!("User interruption detected");
                self.events.emit(SessionEvent::UserInterruption);
            }
            Some(InboundMessage::OutputTranscription(text)) => {
                self.events.emit(SessionEvent::OutputTranscription(text));
            }
            None => trace!(len = payload.len(), "Ignoring unrecognized frame"),
        }
    }

    async fn on_failure(&self, error: TransportError, failures: &mut u32) -> AfterFailure {
        let state = {
            let link = self.link.lock().await;
            link.is_live(self.generation).then_some(link.state)
        };

        match state {
            None => {
                debug!(error = %error, "Receive failed after handle was cleared; stopping");
                return AfterFailure::Stop;
            }
            Some(SessionState::Closing) => {
                debug!(error = %error, "Receive failed while closing; finishing teardown");
                self.on_closed(None).await;
                return AfterFailure::Stop;
            }
            Some(_) => {}
        }

        if !self.retry.should_retry(*failures) {
            warn!(
                error = %error,
                failures = *failures,
                "Receive retries exhausted; closing connection"
            );
            self.force_close().await;
            return AfterFailure::Stop;
        }

        *failures += 1;
        let delay = self.retry.delay_for(*failures);
        warn!(
            error = %error,
            attempt = *failures,
            delay_ms = delay.as_millis() as u64,
            "Receive failed; retrying"
        );
        tokio::time::sleep(delay).await;
        AfterFailure::Retry
    }

    /// Transport close notification: clear the handle and report it.
    async fn on_closed(&self, info: Option<CloseInfo>) {
        let teardown = self.link.lock().await.teardown(self.generation);
        let Some(teardown) = teardown else {
            debug!("Close observed after handle was already cleared");
            return;
        };

        let reason = if teardown.previous == SessionState::Closing {
            DisconnectReason::Requested
        } else {
            DisconnectReason::Remote(info)
        };
        info!(?reason, "Live connection closed");
        self.events.emit(SessionEvent::Disconnected(reason));
    }

    async fn force_close(&self) {
        let teardown = self.link.lock().await.teardown(self.generation);
        let Some(mut teardown) = teardown else {
            return;
        };
        if let Err(e) = teardown.sink.close().await {
            debug!(error = %e, "Close after exhausted retries failed");
        }
        self.events
            .emit(SessionEvent::Disconnected(DisconnectReason::RetriesExhausted));
    }
}
