//! Scripted in-memory transport for connection tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use bytes::Bytes;
use gemini_realtime::{
    CloseInfo, Connector, FrameSink, FrameStream, InboundFrame, SessionConfig, SessionEvent,
    TransportError,
};
use tokio::sync::{Notify, mpsc};
use url::Url;

type Inbound = Result<InboundFrame, TransportError>;

#[derive(Default)]
struct Inner {
    urls: Mutex<Vec<Url>>,
    sent: Mutex<Vec<String>>,
    inbound: Mutex<Option<mpsc::UnboundedSender<Inbound>>>,
    opens: AtomicUsize,
    polls: AtomicUsize,
    closes: AtomicUsize,
    fail_open: AtomicBool,
    fail_send: AtomicBool,
    close_ack: AtomicBool,
    hold_open: AtomicBool,
    release_open: Notify,
}

/// Connector whose transports record outbound frames and replay scripted
/// inbound frames.
#[derive(Clone, Default)]
pub struct MockConnector {
    inner: Arc<Inner>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every `close()` with a normal-closure frame, like a live peer.
    pub fn with_close_ack(self) -> Self {
        self.inner.close_ack.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.inner.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.inner.fail_send.store(fail, Ordering::SeqCst);
    }

    /// Park `open()` until [`MockConnector::release_open`] is called.
    pub fn hold_open(&self) {
        self.inner.hold_open.store(true, Ordering::SeqCst);
    }

    pub fn release_open(&self) {
        self.inner.hold_open.store(false, Ordering::SeqCst);
        self.inner.release_open.notify_one();
    }

    pub fn push(&self, frame: Inbound) {
        if let Some(tx) = self.inner.inbound.lock().unwrap().as_ref() {
            let _ = tx.send(frame);
        }
    }

    pub fn push_json(&self, json: &str) {
        self.push(Ok(InboundFrame::Binary(Bytes::copy_from_slice(
            json.as_bytes(),
        ))));
    }

    pub fn push_error(&self) {
        self.push(Err(TransportError::Receive("connection reset".to_string())));
    }

    /// Drop the inbound side so the stream reports the transport as gone.
    pub fn drop_transport(&self) {
        self.inner.inbound.lock().unwrap().take();
    }

    pub fn sent(&self) -> Vec<String> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    pub fn urls(&self) -> Vec<Url> {
        self.inner.urls.lock().unwrap().clone()
    }

    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.inner.polls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Whether the most recently opened stream has been dropped by its reader.
    pub fn stream_dropped(&self) -> bool {
        self.inner
            .inbound
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| tx.is_closed())
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(
        &self,
        url: &Url,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.urls.lock().unwrap().push(url.clone());

        if self.inner.hold_open.load(Ordering::SeqCst) {
            self.inner.release_open.notified().await;
        }
        if self.inner.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::Open("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.inbound.lock().unwrap() = Some(tx);
        Ok((
            Box::new(MockSink {
                inner: Arc::clone(&self.inner),
            }),
            Box::new(MockStream {
                inner: Arc::clone(&self.inner),
                rx,
            }),
        ))
    }
}

struct MockSink {
    inner: Arc<Inner>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_text(&mut self, payload: String) -> Result<(), TransportError> {
        if self.inner.fail_send.load(Ordering::SeqCst) {
            return Err(TransportError::Send("broken pipe".to_string()));
        }
        self.inner.sent.lock().unwrap().push(payload);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        if self.inner.close_ack.load(Ordering::SeqCst)
            && let Some(tx) = self.inner.inbound.lock().unwrap().as_ref()
        {
            let _ = tx.send(Ok(InboundFrame::Close(Some(CloseInfo {
                code: 1000,
                reason: String::new(),
            }))));
        }
        Ok(())
    }
}

struct MockStream {
    inner: Arc<Inner>,
    rx: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next_frame(&mut self) -> Option<Inbound> {
        self.inner.polls.fetch_add(1, Ordering::SeqCst);
        self.rx.recv().await
    }
}

pub fn test_config() -> SessionConfig {
    SessionConfig::new("test-key")
        .with_endpoint("wss://live.example.test/ws")
        .with_system_instruction("You are a patient tutor.")
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(30), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

pub fn audio_frame(pcm: &[u8]) -> String {
    serde_json::json!({
        "serverContent": {
            "modelTurn": {
                "parts": [{ "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": BASE64_STANDARD.encode(pcm) } }]
            }
        }
    })
    .to_string()
}

/// Yield until `condition` holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}
