//! Event sink that writes model audio to disk.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use gemini_realtime::{DisconnectReason, EventSink};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::oneshot;
use tracing::{error, info};

/// Appends every model audio chunk to a writer and reports when the
/// session goes away.
pub struct ModelAudioRecorder<W = BufWriter<File>> {
    writer: W,
    bytes_written: u64,
    interruptions: u32,
    transcript: String,
    disconnected: Option<oneshot::Sender<DisconnectReason>>,
}

impl ModelAudioRecorder {
    /// Create (or truncate) `path` and record into it.
    pub async fn create(
        path: &Path,
    ) -> anyhow::Result<(Self, oneshot::Receiver<DisconnectReason>)> {
        let file = File::create(path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: AsyncWrite + Unpin + Send + 'static> ModelAudioRecorder<W> {
    pub fn new(writer: W) -> (Self, oneshot::Receiver<DisconnectReason>) {
        let (tx, rx) = oneshot::channel();
        let recorder = Self {
            writer,
            bytes_written: 0,
            interruptions: 0,
            transcript: String::new(),
            disconnected: Some(tx),
        };
        (recorder, rx)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn interruptions(&self) -> u32 {
        self.interruptions
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Flush buffered audio and hand back the writer.
    pub async fn finish(mut self) -> anyhow::Result<W> {
        self.writer
            .flush()
            .await
            .context("Failed to flush model audio")?;
        info!(
            bytes = self.bytes_written,
            interruptions = self.interruptions,
            "Model audio saved"
        );
        Ok(self.writer)
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> EventSink for ModelAudioRecorder<W> {
    async fn on_model_setup_finished(&mut self) {
        info!("Model acknowledged setup");
    }

    async fn on_model_audio(&mut self, audio: Bytes) {
        match self.writer.write_all(&audio).await {
            Ok(()) => self.bytes_written += audio.len() as u64,
            Err(e) => error!(error = %e, "Failed to write model audio"),
        }
    }

    async fn on_user_interruption(&mut self) {
        self.interruptions += 1;
        info!("User interrupted the model");
    }

    async fn on_output_transcription(&mut self, text: String) {
        info!(text = %text, "Model said");
        self.transcript.push_str(&text);
    }

    async fn on_disconnected(&mut self, reason: DisconnectReason) {
        info!(?reason, "Session disconnected");
        if let Some(tx) = self.disconnected.take() {
            let _ = tx.send(reason);
        }
    }
}
