//! Main Entrypoint for the Gemini Live Client
//!
//! This binary is responsible for:
//! 1. Loading the session configuration from the environment.
//! 2. Opening a live session and recording model audio to a file.
//! 3. Streaming the given audio file and video frames at capture pace.
//! 4. Disconnecting cleanly on Ctrl+C or when the service closes the session.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use gemini_live::{
    cli::Cli,
    recorder::ModelAudioRecorder,
    sources::{JpegFrames, Paced},
};
use gemini_realtime::{
    ChunkedMedia, LiveConnection, MediaKind, Role, SessionConfig, spawn_event_dispatcher,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Resolves once `Ctrl+C` is received.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Disconnecting...");
}

/// Push the configured audio and video through the session concurrently.
async fn stream_inputs(connection: Arc<LiveConnection>, cli: Cli) -> anyhow::Result<()> {
    let audio = async {
        let Some(path) = &cli.audio else {
            return Ok::<_, anyhow::Error>(0);
        };
        let pcm = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let rate = connection.config().input_sample_rate;
        let mut source = Paced::new(
            ChunkedMedia::pcm16(pcm, rate, cli.chunk_ms),
            Duration::from_millis(cli.chunk_ms as u64),
        );
        Ok(connection.stream_media(MediaKind::Audio, &mut source).await?)
    };

    let video = async {
        let mut source = Paced::new(
            JpegFrames::new(cli.frames.clone()),
            Duration::from_millis(cli.frame_interval_ms),
        );
        Ok::<_, anyhow::Error>(connection.stream_media(MediaKind::Video, &mut source).await?)
    };

    let (audio_chunks, frames) = tokio::try_join!(audio, video)?;
    info!(audio_chunks, frames, "Finished streaming local media");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Initialize Logging ---
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("Invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    // --- 2. Load Configuration ---
    let config = SessionConfig::from_env().context("Failed to load configuration")?;
    info!(model = %config.model, voice = %config.generation.voice_name, "Configuration loaded");

    // --- 3. Open the Session ---
    let (connection, events) =
        LiveConnection::new(config).context("Invalid session configuration")?;
    let connection = Arc::new(connection);
    let (recorder, disconnected) = ModelAudioRecorder::create(&cli.output).await?;
    let dispatcher = spawn_event_dispatcher(events, recorder);

    connection
        .connect()
        .await
        .context("Failed to open live session")?;

    if let Some(prompt) = &cli.prompt {
        connection
            .send_text(Role::User, prompt)
            .await
            .context("Failed to send prompt")?;
    }

    // --- 4. Stream Until Shutdown ---
    let streaming = tokio::spawn(stream_inputs(Arc::clone(&connection), cli.clone()));
    tokio::select! {
        _ = shutdown_signal() => {}
        reason = disconnected => {
            if let Ok(reason) = reason {
                warn!(?reason, "Session ended by the service");
            }
        }
    }

    streaming.abort();
    match streaming.await {
        Ok(Err(e)) => error!(error = %e, "Streaming failed"),
        Ok(Ok(())) | Err(_) => {}
    }

    connection
        .disconnect()
        .await
        .context("Failed to disconnect")?;
    drop(connection);

    let recorder = dispatcher.await.context("Event dispatcher panicked")?;
    recorder.finish().await?;
    info!(output = %cli.output.display(), "Done");
    Ok(())
}
