//! Command-line arguments for the `gemini-live` binary.
//!
//! Session settings (API key, model, voice, ...) come from the environment
//! via `SessionConfig::from_env`; the flags here only describe what to stream
//! and where to put the reply.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Stream local media to a Gemini Live session")]
pub struct Cli {
    /// Raw PCM16 mono file sent as user audio.
    #[arg(long)]
    pub audio: Option<PathBuf>,

    /// JPEG frames sent as user video, in order.
    #[arg(long = "frame")]
    pub frames: Vec<PathBuf>,

    /// Optional text turn sent right after setup.
    #[arg(long)]
    pub prompt: Option<String>,

    /// Milliseconds of audio per chunk; chunks are paced in real time.
    #[arg(long, default_value_t = 100)]
    pub chunk_ms: u32,

    /// Milliseconds between video frames.
    #[arg(long, default_value_t = 1000)]
    pub frame_interval_ms: u64,

    /// Where received model audio (raw PCM) is written.
    #[arg(long, default_value = "model_audio.pcm")]
    pub output: PathBuf,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
