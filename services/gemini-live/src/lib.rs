//! Gemini Live Command-Line Client
//!
//! Outer application around the `gemini-realtime` library: it streams local
//! audio/video files into a live session and records what the model says
//! back. The `gemini-live` binary is a thin wrapper around these modules.

pub mod cli;
pub mod recorder;
pub mod sources;
