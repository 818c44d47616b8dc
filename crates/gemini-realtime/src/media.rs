//! Sources of outbound media.
//!
//! Capture and encoding happen outside this crate. A [`MediaSource`] only
//! hands over ready-to-send chunks (PCM audio or JPEG frames).

use async_trait::async_trait;
use bytes::Bytes;

/// Which realtime input a chunk is sent as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Producer of wire-ready media chunks.
#[async_trait]
pub trait MediaSource: Send {
    /// The next chunk, or `None` once the source is exhausted.
    async fn next_chunk(&mut self) -> Option<Bytes>;
}

/// In-memory buffer handed out in fixed-size chunks.
///
/// The last chunk may be shorter. Chunks share the original allocation.
#[derive(Debug, Clone)]
pub struct ChunkedMedia {
    remaining: Bytes,
    chunk_size: usize,
}

impl ChunkedMedia {
    /// A `chunk_size` of zero yields the whole buffer as a single chunk.
    pub fn new(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        let remaining = data.into();
        let chunk_size = if chunk_size == 0 {
            remaining.len().max(1)
        } else {
            chunk_size
        };
        Self {
            remaining,
            chunk_size,
        }
    }

    /// PCM16 mono chunks covering `millis` of audio at `sample_rate`.
    pub fn pcm16(data: impl Into<Bytes>, sample_rate: u32, millis: u32) -> Self {
        let samples = (sample_rate as u64 * millis as u64 / 1000) as usize;
        Self::new(data, samples * 2)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }
}

#[async_trait]
impl MediaSource for ChunkedMedia {
    async fn next_chunk(&mut self) -> Option<Bytes> {
        if self.remaining.is_empty() {
            return None;
        }
        let take = self.chunk_size.min(self.remaining.len());
        Some(self.remaining.split_to(take))
    }
}
