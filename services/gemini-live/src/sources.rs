//! Media sources backed by local files, paced like a live capture.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use gemini_realtime::MediaSource;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::warn;

/// Releases chunks from `inner` no faster than one per `period`.
pub struct Paced<S> {
    inner: S,
    ticker: Interval,
}

impl<S: MediaSource> Paced<S> {
    pub fn new(inner: S, period: Duration) -> Self {
        let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { inner, ticker }
    }
}

#[async_trait]
impl<S: MediaSource> MediaSource for Paced<S> {
    async fn next_chunk(&mut self) -> Option<Bytes> {
        self.ticker.tick().await;
        self.inner.next_chunk().await
    }
}

/// One JPEG file per chunk. Unreadable files are skipped.
pub struct JpegFrames {
    paths: VecDeque<PathBuf>,
}

impl JpegFrames {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }
}

#[async_trait]
impl MediaSource for JpegFrames {
    async fn next_chunk(&mut self) -> Option<Bytes> {
        while let Some(path) = self.paths.pop_front() {
            match tokio::fs::read(&path).await {
                Ok(data) => return Some(Bytes::from(data)),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable frame"),
            }
        }
        None
    }
}
