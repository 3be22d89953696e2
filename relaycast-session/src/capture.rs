//! Capture/publish adapter
//!
//! Bridges an upstream source that is already decoding media (an HLS
//! playlist, a camera) into a set of publishable tracks. Publishing is
//! deferred until the source is actually producing frames: enough
//! buffered data, a non-zero decoded frame size, and at least one track.
//! Both waits are bounded; exceeding either one is
//! `Error::UpstreamNotReady`, never a silent no-op.

use relaycast_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// A single media track exposed by the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub kind: String,
}

/// Upstream media source already rendering a decoded stream.
///
/// Implementations answer from their current state; the adapter owns all
/// polling and timing.
pub trait MediaSource: Send + Sync {
    /// Whether enough data is buffered to play through
    fn is_buffered(&self) -> bool;

    /// Decoded frame size in pixels, (0, 0) until the first frame
    fn frame_size(&self) -> (u32, u32);

    /// Snapshot of the tracks currently exposed by the source
    fn tracks(&self) -> Vec<TrackInfo>;
}

/// Polling bounds for [`CaptureAdapter::acquire`]
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Interval between buffering/frame-size checks
    pub readiness_poll: Duration,
    /// Interval between track snapshots
    pub track_poll: Duration,
    /// Track snapshots taken before giving up
    pub max_track_attempts: u32,
    /// Hard deadline for the whole acquisition
    pub acquire_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            readiness_poll: Duration::from_millis(200),
            track_poll: Duration::from_millis(100),
            max_track_attempts: 20,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// Turns a [`MediaSource`] into publishable tracks once it is ready
pub struct CaptureAdapter {
    source: Arc<dyn MediaSource>,
    config: CaptureConfig,
}

impl CaptureAdapter {
    pub fn new(source: Arc<dyn MediaSource>) -> Self {
        Self::with_config(source, CaptureConfig::default())
    }

    pub fn with_config(source: Arc<dyn MediaSource>, config: CaptureConfig) -> Self {
        Self { source, config }
    }

    /// Wait for the source to become publishable and return its tracks.
    ///
    /// Fails with `UpstreamNotReady` when the hard deadline elapses or
    /// the track wait exhausts its attempts. The adapter holds no state,
    /// so a failed acquisition leaves nothing behind and the caller may
    /// simply retry.
    pub async fn acquire(&self) -> Result<Vec<TrackInfo>> {
        match tokio::time::timeout(self.config.acquire_timeout, self.wait_for_tracks()).await {
            Ok(result) => result,
            Err(_) => Err(Error::UpstreamNotReady(format!(
                "source not publishable within {:?}",
                self.config.acquire_timeout
            ))),
        }
    }

    async fn wait_for_tracks(&self) -> Result<Vec<TrackInfo>> {
        loop {
            let (width, height) = self.source.frame_size();
            if self.source.is_buffered() && width > 0 && height > 0 {
                debug!(width, height, "Source buffered with decoded frames");
                break;
            }
            trace!("Source not ready, polling again");
            tokio::time::sleep(self.config.readiness_poll).await;
        }

        for attempt in 0..self.config.max_track_attempts {
            let tracks = self.source.tracks();
            if !tracks.is_empty() {
                debug!(tracks = tracks.len(), attempt, "Capture acquired");
                return Ok(tracks);
            }
            tokio::time::sleep(self.config.track_poll).await;
        }

        Err(Error::UpstreamNotReady(format!(
            "no media tracks after {} attempts",
            self.config.max_track_attempts
        )))
    }
}
