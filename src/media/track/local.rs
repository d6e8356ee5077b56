//! Locally captured video [`Track`].

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use derive_more::Display;
use log::{debug, warn};
use tracerr::Traced;

use crate::media::{Dimensions, MediaKind, TrackId, TrackSource};

use super::{Lifecycle, Track};

/// Error of a [`VideoCapturer`].
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum CaptureError {
    /// Capture device couldn't be started.
    #[display(fmt = "Failed to start capturing: {}", _0)]
    StartFailed(String),

    /// Capture device couldn't be stopped.
    #[display(fmt = "Failed to stop capturing: {}", _0)]
    StopFailed(String),
}

/// Capture device producing frames into a [`VideoSource`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoCapturer: Send + Sync {
    /// Acquires the capture device and starts producing frames.
    async fn start_capture(&self) -> Result<(), CaptureError>;

    /// Stops producing frames and releases the capture device.
    async fn stop_capture(&self) -> Result<(), CaptureError>;
}

/// Sink of captured frames, shared between a [`LocalVideoTrack`] and its
/// clones.
#[derive(Debug)]
pub struct VideoSource {
    /// Requested capture resolution.
    dimensions: Dimensions,
}

impl VideoSource {
    /// Creates a new [`VideoSource`] for the provided capture resolution.
    #[inline]
    #[must_use]
    pub fn new(dimensions: Dimensions) -> Self {
        Self { dimensions }
    }

    /// Returns the requested capture resolution.
    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }
}

/// Video [`Track`] bound to a [`VideoCapturer`].
///
/// Capturer is started (stopped) only when the [`Track`] itself actually
/// transitions to [`Lifecycle::Started`] ([`Lifecycle::Stopped`]), so
/// repeated calls never start (stop) the device twice. If the capturer fails,
/// the [`Track`] is rolled back to its previous [`Lifecycle`] stage.
pub struct LocalVideoTrack {
    /// Underlying [`Track`].
    track: Arc<Track>,

    /// Capture device.
    capturer: Arc<dyn VideoCapturer>,

    /// Sink of the captured frames.
    source: Arc<VideoSource>,
}

impl LocalVideoTrack {
    /// Creates a new [`LocalVideoTrack`].
    pub fn new<N: Into<String>>(
        name: N,
        source: TrackSource,
        capturer: Arc<dyn VideoCapturer>,
        video_source: Arc<VideoSource>,
    ) -> Self {
        let track = Track::new(MediaKind::Video, source, name);
        track.set_dimensions(Some(video_source.dimensions()));
        Self {
            track,
            capturer,
            source: video_source,
        }
    }

    /// Returns the underlying [`Track`].
    #[inline]
    #[must_use]
    pub fn track(&self) -> &Arc<Track> {
        &self.track
    }

    /// Returns the shared [`VideoSource`].
    #[inline]
    #[must_use]
    pub fn video_source(&self) -> &Arc<VideoSource> {
        &self.source
    }

    /// Returns the shared [`VideoCapturer`].
    #[inline]
    #[must_use]
    pub fn capturer(&self) -> &Arc<dyn VideoCapturer> {
        &self.capturer
    }

    /// Starts this [`LocalVideoTrack`] and its capturer.
    ///
    /// Returns `false` if it's started already.
    ///
    /// # Errors
    ///
    /// With [`CaptureError`] if the capturer fails to start. The [`Track`] is
    /// rolled back to its previous [`Lifecycle`] stage then.
    pub async fn start(&self) -> Result<bool, Traced<CaptureError>> {
        let _guard = self.track.lock_lifecycle().await;
        let prev = match self.track.transition(Lifecycle::Started) {
            Some(prev) => prev,
            None => return Ok(false),
        };
        if let Err(e) = self.capturer.start_capture().await {
            warn!("Track {} failed to start capturing: {}", self.id(), e);
            self.track.restore_lifecycle(prev);
            return Err(tracerr::new!(e));
        }
        debug!("Track {} started capturing", self.id());
        Ok(true)
    }

    /// Stops this [`LocalVideoTrack`] and its capturer.
    ///
    /// Returns `false` if it isn't started.
    ///
    /// # Errors
    ///
    /// With [`CaptureError`] if the capturer fails to stop. The [`Track`]
    /// stays [`Lifecycle::Started`] then.
    pub async fn stop(&self) -> Result<bool, Traced<CaptureError>> {
        let _guard = self.track.lock_lifecycle().await;
        let prev = match self.track.transition(Lifecycle::Stopped) {
            Some(prev) => prev,
            None => return Ok(false),
        };
        if let Err(e) = self.capturer.stop_capture().await {
            warn!("Track {} failed to stop capturing: {}", self.id(), e);
            self.track.restore_lifecycle(prev);
            return Err(tracerr::new!(e));
        }
        debug!("Track {} stopped capturing", self.id());
        Ok(true)
    }

    /// Returns [`TrackId`] of the underlying [`Track`].
    #[inline]
    fn id(&self) -> TrackId {
        self.track.id()
    }
}

impl Clone for LocalVideoTrack {
    /// Creates a new [`LocalVideoTrack`] with a new identity, sharing the
    /// capturer and [`VideoSource`] of this one.
    fn clone(&self) -> Self {
        Self::new(
            self.track.name(),
            self.track.source(),
            Arc::clone(&self.capturer),
            Arc::clone(&self.source),
        )
    }
}

impl fmt::Debug for LocalVideoTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalVideoTrack")
            .field("track", &self.track)
            .field("source", &self.source)
            .finish()
    }
}
