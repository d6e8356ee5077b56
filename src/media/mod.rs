//! Media tracks, their properties and device discovery.

pub mod devices;
pub mod track;

use std::sync::atomic::{AtomicU64, Ordering};

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

#[doc(inline)]
pub use self::{
    devices::{
        DevicesError, DevicesProvider, InputDeviceInfo, MediaDeviceKind,
        MediaDevices,
    },
    track::{
        local::{CaptureError, LocalVideoTrack, VideoCapturer, VideoSource},
        Lifecycle, Track, TrackDelegate, TrackState,
    },
};

/// Kind of a media carried by a [`Track`].
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio media.
    #[display(fmt = "audio")]
    Audio,

    /// Video media.
    #[display(fmt = "video")]
    Video,
}

/// Origin of a media carried by a [`Track`].
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    /// Web camera.
    #[display(fmt = "camera")]
    Camera,

    /// Microphone.
    #[display(fmt = "microphone")]
    Microphone,

    /// Captured screen (video part).
    #[display(fmt = "screen_share")]
    ScreenShare,

    /// Captured screen (audio part).
    #[display(fmt = "screen_share_audio")]
    ScreenShareAudio,

    /// Source is not reported.
    #[display(fmt = "unknown")]
    Unknown,
}

impl Default for TrackSource {
    #[inline]
    fn default() -> Self {
        Self::Unknown
    }
}

/// Width and height of a video, in pixels.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[display(fmt = "{}x{}", width, height)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Creates new [`Dimensions`].
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Coarse liveness of a subscribed remote [`Track`], as reported by the
/// server. Orthogonal to muting.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    /// Media is flowing.
    #[display(fmt = "active")]
    Active,

    /// Media is paused by the server (e.g. due to congestion).
    #[display(fmt = "paused")]
    Paused,
}

impl Default for StreamState {
    #[inline]
    fn default() -> Self {
        Self::Active
    }
}

/// End-to-end encryption applied to a published [`Track`].
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionType {
    /// No end-to-end encryption.
    #[display(fmt = "none")]
    None,

    /// AES-GCM frame encryption.
    #[display(fmt = "gcm")]
    Gcm,

    /// Application provided encryption.
    #[display(fmt = "custom")]
    Custom,
}

impl Default for EncryptionType {
    #[inline]
    fn default() -> Self {
        Self::None
    }
}

/// Server-assigned ID of a published [`Track`].
#[derive(
    Clone,
    Debug,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[from(forward)]
#[serde(transparent)]
pub struct TrackSid(pub String);

/// Process-unique ID of a [`Track`] object.
///
/// Unlike [`TrackSid`], it's known from the very creation of a [`Track`] and
/// changes when a [`Track`] is cloned.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TrackId(pub u64);

impl TrackId {
    /// Generates a new unique [`TrackId`].
    pub(crate) fn next() -> Self {
        static LAST_ID: AtomicU64 = AtomicU64::new(0);
        Self(LAST_ID.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
