//! Receiving preferences of a subscribed remote track.

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::media::Dimensions;

/// Quality of a simulcasted video layer.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize, SmartDefault,
)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    /// The lowest layer.
    Low,

    /// The middle layer.
    Medium,

    /// The highest layer.
    #[default]
    High,
}

/// Settings the server applies when forwarding a remote track to this client.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct TrackSettings {
    /// Indicator whether the media should be forwarded at all.
    #[default(true)]
    pub enabled: bool,

    /// Preferred dimensions of a video track.
    pub dimensions: Option<Dimensions>,

    /// Preferred quality of a simulcasted video track.
    pub video_quality: VideoQuality,
}
