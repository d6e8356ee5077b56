//! Boundary with the signaling server: outgoing requests, incoming events and
//! snapshots of server-side entities.

use async_trait::async_trait;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

use crate::{
    media::{
        Dimensions, EncryptionType, MediaKind, StreamState, TrackSid,
        TrackSource,
    },
    publication::TrackSettings,
};

/// Server-assigned ID of a participant.
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
pub struct ParticipantSid(pub String);

/// Error of a signaling request.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum SignalingError {
    /// Signaling channel is closed.
    #[display(fmt = "Signaling channel is closed")]
    Closed,

    /// Server didn't respond in time.
    #[display(fmt = "Signaling request timed out")]
    Timeout,

    /// Server has rejected the request.
    #[display(fmt = "Signaling request rejected: {}", _0)]
    Rejected(String),
}

/// Client of the signaling server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// Informs the server that the published [`Track`] has been (un)muted.
    ///
    /// [`Track`]: crate::media::Track
    async fn send_mute_track(
        &self,
        sid: TrackSid,
        muted: bool,
    ) -> Result<(), SignalingError>;

    /// Requests the server to (un)subscribe from the remote [`Track`].
    ///
    /// [`Track`]: crate::media::Track
    async fn send_update_subscription(
        &self,
        sid: TrackSid,
        subscribed: bool,
    ) -> Result<(), SignalingError>;

    /// Requests the server to apply the provided [`TrackSettings`] to the
    /// subscribed remote [`Track`].
    ///
    /// [`Track`]: crate::media::Track
    async fn send_update_track_settings(
        &self,
        sid: TrackSid,
        settings: TrackSettings,
    ) -> Result<(), SignalingError>;
}

/// Server-side snapshot of a published track.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TrackInfo {
    /// ID of the track.
    pub sid: TrackSid,

    /// Kind of the track's media.
    pub kind: MediaKind,

    /// Source of the track's media.
    #[serde(default)]
    pub source: TrackSource,

    /// Name given by the publisher.
    #[serde(default)]
    pub name: String,

    /// MIME type of the published media.
    #[serde(default)]
    pub mime_type: String,

    /// Indicator whether the track is published with simulcast.
    #[serde(default)]
    pub simulcast: bool,

    /// Width of a video track. Zero if unknown.
    #[serde(default)]
    pub width: u32,

    /// Height of a video track. Zero if unknown.
    #[serde(default)]
    pub height: u32,

    /// Indicator whether the publisher has muted the track.
    #[serde(default)]
    pub muted: bool,

    /// End-to-end encryption of the track.
    #[serde(default)]
    pub encryption: EncryptionType,
}

impl TrackInfo {
    /// Returns [`Dimensions`] of a video track, if they are known.
    #[must_use]
    pub fn dimensions(&self) -> Option<Dimensions> {
        if self.kind == MediaKind::Video && self.width > 0 && self.height > 0
        {
            Some(Dimensions::new(self.width, self.height))
        } else {
            None
        }
    }
}

/// Connection state of a participant.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantState {
    /// Participant is connecting.
    Joining,

    /// Participant has joined.
    Joined,

    /// Participant has established media connection.
    Active,

    /// Participant has left.
    Disconnected,
}

impl Default for ParticipantState {
    #[inline]
    fn default() -> Self {
        Self::Joining
    }
}

/// Server-side snapshot of a participant.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ParticipantInfo {
    /// ID of the participant.
    pub sid: ParticipantSid,

    /// Application-level identity of the participant.
    pub identity: String,

    /// Display name of the participant.
    #[serde(default)]
    pub name: String,

    /// Application-defined metadata.
    #[serde(default)]
    pub metadata: String,

    /// Connection state of the participant.
    #[serde(default)]
    pub state: ParticipantState,

    /// Tracks published by the participant.
    #[serde(default)]
    pub tracks: Vec<TrackInfo>,
}

/// [`StreamState`] update of a single subscribed track.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StreamStateInfo {
    /// ID of the publishing participant.
    pub participant_sid: ParticipantSid,

    /// ID of the track.
    pub track_sid: TrackSid,

    /// New [`StreamState`] of the track.
    pub state: StreamState,
}

/// Event received from the signaling server.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SignalingEvent {
    /// Participants have joined, left or changed.
    ParticipantUpdate {
        /// Fresh snapshots of the changed participants.
        participants: Vec<ParticipantInfo>,
    },

    /// Server has (un)muted a track published by the local participant.
    TrackMuted {
        /// ID of the track.
        sid: TrackSid,

        /// New muted state.
        muted: bool,
    },

    /// [`StreamState`] of subscribed tracks has changed.
    StreamStateUpdate {
        /// Updates of the individual tracks.
        updates: Vec<StreamStateInfo>,
    },

    /// Publisher has allowed or disallowed subscription to its track.
    SubscriptionPermissionUpdate {
        /// ID of the publishing participant.
        participant_sid: ParticipantSid,

        /// ID of the track.
        track_sid: TrackSid,

        /// Indicator whether subscription is allowed.
        allowed: bool,
    },
}
