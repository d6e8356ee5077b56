//! Binding of a media [`Track`] to a [`Participant`].

pub mod settings;

use std::{
    fmt,
    sync::{Arc, Mutex, Weak},
};

use derive_more::{Display, From};
use futures::stream::BoxStream;
use log::{debug, warn};
use medea_reactive::StateSync;
use tracerr::Traced;

use crate::{
    errors::Error,
    media::{
        Dimensions, EncryptionType, MediaKind, StreamState, Track,
        TrackDelegate, TrackSid, TrackSource, TrackState,
    },
    participant::Participant,
    room::Room,
    rpc::TrackInfo,
    utils::{lock, MainQueue, ObjectChanged},
};

#[doc(inline)]
pub use self::settings::{TrackSettings, VideoQuality};

/// Side which has published a [`Track`].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Origin {
    /// Published by this client.
    #[display(fmt = "local")]
    Local,

    /// Published by some other client.
    #[display(fmt = "remote")]
    Remote,
}

/// Error of a [`Publication`] having lost its [`Participant`], which happens
/// after the [`Participant`] is disconnected.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[display(fmt = "Participant of the publication is gone")]
pub struct MissingParticipantError;

/// Errors of [`Publication`] operations.
#[derive(Clone, Debug, Display, Eq, From, PartialEq)]
pub enum PublicationError {
    /// Operation is allowed for [`Origin::Local`] publications only.
    #[display(fmt = "Operation is allowed for local publications only")]
    #[from(ignore)]
    NotLocal,

    /// Operation is allowed for [`Origin::Remote`] publications only.
    #[display(fmt = "Operation is allowed for remote publications only")]
    #[from(ignore)]
    NotRemote,

    /// [`Publication`] has no [`Track`] attached.
    #[display(fmt = "Publication has no Track")]
    #[from(ignore)]
    NoTrack,

    /// Remote [`Track`] is not subscribed.
    #[display(fmt = "Remote track is not subscribed")]
    #[from(ignore)]
    NotSubscribed,

    /// Previous [`TrackSettings`] update is not acknowledged yet.
    #[display(fmt = "Track settings are being sent already")]
    #[from(ignore)]
    SettingsUpdateInProgress,

    /// [`Room`] of the [`Participant`] is gone.
    #[display(fmt = "Room of the publication is gone")]
    #[from(ignore)]
    RoomGone,

    /// [`Participant`] of the [`Publication`] is gone.
    #[display(fmt = "{}", _0)]
    MissingParticipant(MissingParticipantError),

    /// Signaling request has failed.
    #[display(fmt = "Signaling request failed: {}", _0)]
    Signaling(crate::rpc::SignalingError),
}

/// State of a [`Publication`].
///
/// `sid`, kind and source of a [`Publication`] never change, so they are not
/// a part of its state. Muted state is not stored either, being always
/// derived from the [`Track`].
#[derive(Clone, Debug, PartialEq)]
pub struct PublicationState {
    /// Attached [`Track`]. For a remote [`Publication`] its presence means
    /// being subscribed.
    pub track: Option<Arc<Track>>,

    /// Name given by the publisher.
    pub name: String,

    /// MIME type of the published media.
    pub mime_type: String,

    /// Indicator whether the [`Track`] is published with simulcast.
    pub simulcasted: bool,

    /// Dimensions of a video [`Track`], if known.
    pub dimensions: Option<Dimensions>,

    /// Indicator whether the publisher allows subscribing to this
    /// [`Publication`].
    pub subscription_allowed: bool,

    /// Liveness of a subscribed remote [`Track`].
    pub stream_state: StreamState,

    /// Receiving preferences of a remote [`Track`].
    pub track_settings: TrackSettings,

    /// Indicator whether a [`TrackSettings`] update is being sent.
    pub is_sending_track_settings: bool,

    /// Last subscription preference requested by the user (remote only).
    pub prefer_subscribed: Option<bool>,

    /// Muted state reported by the server (remote only).
    pub metadata_muted: bool,

    /// End-to-end encryption of the [`Track`].
    pub encryption_type: EncryptionType,

    /// The latest [`TrackInfo`] snapshot received from the server.
    pub latest_info: TrackInfo,
}

impl PublicationState {
    /// Builds the initial [`PublicationState`] out of the provided
    /// [`TrackInfo`].
    fn new(info: TrackInfo) -> Self {
        Self {
            track: None,
            name: info.name.clone(),
            mime_type: info.mime_type.clone(),
            simulcasted: info.simulcast,
            dimensions: info.dimensions(),
            subscription_allowed: true,
            stream_state: StreamState::Active,
            track_settings: TrackSettings::default(),
            is_sending_track_settings: false,
            prefer_subscribed: None,
            metadata_muted: info.muted,
            encryption_type: info.encryption,
            latest_info: info,
        }
    }
}

/// Binding of a [`Track`] to a [`Participant`].
///
/// Reacts on [`Track`] changes, mirrors them to the observers of its
/// [`Participant`] and [`Room`], and issues the required signaling requests.
pub struct Publication {
    /// ID of the published [`Track`].
    sid: TrackSid,

    /// Kind of the published media.
    kind: MediaKind,

    /// Source of the published media.
    source: TrackSource,

    /// Side which has published the [`Track`].
    origin: Origin,

    /// Current [`PublicationState`].
    state: StateSync<PublicationState>,

    /// [`Participant`] this [`Publication`] belongs to.
    participant: Weak<Participant>,

    /// Queue for UI-facing notifications.
    main_queue: MainQueue,

    /// UI-facing change notifications of this [`Publication`].
    changed: ObjectChanged,

    /// Serializes [`Publication::set_track`] calls.
    track_lock: Mutex<()>,

    /// Weak reference to this [`Publication`], registered as a
    /// [`TrackDelegate`].
    me: Weak<Publication>,
}

impl Publication {
    /// Creates a new [`Publication`] out of the provided [`TrackInfo`] with an
    /// optional initially attached [`Track`].
    pub(crate) fn new(
        info: TrackInfo,
        track: Option<Arc<Track>>,
        origin: Origin,
        participant: Weak<Participant>,
        main_queue: MainQueue,
    ) -> Arc<Self> {
        let publication = Arc::new_cyclic(|me: &Weak<Self>| {
            let hook = me.clone();
            Self {
                sid: info.sid.clone(),
                kind: info.kind,
                source: info.source,
                origin,
                state: StateSync::with_on_did_mutate(
                    PublicationState::new(info),
                    move |new, old| {
                        if let Some(this) = hook.upgrade() {
                            this.on_did_mutate(new, old);
                        }
                    },
                ),
                participant,
                main_queue,
                changed: ObjectChanged::new(),
                track_lock: Mutex::new(()),
                me: me.clone(),
            }
        });
        if track.is_some() {
            let _ = publication.set_track(track);
        }
        publication
    }

    /// Returns ID of the published [`Track`].
    #[inline]
    #[must_use]
    pub fn sid(&self) -> &TrackSid {
        &self.sid
    }

    /// Returns kind of the published media.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Returns source of the published media.
    #[inline]
    #[must_use]
    pub fn source(&self) -> TrackSource {
        self.source
    }

    /// Returns the side which has published the [`Track`].
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Returns a snapshot of the current [`PublicationState`].
    #[inline]
    #[must_use]
    pub fn state(&self) -> PublicationState {
        self.state.read()
    }

    /// Returns name given by the publisher.
    #[inline]
    #[must_use]
    pub fn name(&self) -> String {
        self.state.read_with(|s| s.name.clone())
    }

    /// Returns the attached [`Track`], if any.
    #[inline]
    #[must_use]
    pub fn track(&self) -> Option<Arc<Track>> {
        self.state.read_with(|s| s.track.clone())
    }

    /// Indicates whether the attached [`Track`] is muted. `false` if there is
    /// no [`Track`].
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.state
            .read_with(|s| s.track.as_ref().map_or(false, |t| t.is_muted()))
    }

    /// Indicates whether a [`Track`] is attached, which means being
    /// subscribed for a remote [`Publication`].
    #[inline]
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.state.read_with(|s| s.track.is_some())
    }

    /// Returns the current [`StreamState`].
    #[inline]
    #[must_use]
    pub fn stream_state(&self) -> StreamState {
        self.state.read_with(|s| s.stream_state)
    }

    /// Returns [`Dimensions`] of a video [`Track`], if known.
    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> Option<Dimensions> {
        self.state.read_with(|s| s.dimensions)
    }

    /// Indicates whether the [`Track`] is published with simulcast.
    #[inline]
    #[must_use]
    pub fn is_simulcasted(&self) -> bool {
        self.state.read_with(|s| s.simulcasted)
    }

    /// Returns MIME type of the published media.
    #[inline]
    #[must_use]
    pub fn mime_type(&self) -> String {
        self.state.read_with(|s| s.mime_type.clone())
    }

    /// Returns end-to-end encryption of the [`Track`].
    #[inline]
    #[must_use]
    pub fn encryption_type(&self) -> EncryptionType {
        self.state.read_with(|s| s.encryption_type)
    }

    /// Indicates whether the publisher allows subscribing to this
    /// [`Publication`].
    #[inline]
    #[must_use]
    pub fn is_subscription_allowed(&self) -> bool {
        self.state.read_with(|s| s.subscription_allowed)
    }

    /// Returns the current [`TrackSettings`].
    #[inline]
    #[must_use]
    pub fn track_settings(&self) -> TrackSettings {
        self.state.read_with(|s| s.track_settings.clone())
    }

    /// Indicates whether a [`TrackSettings`] update is being sent.
    #[inline]
    #[must_use]
    pub fn is_sending_track_settings(&self) -> bool {
        self.state.read_with(|s| s.is_sending_track_settings)
    }

    /// Returns the [`Participant`] this [`Publication`] belongs to.
    ///
    /// # Errors
    ///
    /// With [`MissingParticipantError`] if the [`Participant`] is gone.
    pub fn participant(
        &self,
    ) -> Result<Arc<Participant>, Traced<MissingParticipantError>> {
        Ok(upgrade_or_err!(self.participant, MissingParticipantError))
    }

    /// Returns a [`Stream`] of UI-facing notifications about any change of
    /// this [`Publication`].
    ///
    /// [`Stream`]: futures::Stream
    #[inline]
    pub fn on_object_changed(&self) -> BoxStream<'static, ()> {
        self.changed.subscribe()
    }

    /// Attaches the provided [`Track`] (or detaches the current one if
    /// [`None`]), returning the previously attached one.
    ///
    /// This [`Publication`] is unregistered from the delegates of the
    /// previous [`Track`] and registered as a delegate of the new one.
    /// Setting the same [`Track`] is a no-op.
    pub fn set_track(&self, track: Option<Arc<Track>>) -> Option<Arc<Track>> {
        let _guard = lock(&self.track_lock);

        let new = track.clone();
        let (prev, changed) = self.state.mutate(move |s| {
            if s.track == track {
                (s.track.clone(), false)
            } else {
                (std::mem::replace(&mut s.track, track), true)
            }
        });
        if !changed {
            return prev;
        }

        let me: Weak<dyn TrackDelegate> = self.me.clone();
        if let Some(prev) = &prev {
            let _ = prev.delegates().remove_weak(&me);
        }
        if let Some(new) = &new {
            new.delegates().add_weak(me);
            match self.origin {
                Origin::Local => {
                    if new.sid().is_none() {
                        new.set_sid(self.sid.clone());
                    }
                }
                Origin::Remote => {
                    let muted = self.state.read_with(|s| s.metadata_muted);
                    let _ = new.set_muted(muted, false);
                }
            }
        }
        debug!(
            "Publication {} track changed: {:?} -> {:?}",
            self.sid,
            prev.as_ref().map(|t| t.id()),
            new.as_ref().map(|t| t.id()),
        );

        prev
    }

    /// Updates this [`Publication`] with a fresh [`TrackInfo`] snapshot.
    ///
    /// Only name, simulcast flag, MIME type and dimensions are taken from the
    /// snapshot. ID, kind and source never change.
    pub fn update_from_info(&self, info: &TrackInfo) {
        let kind = self.kind;
        self.state.mutate(|s| {
            s.name = info.name.clone();
            s.simulcasted = info.simulcast;
            s.mime_type = info.mime_type.clone();
            if kind == MediaKind::Video {
                if let Some(dimensions) = info.dimensions() {
                    s.dimensions = Some(dimensions);
                }
            }
            s.latest_info = info.clone();
        });
    }

    /// Mutes the attached local [`Track`], informing the server.
    ///
    /// Returns `false` if it's muted already.
    ///
    /// # Errors
    ///
    /// - [`PublicationError::NotLocal`] if this [`Publication`] is remote;
    /// - [`PublicationError::NoTrack`] if no [`Track`] is attached.
    pub fn mute(&self) -> Result<bool, Traced<PublicationError>> {
        Ok(self.local_track()?.mute())
    }

    /// Unmutes the attached local [`Track`], informing the server.
    ///
    /// Returns `false` if it isn't muted.
    ///
    /// # Errors
    ///
    /// - [`PublicationError::NotLocal`] if this [`Publication`] is remote;
    /// - [`PublicationError::NoTrack`] if no [`Track`] is attached.
    pub fn unmute(&self) -> Result<bool, Traced<PublicationError>> {
        Ok(self.local_track()?.unmute())
    }

    /// Requests the server to (un)subscribe from this remote [`Publication`].
    ///
    /// The [`Track`] itself is attached once the server starts forwarding it.
    ///
    /// # Errors
    ///
    /// - [`PublicationError::NotRemote`] if this [`Publication`] is local;
    /// - [`PublicationError::MissingParticipant`] or
    ///   [`PublicationError::RoomGone`] if this [`Publication`] is orphaned;
    /// - [`PublicationError::Signaling`] if the request has failed.
    pub async fn set_subscribed(
        &self,
        subscribed: bool,
    ) -> Result<(), Traced<PublicationError>> {
        self.ensure_origin(Origin::Remote)?;
        let room = self.room()?;
        self.state.mutate(|s| s.prefer_subscribed = Some(subscribed));

        let signaling = room.signaling();
        signaling
            .send_update_subscription(self.sid.clone(), subscribed)
            .await
            .map_err(tracerr::from_and_wrap!())
    }

    /// Returns the subscription preference requested with
    /// [`Publication::set_subscribed`].
    #[inline]
    #[must_use]
    pub fn prefer_subscribed(&self) -> Option<bool> {
        self.state.read_with(|s| s.prefer_subscribed)
    }

    /// Asks the server to resume (`true`) or pause (`false`) forwarding of
    /// this subscribed remote [`Publication`].
    ///
    /// # Errors
    ///
    /// See [`Publication::update_track_settings`].
    #[inline]
    pub async fn set_enabled(
        &self,
        enabled: bool,
    ) -> Result<(), Traced<PublicationError>> {
        self.update_track_settings(|s| s.enabled = enabled).await
    }

    /// Asks the server to forward the provided [`VideoQuality`] layer of
    /// this subscribed remote [`Publication`].
    ///
    /// # Errors
    ///
    /// See [`Publication::update_track_settings`].
    #[inline]
    pub async fn set_video_quality(
        &self,
        quality: VideoQuality,
    ) -> Result<(), Traced<PublicationError>> {
        self.update_track_settings(|s| s.video_quality = quality).await
    }

    /// Asks the server to forward the video layer fitting the provided
    /// [`Dimensions`] best.
    ///
    /// # Errors
    ///
    /// See [`Publication::update_track_settings`].
    #[inline]
    pub async fn set_video_dimensions(
        &self,
        dimensions: Dimensions,
    ) -> Result<(), Traced<PublicationError>> {
        self.update_track_settings(|s| s.dimensions = Some(dimensions))
            .await
    }

    /// Applies the provided `update` to the [`TrackSettings`] and sends them
    /// to the server. The update is reverted if sending fails.
    ///
    /// # Errors
    ///
    /// - [`PublicationError::NotRemote`] if this [`Publication`] is local;
    /// - [`PublicationError::NotSubscribed`] if no [`Track`] is attached;
    /// - [`PublicationError::SettingsUpdateInProgress`] if the previous
    ///   update is still being sent;
    /// - [`PublicationError::MissingParticipant`] or
    ///   [`PublicationError::RoomGone`] if this [`Publication`] is orphaned;
    /// - [`PublicationError::Signaling`] if the request has failed.
    async fn update_track_settings<F>(
        &self,
        update: F,
    ) -> Result<(), Traced<PublicationError>>
    where
        F: FnOnce(&mut TrackSettings),
    {
        self.ensure_origin(Origin::Remote)?;
        let room = self.room()?;

        let settings = self
            .state
            .mutate(|s| {
                if s.track.is_none() {
                    return Err(PublicationError::NotSubscribed);
                }
                if s.is_sending_track_settings {
                    return Err(PublicationError::SettingsUpdateInProgress);
                }
                let old = s.track_settings.clone();
                update(&mut s.track_settings);
                if s.track_settings == old {
                    return Ok(None);
                }
                s.is_sending_track_settings = true;
                Ok(Some((old, s.track_settings.clone())))
            })
            .map_err(tracerr::wrap!())?;
        let (old, new) = match settings {
            Some(settings) => settings,
            None => return Ok(()),
        };

        let signaling = room.signaling();
        let result = signaling
            .send_update_track_settings(self.sid.clone(), new)
            .await;
        let failed = result.is_err();
        self.state.mutate(move |s| {
            s.is_sending_track_settings = false;
            if failed {
                s.track_settings = old;
            }
        });
        if let Err(e) = &result {
            warn!("Failed to update settings of track {}: {}", self.sid, e);
        }

        result.map_err(tracerr::from_and_wrap!())
    }

    /// Sets the muted state reported by the server for this remote
    /// [`Publication`], applying it to the attached [`Track`] without
    /// echoing it back to the server.
    pub fn set_metadata_muted(&self, muted: bool) {
        if self.origin != Origin::Remote {
            return;
        }
        let track = self.state.mutate(|s| {
            s.metadata_muted = muted;
            s.track.clone()
        });
        if let Some(track) = track {
            let _ = track.set_muted(muted, false);
        }
    }

    /// Indicates whether the server reports the remote [`Track`] as muted.
    #[inline]
    #[must_use]
    pub fn is_metadata_muted(&self) -> bool {
        self.state.read_with(|s| s.metadata_muted)
    }

    /// Sets whether the publisher allows subscribing to this [`Publication`],
    /// notifying the [`Participant`] and [`Room`] observers on change.
    pub fn set_subscription_allowed(&self, allowed: bool) {
        let changed = self.state.mutate(|s| {
            let changed = s.subscription_allowed != allowed;
            s.subscription_allowed = allowed;
            changed
        });
        if !changed {
            return;
        }
        match self.participant() {
            Ok(participant) => {
                participant.notify_subscription_allowed(self, allowed);
            }
            Err(e) => warn!("Publication {}: {}", self.sid, e),
        }
    }

    /// Sets [`StreamState`] of this remote [`Publication`].
    #[inline]
    pub fn set_stream_state(&self, stream_state: StreamState) {
        self.state.mutate(|s| s.stream_state = stream_state);
    }

    /// Posts a UI-facing change notification of this [`Publication`], its
    /// [`Participant`] and [`Room`] (in this order) to the [`MainQueue`].
    pub(crate) fn notify_object_changed(&self) {
        let publication = self.me.clone();
        let participant = self.participant.clone();
        self.main_queue.post(move || {
            if let Some(publication) = publication.upgrade() {
                publication.changed.notify();
            }
            if let Some(participant) = participant.upgrade() {
                participant.object_changed().notify();
                if let Some(room) = participant.room() {
                    room.object_changed().notify();
                }
            }
        });
    }

    /// Reacts on a committed [`PublicationState`] mutation.
    fn on_did_mutate(&self, new: &PublicationState, old: &PublicationState) {
        if new == old {
            return;
        }
        if new.stream_state != old.stream_state {
            match self.participant() {
                Ok(participant) => {
                    participant.notify_stream_state(self, new.stream_state);
                }
                Err(e) => warn!("Publication {}: {}", self.sid, e),
            }
        }
        self.notify_object_changed();
    }

    /// Indicates whether the provided [`Track`] is the attached one.
    fn is_attached(&self, track: &Track) -> bool {
        self.state.read_with(|s| s.track.as_deref() == Some(track))
    }

    /// Returns the attached [`Track`] of this local [`Publication`].
    fn local_track(&self) -> Result<Arc<Track>, Traced<PublicationError>> {
        self.ensure_origin(Origin::Local)?;
        self.track()
            .ok_or_else(|| tracerr::new!(PublicationError::NoTrack))
    }

    /// Checks that this [`Publication`] has the provided [`Origin`].
    fn ensure_origin(
        &self,
        origin: Origin,
    ) -> Result<(), Traced<PublicationError>> {
        if self.origin == origin {
            return Ok(());
        }
        Err(tracerr::new!(match origin {
            Origin::Local => PublicationError::NotLocal,
            Origin::Remote => PublicationError::NotRemote,
        }))
    }

    /// Returns the [`Room`] of the [`Participant`] of this [`Publication`].
    fn room(&self) -> Result<Arc<Room>, Traced<PublicationError>> {
        let participant =
            self.participant().map_err(tracerr::map_from_and_wrap!())?;
        participant
            .room()
            .ok_or_else(|| tracerr::new!(PublicationError::RoomGone))
    }
}

impl TrackDelegate for Publication {
    fn on_state_mutated(
        &self,
        track: &Track,
        new: &TrackState,
        old: &TrackState,
    ) {
        if !self.is_attached(track) {
            debug!(
                "Publication {} ignores state of detached track {}",
                self.sid,
                track.id(),
            );
            return;
        }
        if self.kind == MediaKind::Video
            && new.dimensions.is_some()
            && new.dimensions != old.dimensions
        {
            let dimensions = new.dimensions;
            self.state.mutate(|s| s.dimensions = dimensions);
        }
    }

    fn on_mute_changed(
        &self,
        track: &Track,
        muted: bool,
        should_send_signal: bool,
    ) {
        if !self.is_attached(track) {
            debug!(
                "Publication {} ignores mute of detached track {}",
                self.sid,
                track.id(),
            );
            return;
        }

        let participant = match self.participant() {
            Ok(participant) => participant,
            Err(e) => {
                warn!("Publication {} is orphaned: {}", self.sid, e);
                self.notify_object_changed();
                return;
            }
        };

        if should_send_signal {
            match participant.room() {
                Some(room) => {
                    let signaling = room.signaling();
                    let sid = self.sid.clone();
                    room.spawn_task(async move {
                        signaling
                            .send_mute_track(sid, muted)
                            .await
                            .map_err(|e| tracerr::new!(Error::from(e)))
                    });
                }
                None => warn!(
                    "Mute of track {} is not signaled: room is gone",
                    self.sid,
                ),
            }
        }

        participant.notify_muted(self, muted);
        self.notify_object_changed();
    }
}

impl PartialEq for Publication {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl fmt::Debug for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publication")
            .field("sid", &self.sid)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("origin", &self.origin)
            .field("state", &self.state.read())
            .finish()
    }
}
