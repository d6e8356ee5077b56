#![allow(clippy::module_name_repetitions)]
#![forbid(non_ascii_idents, unsafe_code)]

mod completer;
mod local_video;
mod publication;
mod room;

use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use medea_sync::{
    media::{MediaKind, StreamState, Track, TrackSid, TrackSource},
    participant::{Participant, ParticipantDelegate},
    publication::{Publication, TrackSettings},
    room::{Room, RoomDelegate},
    rpc::{SignalingClient, SignalingError, TrackInfo},
    Error, MainQueue,
};
use mockall::mock;
use tracerr::Traced;

mock! {
    pub Signaling {}

    #[async_trait]
    impl SignalingClient for Signaling {
        async fn send_mute_track(
            &self,
            sid: TrackSid,
            muted: bool,
        ) -> Result<(), SignalingError>;

        async fn send_update_subscription(
            &self,
            sid: TrackSid,
            subscribed: bool,
        ) -> Result<(), SignalingError>;

        async fn send_update_track_settings(
            &self,
            sid: TrackSid,
            settings: TrackSettings,
        ) -> Result<(), SignalingError>;
    }
}

/// Event observed by a [`Recorder`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    Muted(TrackSid, bool),
    StreamState(TrackSid, StreamState),
    Permission(TrackSid, bool),
    Published(TrackSid),
    Unpublished(TrackSid),
    FailedTask(Error),
}

/// [`ParticipantDelegate`] and [`RoomDelegate`] recording everything it
/// observes.
#[derive(Debug, Default)]
pub struct Recorder(Mutex<Vec<Event>>);

impl Recorder {
    /// Creates a new [`Recorder`] observing the provided [`Participant`].
    pub fn for_participant(participant: &Participant) -> Arc<Self> {
        let recorder = Arc::new(Self::default());
        let delegate = Arc::downgrade(&recorder);
        let delegate: Weak<dyn ParticipantDelegate> = delegate;
        participant.delegates().add_weak(delegate);
        recorder
    }

    /// Creates a new [`Recorder`] observing the provided [`Room`].
    pub fn for_room(room: &Room) -> Arc<Self> {
        let recorder = Arc::new(Self::default());
        let delegate = Arc::downgrade(&recorder);
        let delegate: Weak<dyn RoomDelegate> = delegate;
        room.delegates().add_weak(delegate);
        recorder
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    /// Returns only [`Event::Muted`] events.
    pub fn mutes(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, Event::Muted(..)))
            .collect()
    }

    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }
}

impl ParticipantDelegate for Recorder {
    fn did_update_muted(&self, _: &Participant, p: &Publication, muted: bool) {
        self.push(Event::Muted(p.sid().clone(), muted));
    }

    fn did_update_stream_state(
        &self,
        _: &Participant,
        p: &Publication,
        state: StreamState,
    ) {
        self.push(Event::StreamState(p.sid().clone(), state));
    }

    fn did_update_permission(
        &self,
        _: &Participant,
        p: &Publication,
        allowed: bool,
    ) {
        self.push(Event::Permission(p.sid().clone(), allowed));
    }

    fn did_publish(&self, _: &Participant, p: &Publication) {
        self.push(Event::Published(p.sid().clone()));
    }

    fn did_unpublish(&self, _: &Participant, p: &Publication) {
        self.push(Event::Unpublished(p.sid().clone()));
    }
}

impl RoomDelegate for Recorder {
    fn did_update_muted(
        &self,
        _: &Room,
        _: &Participant,
        p: &Publication,
        muted: bool,
    ) {
        self.push(Event::Muted(p.sid().clone(), muted));
    }

    fn did_update_stream_state(
        &self,
        _: &Room,
        _: &Participant,
        p: &Publication,
        state: StreamState,
    ) {
        self.push(Event::StreamState(p.sid().clone(), state));
    }

    fn did_update_permission(
        &self,
        _: &Room,
        _: &Participant,
        p: &Publication,
        allowed: bool,
    ) {
        self.push(Event::Permission(p.sid().clone(), allowed));
    }

    fn did_fail_task(&self, _: &Room, err: &Traced<Error>) {
        self.push(Event::FailedTask(err.as_ref().clone()));
    }
}

/// Creates a new [`Room`] with the local participant `PA_LOCAL`.
pub fn room<S: SignalingClient + 'static>(signaling: S) -> Arc<Room> {
    Room::new(
        "PA_LOCAL".into(),
        "me".to_owned(),
        Arc::new(signaling),
        MainQueue::spawn().unwrap(),
    )
}

/// Returns [`TrackInfo`] of a 640x480 camera track.
pub fn video_info(sid: &str) -> TrackInfo {
    TrackInfo {
        sid: sid.into(),
        kind: MediaKind::Video,
        source: TrackSource::Camera,
        name: "cam".to_owned(),
        mime_type: "video/VP8".to_owned(),
        simulcast: false,
        width: 640,
        height: 480,
        muted: false,
        encryption: Default::default(),
    }
}

/// Creates a new unmuted camera [`Track`].
pub fn camera() -> Arc<Track> {
    Track::new(MediaKind::Video, TrackSource::Camera, "cam")
}
