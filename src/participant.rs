//! Member of a [`Room`] publishing media [`Track`]s.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{Arc, Weak},
};

use derive_more::Display;
use futures::stream::BoxStream;
use log::debug;
use medea_reactive::StateSync;

use crate::{
    media::{StreamState, Track, TrackSid},
    publication::{Origin, Publication},
    room::Room,
    rpc::{ParticipantInfo, ParticipantSid, ParticipantState, TrackInfo},
    utils::{Delegates, MainQueue, ObjectChanged},
};

/// Side a [`Participant`] is located at.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ParticipantKind {
    /// This client.
    #[display(fmt = "local")]
    Local,

    /// Some other client.
    #[display(fmt = "remote")]
    Remote,
}

impl From<ParticipantKind> for Origin {
    #[inline]
    fn from(kind: ParticipantKind) -> Self {
        match kind {
            ParticipantKind::Local => Self::Local,
            ParticipantKind::Remote => Self::Remote,
        }
    }
}

/// Observer of [`Participant`] events.
///
/// All the methods are called on the thread that has caused the event.
pub trait ParticipantDelegate: Send + Sync {
    /// [`Track`] of the `publication` has been (un)muted.
    fn did_update_muted(
        &self,
        _participant: &Participant,
        _publication: &Publication,
        _muted: bool,
    ) {
    }

    /// [`StreamState`] of the `publication` has changed.
    fn did_update_stream_state(
        &self,
        _participant: &Participant,
        _publication: &Publication,
        _state: StreamState,
    ) {
    }

    /// Publisher has allowed or disallowed subscription to the
    /// `publication`.
    fn did_update_permission(
        &self,
        _participant: &Participant,
        _publication: &Publication,
        _allowed: bool,
    ) {
    }

    /// New `publication` has appeared.
    fn did_publish(
        &self,
        _participant: &Participant,
        _publication: &Publication,
    ) {
    }

    /// The `publication` has been removed.
    fn did_unpublish(
        &self,
        _participant: &Participant,
        _publication: &Publication,
    ) {
    }
}

/// Mutable data of a [`Participant`].
#[derive(Clone, Debug, PartialEq)]
struct ParticipantData {
    identity: String,
    name: String,
    metadata: String,
    connection: ParticipantState,
    publications: HashMap<TrackSid, Arc<Publication>>,
}

/// Member of a [`Room`].
pub struct Participant {
    /// ID of this [`Participant`].
    sid: ParticipantSid,

    /// Side this [`Participant`] is located at.
    kind: ParticipantKind,

    /// Mutable data of this [`Participant`].
    state: StateSync<ParticipantData>,

    /// [`Room`] this [`Participant`] is a member of.
    room: Weak<Room>,

    /// Queue for UI-facing notifications.
    main_queue: MainQueue,

    /// Observers of this [`Participant`].
    delegates: Delegates<dyn ParticipantDelegate>,

    /// UI-facing change notifications of this [`Participant`].
    changed: ObjectChanged,

    /// Weak reference to this [`Participant`], passed to its
    /// [`Publication`]s.
    me: Weak<Participant>,
}

impl Participant {
    /// Creates a new [`Participant`] without [`Publication`]s.
    pub(crate) fn new(
        sid: ParticipantSid,
        identity: String,
        kind: ParticipantKind,
        room: Weak<Room>,
        main_queue: MainQueue,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let hook = me.clone();
            Self {
                sid,
                kind,
                state: StateSync::with_on_did_mutate(
                    ParticipantData {
                        identity,
                        name: String::new(),
                        metadata: String::new(),
                        connection: ParticipantState::default(),
                        publications: HashMap::new(),
                    },
                    move |new, old| {
                        if new == old {
                            return;
                        }
                        if let Some(this) = hook.upgrade() {
                            this.notify_object_changed();
                        }
                    },
                ),
                room,
                main_queue,
                delegates: Delegates::new(),
                changed: ObjectChanged::new(),
                me: me.clone(),
            }
        })
    }

    /// Returns ID of this [`Participant`].
    #[inline]
    #[must_use]
    pub fn sid(&self) -> &ParticipantSid {
        &self.sid
    }

    /// Returns side this [`Participant`] is located at.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ParticipantKind {
        self.kind
    }

    /// Returns identity of this [`Participant`].
    #[inline]
    #[must_use]
    pub fn identity(&self) -> String {
        self.state.read_with(|s| s.identity.clone())
    }

    /// Returns human readable name of this [`Participant`].
    #[inline]
    #[must_use]
    pub fn name(&self) -> String {
        self.state.read_with(|s| s.name.clone())
    }

    /// Returns application metadata of this [`Participant`].
    #[inline]
    #[must_use]
    pub fn metadata(&self) -> String {
        self.state.read_with(|s| s.metadata.clone())
    }

    /// Returns the last reported [`ParticipantState`].
    #[inline]
    #[must_use]
    pub fn connection_state(&self) -> ParticipantState {
        self.state.read_with(|s| s.connection)
    }

    /// Returns the [`Room`] of this [`Participant`], unless it's gone.
    #[inline]
    #[must_use]
    pub fn room(&self) -> Option<Arc<Room>> {
        self.room.upgrade()
    }

    /// Returns all the [`Publication`]s of this [`Participant`].
    #[must_use]
    pub fn publications(&self) -> Vec<Arc<Publication>> {
        self.state
            .read_with(|s| s.publications.values().cloned().collect())
    }

    /// Returns the [`Publication`] with the provided [`TrackSid`], if any.
    #[must_use]
    pub fn publication(&self, sid: &TrackSid) -> Option<Arc<Publication>> {
        self.state.read_with(|s| s.publications.get(sid).cloned())
    }

    /// Returns registry of this [`Participant`]'s observers.
    #[inline]
    #[must_use]
    pub fn delegates(&self) -> &Delegates<dyn ParticipantDelegate> {
        &self.delegates
    }

    /// Returns a [`Stream`] of UI-facing notifications about any change of
    /// this [`Participant`] or its [`Publication`]s.
    ///
    /// [`Stream`]: futures::Stream
    #[inline]
    pub fn on_object_changed(&self) -> BoxStream<'static, ()> {
        self.changed.subscribe()
    }

    /// Adds a [`Publication`] described by the provided [`TrackInfo`],
    /// optionally attaching a [`Track`] to it.
    ///
    /// If such [`Publication`] exists already, it's updated instead.
    pub fn add_publication(
        &self,
        info: TrackInfo,
        track: Option<Arc<Track>>,
    ) -> Arc<Publication> {
        let (publication, created) = self.state.mutate(|s| {
            if let Some(existing) = s.publications.get(&info.sid) {
                return (Arc::clone(existing), false);
            }
            let publication = Publication::new(
                info.clone(),
                None,
                self.kind.into(),
                self.me.clone(),
                self.main_queue.clone(),
            );
            drop(
                s.publications
                    .insert(info.sid.clone(), Arc::clone(&publication)),
            );
            (publication, true)
        });

        if !created {
            publication.update_from_info(&info);
        }
        if track.is_some() {
            drop(publication.set_track(track));
        }
        if created {
            debug!("Participant {} published {}", self.sid, info.sid);
            self.delegates.notify(|d| d.did_publish(self, &publication));
            if let Some(room) = self.room() {
                room.delegates()
                    .notify(|d| d.did_publish(&room, self, &publication));
            }
        }

        publication
    }

    /// Removes the [`Publication`] with the provided [`TrackSid`], detaching
    /// its [`Track`].
    ///
    /// Returns the removed [`Publication`], if any.
    pub fn remove_publication(
        &self,
        sid: &TrackSid,
    ) -> Option<Arc<Publication>> {
        let publication = self.state.mutate(|s| s.publications.remove(sid))?;
        drop(publication.set_track(None));

        debug!("Participant {} unpublished {}", self.sid, sid);
        self.delegates.notify(|d| d.did_unpublish(self, &publication));
        if let Some(room) = self.room() {
            room.delegates()
                .notify(|d| d.did_unpublish(&room, self, &publication));
        }

        Some(publication)
    }

    /// Removes all the [`Publication`]s of this [`Participant`].
    pub(crate) fn remove_all_publications(&self) {
        let sids: Vec<_> = self
            .state
            .read_with(|s| s.publications.keys().cloned().collect());
        for sid in sids {
            drop(self.remove_publication(&sid));
        }
    }

    /// Updates this [`Participant`] with a fresh [`ParticipantInfo`]
    /// snapshot.
    ///
    /// [`Publication`]s of a remote [`Participant`] are created, updated or
    /// removed to match the snapshot. [`Publication`]s of the local
    /// [`Participant`] are only updated, since they're created by this
    /// client.
    pub fn update_from_info(&self, info: &ParticipantInfo) {
        self.state.mutate(|s| {
            s.identity = info.identity.clone();
            s.name = info.name.clone();
            s.metadata = info.metadata.clone();
            s.connection = info.state;
        });

        match self.kind {
            ParticipantKind::Local => {
                for track in &info.tracks {
                    if let Some(publication) = self.publication(&track.sid) {
                        publication.update_from_info(track);
                    }
                }
            }
            ParticipantKind::Remote => {
                for track in &info.tracks {
                    let publication = self.add_publication(track.clone(), None);
                    publication.set_metadata_muted(track.muted);
                }
                let actual: HashSet<_> =
                    info.tracks.iter().map(|t| &t.sid).collect();
                let stale: Vec<_> = self.state.read_with(|s| {
                    s.publications
                        .keys()
                        .filter(|sid| !actual.contains(sid))
                        .cloned()
                        .collect()
                });
                for sid in stale {
                    drop(self.remove_publication(&sid));
                }
            }
        }
    }

    /// Notifies the observers of this [`Participant`] and its [`Room`] that
    /// the [`Track`] of the `publication` has been (un)muted.
    pub(crate) fn notify_muted(&self, publication: &Publication, muted: bool) {
        self.delegates
            .notify(|d| d.did_update_muted(self, publication, muted));
        if let Some(room) = self.room() {
            room.delegates().notify(|d| {
                d.did_update_muted(&room, self, publication, muted);
            });
        }
    }

    /// Notifies the observers of this [`Participant`] and its [`Room`] about
    /// the new [`StreamState`] of the `publication`.
    pub(crate) fn notify_stream_state(
        &self,
        publication: &Publication,
        state: StreamState,
    ) {
        self.delegates
            .notify(|d| d.did_update_stream_state(self, publication, state));
        if let Some(room) = self.room() {
            room.delegates().notify(|d| {
                d.did_update_stream_state(&room, self, publication, state);
            });
        }
    }

    /// Notifies the observers of this [`Participant`] and its [`Room`] that
    /// subscription to the `publication` has been (dis)allowed.
    pub(crate) fn notify_subscription_allowed(
        &self,
        publication: &Publication,
        allowed: bool,
    ) {
        self.delegates
            .notify(|d| d.did_update_permission(self, publication, allowed));
        if let Some(room) = self.room() {
            room.delegates().notify(|d| {
                d.did_update_permission(&room, self, publication, allowed);
            });
        }
    }

    /// Returns UI-facing change notifications source of this [`Participant`].
    #[inline]
    pub(crate) fn object_changed(&self) -> &ObjectChanged {
        &self.changed
    }

    /// Posts a UI-facing change notification of this [`Participant`] and its
    /// [`Room`] to the [`MainQueue`].
    fn notify_object_changed(&self) {
        let participant = self.me.clone();
        self.main_queue.post(move || {
            if let Some(participant) = participant.upgrade() {
                participant.changed.notify();
                if let Some(room) = participant.room() {
                    room.object_changed().notify();
                }
            }
        });
    }
}

impl PartialEq for Participant {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("sid", &self.sid)
            .field("kind", &self.kind)
            .field("state", &self.state.read())
            .finish()
    }
}
