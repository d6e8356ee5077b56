//! Session joining the local [`Participant`] with the remote ones.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, Weak},
};

use derive_more::Display;
use futures::{
    channel::{mpsc, oneshot},
    future::BoxFuture,
    stream::BoxStream,
    FutureExt as _, StreamExt as _,
};
use log::{debug, error, warn};
use medea_reactive::StateSync;
use tokio::runtime::Handle;
use tracerr::Traced;

use crate::{
    errors::Error,
    media::{StreamState, Track, TrackSid},
    participant::{Participant, ParticipantKind},
    publication::Publication,
    rpc::{
        ParticipantInfo, ParticipantSid, ParticipantState, SignalingClient,
        SignalingEvent,
    },
    utils::{Delegates, MainQueue, ObjectChanged},
};

/// Connection state of a [`Room`].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ConnectionState {
    /// [`Room`] is connected to the server.
    #[display(fmt = "connected")]
    Connected,

    /// [`Room`] is disconnected and released all its [`Participant`]s.
    #[display(fmt = "disconnected")]
    Disconnected,
}

/// Errors of looking up [`Room`] members.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum RoomError {
    /// No remote [`Participant`] with such ID.
    #[display(fmt = "Unknown participant: {}", _0)]
    UnknownParticipant(ParticipantSid),

    /// Remote [`Participant`] has no [`Publication`] with such ID.
    #[display(fmt = "Participant {} has no publication {}", _0, _1)]
    UnknownPublication(ParticipantSid, TrackSid),
}

/// Observer of [`Room`] events, including the events of all its
/// [`Participant`]s.
#[allow(unused_variables)]
pub trait RoomDelegate: Send + Sync {
    /// [`Track`] of the `publication` has been (un)muted.
    fn did_update_muted(
        &self,
        room: &Room,
        participant: &Participant,
        publication: &Publication,
        muted: bool,
    ) {
    }

    /// [`StreamState`] of the `publication` has changed.
    fn did_update_stream_state(
        &self,
        room: &Room,
        participant: &Participant,
        publication: &Publication,
        state: StreamState,
    ) {
    }

    /// Publisher has allowed or disallowed subscription to the
    /// `publication`.
    fn did_update_permission(
        &self,
        room: &Room,
        participant: &Participant,
        publication: &Publication,
        allowed: bool,
    ) {
    }

    /// New `publication` has appeared.
    fn did_publish(
        &self,
        room: &Room,
        participant: &Participant,
        publication: &Publication,
    ) {
    }

    /// The `publication` has been removed.
    fn did_unpublish(
        &self,
        room: &Room,
        participant: &Participant,
        publication: &Publication,
    ) {
    }

    /// Remote `track` of the `publication` has started being received.
    fn did_subscribe_track(
        &self,
        room: &Room,
        participant: &Participant,
        publication: &Publication,
        track: &Track,
    ) {
    }

    /// Remote `track` of the `publication` has stopped being received.
    fn did_unsubscribe_track(
        &self,
        room: &Room,
        participant: &Participant,
        publication: &Publication,
        track: &Track,
    ) {
    }

    /// Remote `participant` has joined.
    fn did_connect_participant(&self, room: &Room, participant: &Participant) {
    }

    /// Remote `participant` has left.
    fn did_disconnect_participant(
        &self,
        room: &Room,
        participant: &Participant,
    ) {
    }

    /// Task spawned with [`Room::spawn_task`] has failed.
    fn did_fail_task(&self, room: &Room, err: &Traced<Error>) {}
}

/// Job of the [`Room`]'s background worker.
enum Task {
    /// Job spawned with [`Room::spawn_task`].
    Run(BoxFuture<'static, Result<(), Traced<Error>>>),

    /// Marker resolved once all the jobs queued before it are finished.
    Flush(oneshot::Sender<()>),
}

/// Mutable data of a [`Room`].
#[derive(Clone, Debug, PartialEq)]
struct RoomData {
    connection: ConnectionState,
    remote_participants: HashMap<ParticipantSid, Arc<Participant>>,
}

/// Session of the local [`Participant`] with the remote ones.
pub struct Room {
    /// [`Participant`] representing this client.
    local_participant: Arc<Participant>,

    /// Mutable data of this [`Room`].
    state: StateSync<RoomData>,

    /// Client of the signaling server.
    signaling: Arc<dyn SignalingClient>,

    /// Queue for UI-facing notifications.
    main_queue: MainQueue,

    /// Queue of the background worker running [`Room::spawn_task`] jobs one
    /// by one.
    tasks: mpsc::UnboundedSender<Task>,

    /// Observers of this [`Room`].
    delegates: Delegates<dyn RoomDelegate>,

    /// UI-facing change notifications of this [`Room`].
    changed: ObjectChanged,

    /// Weak reference to this [`Room`], passed to the spawned jobs.
    me: Weak<Room>,
}

impl Room {
    /// Creates a new [`ConnectionState::Connected`] [`Room`] with the local
    /// [`Participant`] only.
    ///
    /// # Panics
    ///
    /// If called outside of a [Tokio] runtime.
    ///
    /// [Tokio]: https://docs.rs/tokio
    pub fn new(
        local_sid: ParticipantSid,
        local_identity: String,
        signaling: Arc<dyn SignalingClient>,
        main_queue: MainQueue,
    ) -> Arc<Self> {
        let runtime = Handle::current();
        let (tasks, queue) = mpsc::unbounded();
        Arc::new_cyclic(|me: &Weak<Self>| {
            drop(runtime.spawn(Self::run_tasks(queue, me.clone())));
            let hook = me.clone();
            Self {
                local_participant: Participant::new(
                    local_sid,
                    local_identity,
                    ParticipantKind::Local,
                    me.clone(),
                    main_queue.clone(),
                ),
                state: StateSync::with_on_did_mutate(
                    RoomData {
                        connection: ConnectionState::Connected,
                        remote_participants: HashMap::new(),
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
                signaling,
                main_queue,
                tasks,
                delegates: Delegates::new(),
                changed: ObjectChanged::new(),
                me: me.clone(),
            }
        })
    }

    /// Returns the [`Participant`] representing this client.
    #[inline]
    #[must_use]
    pub fn local_participant(&self) -> &Arc<Participant> {
        &self.local_participant
    }

    /// Returns all the remote [`Participant`]s.
    #[must_use]
    pub fn remote_participants(&self) -> Vec<Arc<Participant>> {
        self.state.read_with(|s| {
            s.remote_participants.values().cloned().collect()
        })
    }

    /// Returns the remote [`Participant`] with the provided ID, if any.
    #[must_use]
    pub fn remote_participant(
        &self,
        sid: &ParticipantSid,
    ) -> Option<Arc<Participant>> {
        self.state
            .read_with(|s| s.remote_participants.get(sid).cloned())
    }

    /// Returns the current [`ConnectionState`].
    #[inline]
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.state.read_with(|s| s.connection)
    }

    /// Returns client of the signaling server.
    #[inline]
    #[must_use]
    pub fn signaling(&self) -> Arc<dyn SignalingClient> {
        Arc::clone(&self.signaling)
    }

    /// Returns [`MainQueue`] the UI-facing notifications are posted to.
    #[inline]
    #[must_use]
    pub fn main_queue(&self) -> &MainQueue {
        &self.main_queue
    }

    /// Returns registry of this [`Room`]'s observers.
    #[inline]
    #[must_use]
    pub fn delegates(&self) -> &Delegates<dyn RoomDelegate> {
        &self.delegates
    }

    /// Returns a [`Stream`] of UI-facing notifications about any change in
    /// this [`Room`], its [`Participant`]s or their [`Publication`]s.
    ///
    /// [`Stream`]: futures::Stream
    #[inline]
    pub fn on_object_changed(&self) -> BoxStream<'static, ()> {
        self.changed.subscribe()
    }

    /// Spawns the provided `task` in background.
    ///
    /// Tasks are run one by one in the order they were spawned. Failure of
    /// the `task` is logged and reported to [`RoomDelegate::did_fail_task`].
    pub fn spawn_task<F>(&self, task: F)
    where
        F: Future<Output = Result<(), Traced<Error>>> + Send + 'static,
    {
        if self.tasks.unbounded_send(Task::Run(task.boxed())).is_err() {
            warn!("Room task is dropped: worker is gone");
        }
    }

    /// Resolves once all the jobs spawned with [`Room::spawn_task`] before
    /// this call are finished.
    pub async fn flush_tasks(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tasks.unbounded_send(Task::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Runs the jobs of the provided `queue` one by one until the [`Room`] is
    /// dropped.
    async fn run_tasks(
        mut queue: mpsc::UnboundedReceiver<Task>,
        room: Weak<Self>,
    ) {
        while let Some(task) = queue.next().await {
            match task {
                Task::Run(job) => {
                    match AssertUnwindSafe(job).catch_unwind().await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            error!("Room task failed: {}", e.as_ref());
                            if let Some(room) = room.upgrade() {
                                room.delegates
                                    .notify(|d| d.did_fail_task(&room, &e));
                            }
                        }
                        Err(_) => error!("Room task panicked"),
                    }
                }
                Task::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
    }

    /// Resolves once all the spawned jobs are finished and all the UI-facing
    /// notifications posted before are delivered.
    pub async fn flush(&self) {
        self.flush_tasks().await;
        self.main_queue.flush().await;
    }

    /// Applies the provided [`SignalingEvent`] received from the server.
    pub fn handle_event(&self, event: SignalingEvent) {
        match event {
            SignalingEvent::ParticipantUpdate { participants } => {
                for info in participants {
                    self.apply_participant_info(&info);
                }
            }
            SignalingEvent::TrackMuted { sid, muted } => {
                let track = self
                    .local_participant
                    .publication(&sid)
                    .and_then(|p| p.track());
                match track {
                    Some(track) => {
                        let _ = track.set_muted(muted, false);
                    }
                    None => warn!("Server muted unknown local track {}", sid),
                }
            }
            SignalingEvent::StreamStateUpdate { updates } => {
                for update in updates {
                    match self.find_publication(
                        &update.participant_sid,
                        &update.track_sid,
                    ) {
                        Ok((_, publication)) => {
                            publication.set_stream_state(update.state);
                        }
                        Err(e) => warn!("Stream state is not applied: {}", e),
                    }
                }
            }
            SignalingEvent::SubscriptionPermissionUpdate {
                participant_sid,
                track_sid,
                allowed,
            } => match self.find_publication(&participant_sid, &track_sid) {
                Ok((_, publication)) => {
                    publication.set_subscription_allowed(allowed);
                }
                Err(e) => warn!("Permission is not applied: {}", e),
            },
        }
    }

    /// Attaches the received remote [`Track`] to its [`Publication`].
    ///
    /// # Errors
    ///
    /// With [`RoomError`] if there is no such remote [`Participant`] or
    /// [`Publication`].
    pub fn on_track_subscribed(
        &self,
        participant_sid: &ParticipantSid,
        track_sid: &TrackSid,
        track: Arc<Track>,
    ) -> Result<Arc<Publication>, Traced<RoomError>> {
        let (participant, publication) =
            self.find_publication(participant_sid, track_sid)?;
        drop(publication.set_track(Some(Arc::clone(&track))));

        debug!("Subscribed to {} of {}", track_sid, participant_sid);
        self.delegates.notify(|d| {
            d.did_subscribe_track(self, &participant, &publication, &track);
        });
        Ok(publication)
    }

    /// Detaches the remote [`Track`] from its [`Publication`] once it's not
    /// received anymore.
    ///
    /// Returns the detached [`Track`], if there was any.
    ///
    /// # Errors
    ///
    /// With [`RoomError`] if there is no such remote [`Participant`] or
    /// [`Publication`].
    pub fn on_track_unsubscribed(
        &self,
        participant_sid: &ParticipantSid,
        track_sid: &TrackSid,
    ) -> Result<Option<Arc<Track>>, Traced<RoomError>> {
        let (participant, publication) =
            self.find_publication(participant_sid, track_sid)?;
        let track = publication.set_track(None);

        if let Some(track) = &track {
            debug!("Unsubscribed from {} of {}", track_sid, participant_sid);
            self.delegates.notify(|d| {
                d.did_unsubscribe_track(self, &participant, &publication, track);
            });
        }
        Ok(track)
    }

    /// Adds a remote [`Participant`] described by the provided
    /// [`ParticipantInfo`], or updates the existing one.
    pub fn add_remote_participant(
        &self,
        info: &ParticipantInfo,
    ) -> Arc<Participant> {
        let (participant, created) = self.state.mutate(|s| {
            if let Some(existing) = s.remote_participants.get(&info.sid) {
                return (Arc::clone(existing), false);
            }
            let participant = Participant::new(
                info.sid.clone(),
                info.identity.clone(),
                ParticipantKind::Remote,
                self.me.clone(),
                self.main_queue.clone(),
            );
            drop(
                s.remote_participants
                    .insert(info.sid.clone(), Arc::clone(&participant)),
            );
            (participant, true)
        });

        if created {
            debug!("Participant {} connected", info.sid);
            self.delegates
                .notify(|d| d.did_connect_participant(self, &participant));
        }
        participant.update_from_info(info);

        participant
    }

    /// Removes the remote [`Participant`] with the provided ID, together
    /// with all its [`Publication`]s.
    ///
    /// Returns the removed [`Participant`], if any.
    pub fn remove_remote_participant(
        &self,
        sid: &ParticipantSid,
    ) -> Option<Arc<Participant>> {
        let participant =
            self.state.mutate(|s| s.remote_participants.remove(sid))?;
        participant.remove_all_publications();

        debug!("Participant {} disconnected", sid);
        self.delegates
            .notify(|d| d.did_disconnect_participant(self, &participant));
        Some(participant)
    }

    /// Disconnects this [`Room`], releasing all the remote [`Participant`]s
    /// and unpublishing all the local [`Publication`]s.
    pub fn disconnect(&self) {
        let sids: Vec<_> = self.state.mutate(|s| {
            s.connection = ConnectionState::Disconnected;
            s.remote_participants.keys().cloned().collect()
        });
        for sid in sids {
            drop(self.remove_remote_participant(&sid));
        }
        self.local_participant.remove_all_publications();
    }

    /// Returns UI-facing change notifications source of this [`Room`].
    #[inline]
    pub(crate) fn object_changed(&self) -> &ObjectChanged {
        &self.changed
    }

    /// Applies a single [`ParticipantInfo`] snapshot.
    fn apply_participant_info(&self, info: &ParticipantInfo) {
        if &info.sid == self.local_participant.sid() {
            self.local_participant.update_from_info(info);
        } else if info.state == ParticipantState::Disconnected {
            drop(self.remove_remote_participant(&info.sid));
        } else {
            drop(self.add_remote_participant(info));
        }
    }

    /// Looks up the [`Publication`] of a remote [`Participant`].
    fn find_publication(
        &self,
        participant_sid: &ParticipantSid,
        track_sid: &TrackSid,
    ) -> Result<(Arc<Participant>, Arc<Publication>), Traced<RoomError>> {
        let participant =
            self.remote_participant(participant_sid).ok_or_else(|| {
                tracerr::new!(RoomError::UnknownParticipant(
                    participant_sid.clone()
                ))
            })?;
        let publication =
            participant.publication(track_sid).ok_or_else(|| {
                tracerr::new!(RoomError::UnknownPublication(
                    participant_sid.clone(),
                    track_sid.clone(),
                ))
            })?;
        Ok((participant, publication))
    }

    /// Posts a UI-facing change notification of this [`Room`] to the
    /// [`MainQueue`].
    fn notify_object_changed(&self) {
        let room = self.me.clone();
        self.main_queue.post(move || {
            if let Some(room) = room.upgrade() {
                room.changed.notify();
            }
        });
    }
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("local_participant", &self.local_participant)
            .field("state", &self.state.read())
            .finish()
    }
}
