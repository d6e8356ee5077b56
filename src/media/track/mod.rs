//! Media [`Track`] and its state machine.

pub mod local;

use std::{
    fmt,
    sync::{Arc, Weak},
};

use medea_reactive::StateSync;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::{
    media::{Dimensions, MediaKind, TrackId, TrackSid, TrackSource},
    utils::Delegates,
};

/// Lifecycle stage of a [`Track`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lifecycle {
    /// [`Track`] is created, but was never started.
    Created,

    /// [`Track`] is started and its media is flowing.
    Started,

    /// [`Track`] is stopped. It may be started again.
    Stopped,
}

/// State of a [`Track`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrackState {
    /// Server-assigned ID, known once the [`Track`] is published or
    /// subscribed.
    pub sid: Option<TrackSid>,

    /// Lifecycle stage.
    pub lifecycle: Lifecycle,

    /// Indicator whether this [`Track`] is muted.
    pub muted: bool,

    /// Indicator whether the last change of [`TrackState::muted`] was made
    /// locally and should be reported to the server.
    pub should_send_signal: bool,

    /// Dimensions of a video [`Track`], if known.
    pub dimensions: Option<Dimensions>,
}

/// Observer of [`Track`] state transitions.
///
/// Notifications are delivered after the new state is committed, in the order
/// the states were committed.
pub trait TrackDelegate: Send + Sync {
    /// Called after any change of the [`TrackState`].
    fn on_state_mutated(
        &self,
        _track: &Track,
        _new: &TrackState,
        _old: &TrackState,
    ) {
    }

    /// Called after the [`Track`] has been muted or unmuted.
    ///
    /// `should_send_signal` is `true` if the change was initiated locally and
    /// the server should be informed about it.
    fn on_mute_changed(
        &self,
        _track: &Track,
        _muted: bool,
        _should_send_signal: bool,
    ) {
    }
}

/// Locally captured or remotely received media stream.
///
/// [`Track`]s are compared by their identity ([`TrackId`]).
pub struct Track {
    /// Unique ID of this [`Track`] object.
    id: TrackId,

    /// Kind of the media.
    kind: MediaKind,

    /// Source of the media.
    source: TrackSource,

    /// Human readable name of this [`Track`].
    name: String,

    /// Current [`TrackState`].
    state: StateSync<TrackState>,

    /// Observers of this [`Track`].
    delegates: Delegates<dyn TrackDelegate>,

    /// Serializes [`Lifecycle`] transitions, which may involve awaiting
    /// external resources.
    lifecycle_lock: AsyncMutex<()>,
}

impl Track {
    /// Creates a new [`Lifecycle::Created`] and unmuted [`Track`].
    pub fn new<N: Into<String>>(
        kind: MediaKind,
        source: TrackSource,
        name: N,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me = me.clone();
            Self {
                id: TrackId::next(),
                kind,
                source,
                name: name.into(),
                state: StateSync::with_on_did_mutate(
                    TrackState {
                        sid: None,
                        lifecycle: Lifecycle::Created,
                        muted: false,
                        should_send_signal: false,
                        dimensions: None,
                    },
                    move |new, old| {
                        if new == old {
                            return;
                        }
                        if let Some(this) = me.upgrade() {
                            this.delegates.notify(|d| {
                                d.on_state_mutated(&this, new, old);
                            });
                            if new.muted != old.muted {
                                this.delegates.notify(|d| {
                                    d.on_mute_changed(
                                        &this,
                                        new.muted,
                                        new.should_send_signal,
                                    );
                                });
                            }
                        }
                    },
                ),
                delegates: Delegates::new(),
                lifecycle_lock: AsyncMutex::new(()),
            }
        })
    }

    /// Creates a new [`Track`] received from the server with the provided
    /// [`TrackSid`].
    pub fn new_remote<N: Into<String>>(
        sid: TrackSid,
        kind: MediaKind,
        source: TrackSource,
        name: N,
    ) -> Arc<Self> {
        let track = Self::new(kind, source, name);
        track.state.mutate(|s| s.sid = Some(sid));
        track
    }

    /// Returns unique ID of this [`Track`] object.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Returns [`MediaKind`] of this [`Track`].
    #[inline]
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Returns [`TrackSource`] of this [`Track`].
    #[inline]
    #[must_use]
    pub fn source(&self) -> TrackSource {
        self.source
    }

    /// Returns name of this [`Track`].
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a snapshot of the current [`TrackState`].
    #[inline]
    #[must_use]
    pub fn state(&self) -> TrackState {
        self.state.read()
    }

    /// Returns [`TrackSid`] of this [`Track`], if it's known.
    #[inline]
    #[must_use]
    pub fn sid(&self) -> Option<TrackSid> {
        self.state.read_with(|s| s.sid.clone())
    }

    /// Sets [`TrackSid`] of this [`Track`] once it's published.
    #[inline]
    pub fn set_sid(&self, sid: TrackSid) {
        self.state.mutate(|s| s.sid = Some(sid));
    }

    /// Returns the current [`Lifecycle`] stage.
    #[inline]
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.state.read_with(|s| s.lifecycle)
    }

    /// Indicates whether this [`Track`] is muted.
    #[inline]
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.state.read_with(|s| s.muted)
    }

    /// Returns [`Dimensions`] of this [`Track`], if known.
    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> Option<Dimensions> {
        self.state.read_with(|s| s.dimensions)
    }

    /// Returns registry of this [`Track`]'s observers.
    #[inline]
    #[must_use]
    pub fn delegates(&self) -> &Delegates<dyn TrackDelegate> {
        &self.delegates
    }

    /// Starts this [`Track`].
    ///
    /// Returns `false` if it's started already.
    pub async fn start(&self) -> bool {
        let _guard = self.lock_lifecycle().await;
        self.transition(Lifecycle::Started).is_some()
    }

    /// Stops this [`Track`].
    ///
    /// Returns `false` if it isn't started.
    pub async fn stop(&self) -> bool {
        let _guard = self.lock_lifecycle().await;
        self.transition(Lifecycle::Stopped).is_some()
    }

    /// Mutes this [`Track`] on behalf of the local user.
    ///
    /// Returns `false` if it's muted already.
    #[inline]
    pub fn mute(&self) -> bool {
        self.set_muted(true, true)
    }

    /// Unmutes this [`Track`] on behalf of the local user.
    ///
    /// Returns `false` if it isn't muted.
    #[inline]
    pub fn unmute(&self) -> bool {
        self.set_muted(false, true)
    }

    /// Sets the muted state of this [`Track`], notifying its delegates with
    /// [`TrackDelegate::on_mute_changed`] if the state has changed.
    ///
    /// `should_send_signal` must be `false` for changes learned from the
    /// server, so they are not echoed back.
    ///
    /// Returns `false` if the state hasn't changed.
    pub fn set_muted(&self, muted: bool, should_send_signal: bool) -> bool {
        self.state.mutate(|s| {
            if s.muted == muted {
                return false;
            }
            s.muted = muted;
            s.should_send_signal = should_send_signal;
            true
        })
    }

    /// Sets [`Dimensions`] of this [`Track`].
    ///
    /// Returns `false` if they haven't changed.
    pub fn set_dimensions(&self, dimensions: Option<Dimensions>) -> bool {
        self.state.mutate(|s| {
            let changed = s.dimensions != dimensions;
            s.dimensions = dimensions;
            changed
        })
    }

    /// Acquires the lock serializing [`Lifecycle`] transitions of this
    /// [`Track`].
    pub(crate) async fn lock_lifecycle(&self) -> AsyncMutexGuard<'_, ()> {
        self.lifecycle_lock.lock().await
    }

    /// Moves this [`Track`] to the provided [`Lifecycle`] stage, if such
    /// transition is allowed.
    ///
    /// Returns the previous stage if the transition has happened.
    ///
    /// Must be called under [`Track::lock_lifecycle()`].
    pub(crate) fn transition(&self, to: Lifecycle) -> Option<Lifecycle> {
        self.state.mutate(|s| {
            let from = s.lifecycle;
            let allowed = match to {
                Lifecycle::Started => from != Lifecycle::Started,
                Lifecycle::Stopped => from == Lifecycle::Started,
                Lifecycle::Created => false,
            };
            if allowed {
                s.lifecycle = to;
                Some(from)
            } else {
                None
            }
        })
    }

    /// Unconditionally restores the provided [`Lifecycle`] stage after a
    /// failed transition.
    ///
    /// Must be called under [`Track::lock_lifecycle()`].
    pub(crate) fn restore_lifecycle(&self, lifecycle: Lifecycle) {
        self.state.mutate(|s| s.lifecycle = lifecycle);
    }
}

impl PartialEq for Track {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("name", &self.name)
            .field("state", &self.state.read())
            .finish()
    }
}
