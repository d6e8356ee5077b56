//! Track and publication state synchronization core of [Medea] clients.
//!
//! [`Track`]s report their transitions to their [`Publication`]s, which
//! mirror them to the observers of their [`Participant`] and [`Room`], issue
//! the required signaling requests, and post UI-facing change notifications
//! to a single [`MainQueue`].
//!
//! [Medea]: https://github.com/instrumentisto/medea

#![forbid(unsafe_code)]
// TODO: Remove `clippy::must_use_candidate` once the issue below is resolved:
//       https://github.com/rust-lang/rust-clippy/issues/4779
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

#[macro_use]
pub mod utils;
pub mod conf;
mod errors;
pub mod log;
pub mod media;
pub mod participant;
pub mod publication;
pub mod room;
pub mod rpc;

#[doc(inline)]
pub use self::{
    conf::Conf,
    errors::Error,
    media::{LocalVideoTrack, MediaDevices, Track, TrackDelegate},
    participant::{Participant, ParticipantDelegate},
    publication::Publication,
    room::{Room, RoomDelegate},
    rpc::SignalingClient,
    utils::MainQueue,
};
