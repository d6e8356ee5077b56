//! Top-level error of this crate.

use derive_more::{Display, From};

use crate::{
    media::{CaptureError, DevicesError},
    publication::{MissingParticipantError, PublicationError},
    room::RoomError,
    rpc::SignalingError,
};

/// Any error which may be reported by this crate, as it's delivered to
/// [`RoomDelegate::did_fail_task`].
///
/// [`RoomDelegate::did_fail_task`]: crate::room::RoomDelegate::did_fail_task
#[derive(Clone, Debug, Display, Eq, From, PartialEq)]
pub enum Error {
    /// Signaling request has failed.
    #[display(fmt = "Signaling failed: {}", _0)]
    Signaling(SignalingError),

    /// Capture device has failed.
    #[display(fmt = "Capture failed: {}", _0)]
    Capture(CaptureError),

    /// Device discovery has failed.
    #[display(fmt = "Devices discovery failed: {}", _0)]
    Devices(DevicesError),

    /// Operation on a publication has failed.
    #[display(fmt = "Publication operation failed: {}", _0)]
    Publication(PublicationError),

    /// Room member lookup has failed.
    #[display(fmt = "{}", _0)]
    Room(RoomError),

    /// Publication has lost its participant.
    #[display(fmt = "{}", _0)]
    MissingParticipant(MissingParticipantError),
}
