use std::sync::Arc;

use futures::{FutureExt as _, StreamExt as _};
use medea_sync::{
    media::{Dimensions, TrackSid},
    room::ConnectionState,
    rpc::{ParticipantInfo, ParticipantState, SignalingEvent},
};

use crate::{camera, room, video_info, Event, MockSignaling, Recorder};

fn bob(state: ParticipantState, tracks: &[&str]) -> ParticipantInfo {
    ParticipantInfo {
        sid: "PA_BOB".into(),
        identity: "bob".to_owned(),
        name: "Bob".to_owned(),
        metadata: "{}".to_owned(),
        state,
        tracks: tracks.iter().map(|sid| video_info(sid)).collect(),
    }
}

#[tokio::test]
async fn participant_lifecycle_is_observed() {
    let room = room(MockSignaling::new());
    let mut changes = room.on_object_changed();

    room.handle_event(SignalingEvent::ParticipantUpdate {
        participants: vec![bob(ParticipantState::Joined, &["TR_1"])],
    });
    let participant = room.remote_participant(&"PA_BOB".into()).unwrap();
    let events = Recorder::for_participant(&participant);

    room.handle_event(SignalingEvent::ParticipantUpdate {
        participants: vec![bob(ParticipantState::Active, &["TR_2"])],
    });
    room.flush().await;

    assert_eq!(participant.connection_state(), ParticipantState::Active);
    assert_eq!(participant.metadata(), "{}");
    assert_eq!(events.events(), vec![
        Event::Published("TR_2".into()),
        Event::Unpublished("TR_1".into()),
    ]);
    assert!(changes.next().now_or_never().is_some());

    room.handle_event(SignalingEvent::ParticipantUpdate {
        participants: vec![bob(ParticipantState::Disconnected, &[])],
    });
    assert!(room.remote_participant(&"PA_BOB".into()).is_none());
}

#[tokio::test]
async fn local_snapshot_updates_local_publications() {
    let room = room(MockSignaling::new());
    let local = Arc::clone(room.local_participant());
    let publication = local.add_publication(video_info("TR_1"), Some(camera()));
    let mut info = video_info("TR_1");
    info.width = 1920;
    info.height = 1080;
    info.simulcast = true;

    room.handle_event(SignalingEvent::ParticipantUpdate {
        participants: vec![ParticipantInfo {
            sid: "PA_LOCAL".into(),
            identity: "me".to_owned(),
            name: "Me".to_owned(),
            metadata: String::new(),
            state: ParticipantState::Active,
            tracks: vec![info],
        }],
    });

    assert_eq!(local.name(), "Me");
    assert!(publication.is_simulcasted());
    assert_eq!(publication.dimensions(), Some(Dimensions::new(1920, 1080)));
    assert!(room.remote_participants().is_empty());
}

#[tokio::test]
async fn events_for_unknown_members_are_ignored() {
    let room = room(MockSignaling::new());

    room.handle_event(SignalingEvent::TrackMuted {
        sid: "TR_404".into(),
        muted: true,
    });
    room.handle_event(SignalingEvent::SubscriptionPermissionUpdate {
        participant_sid: "PA_404".into(),
        track_sid: "TR_404".into(),
        allowed: false,
    });

    assert!(room
        .on_track_unsubscribed(&"PA_404".into(), &TrackSid::from("TR_1"))
        .is_err());
}

#[tokio::test]
async fn disconnect_detaches_all_tracks() {
    let room = room(MockSignaling::new());
    let local_track = camera();
    let local = room
        .local_participant()
        .add_publication(video_info("TR_1"), Some(Arc::clone(&local_track)));
    drop(room.add_remote_participant(&bob(ParticipantState::Active, &[
        "TR_2",
    ])));
    let remote_track = camera();
    let remote = room
        .on_track_subscribed(
            &"PA_BOB".into(),
            &"TR_2".into(),
            Arc::clone(&remote_track),
        )
        .unwrap();

    room.disconnect();
    room.flush().await;

    assert_eq!(room.connection_state(), ConnectionState::Disconnected);
    assert!(local.track().is_none());
    assert!(remote.track().is_none());
    assert!(local_track.delegates().is_empty());
    assert!(remote_track.delegates().is_empty());
    assert!(room.local_participant().publications().is_empty());
    assert!(remote.participant().is_err());
}
