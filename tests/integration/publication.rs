use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{channel::oneshot, FutureExt as _, StreamExt as _};
use medea_sync::{
    media::{Dimensions, StreamState, TrackSid},
    publication::{PublicationError, TrackSettings, VideoQuality},
    rpc::{
        ParticipantInfo, ParticipantState, SignalingClient, SignalingError,
    },
    Error,
};
use mockall::predicate::eq;
use tokio::{sync::Mutex, time};

use crate::{camera, room, video_info, Event, MockSignaling, Recorder};

fn remote_info(tracks: Vec<medea_sync::rpc::TrackInfo>) -> ParticipantInfo {
    ParticipantInfo {
        sid: "PA_REMOTE".into(),
        identity: "bob".to_owned(),
        name: "Bob".to_owned(),
        metadata: String::new(),
        state: ParticipantState::Active,
        tracks,
    }
}

#[tokio::test]
async fn video_publication_is_built_from_info() {
    let room = room(MockSignaling::new());

    let bob = room.add_remote_participant(&remote_info(vec![video_info(
        "TR_1",
    )]));
    let publication = bob.publication(&TrackSid::from("TR_1")).unwrap();

    assert_eq!(publication.dimensions(), Some(Dimensions::new(640, 480)));
    assert_eq!(publication.name(), "cam");
    assert!(!publication.is_subscribed());
    assert!(!publication.is_muted());
    assert!(publication.is_subscription_allowed());
    assert_eq!(publication.stream_state(), StreamState::Active);
}

#[tokio::test]
async fn local_mute_is_signaled_once_and_observed_everywhere() {
    let mut signaling = MockSignaling::new();
    signaling
        .expect_send_mute_track()
        .with(eq(TrackSid::from("TR_1")), eq(true))
        .times(1)
        .returning(|_, _| Ok(()));
    let room = room(signaling);
    let local = Arc::clone(room.local_participant());
    let track = camera();
    let publication =
        local.add_publication(video_info("TR_1"), Some(Arc::clone(&track)));
    let participant_events = Recorder::for_participant(&local);
    let room_events = Recorder::for_room(&room);
    let mut publication_changes = publication.on_object_changed();
    let mut room_changes = room.on_object_changed();

    assert!(track.set_muted(true, true));
    room.flush().await;

    assert!(publication.is_muted());
    let expected = vec![Event::Muted("TR_1".into(), true)];
    assert_eq!(participant_events.mutes(), expected);
    assert_eq!(room_events.mutes(), expected);
    assert!(publication_changes.next().now_or_never().is_some());
    assert!(room_changes.next().now_or_never().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_mutes_reach_server_in_commit_order() {
    let sent = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut signaling = MockSignaling::new();
    signaling.expect_send_mute_track().returning({
        let sent = Arc::clone(&sent);
        move |_, muted| {
            sent.lock().unwrap().push(muted);
            Ok(())
        }
    });
    let room = room(signaling);
    let local = Arc::clone(room.local_participant());
    let track = camera();
    let publication =
        local.add_publication(video_info("TR_1"), Some(Arc::clone(&track)));
    let events = Recorder::for_participant(&local);

    let togglers: Vec<_> = (0..4)
        .map(|i| {
            let publication = Arc::clone(&publication);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let _ = if i % 2 == 0 {
                        publication.mute()
                    } else {
                        publication.unmute()
                    };
                }
            })
        })
        .collect();
    for toggler in togglers {
        toggler.join().unwrap();
    }
    room.flush().await;

    let muted = track.is_muted();
    let sent = sent.lock().unwrap().clone();
    assert!(!sent.is_empty());
    assert!(sent.windows(2).all(|w| w[0] != w[1]));
    assert_eq!(sent.last(), Some(&muted));
    let mutes = events.mutes();
    assert_eq!(mutes.len(), sent.len());
    assert_eq!(mutes.last(), Some(&Event::Muted("TR_1".into(), muted)));
}

#[tokio::test]
async fn remote_origin_mute_is_not_echoed() {
    let mut signaling = MockSignaling::new();
    signaling.expect_send_mute_track().times(0);
    let room = room(signaling);
    let local = Arc::clone(room.local_participant());
    let track = camera();
    let publication =
        local.add_publication(video_info("TR_1"), Some(Arc::clone(&track)));
    let participant_events = Recorder::for_participant(&local);
    let room_events = Recorder::for_room(&room);

    assert!(track.set_muted(true, false));
    room.flush().await;

    assert!(publication.is_muted());
    let expected = vec![Event::Muted("TR_1".into(), true)];
    assert_eq!(participant_events.mutes(), expected);
    assert_eq!(room_events.mutes(), expected);
}

#[tokio::test]
async fn server_mute_event_is_not_echoed() {
    let mut signaling = MockSignaling::new();
    signaling.expect_send_mute_track().times(0);
    let room = room(signaling);
    let track = camera();
    let publication = room
        .local_participant()
        .add_publication(video_info("TR_1"), Some(Arc::clone(&track)));

    room.handle_event(medea_sync::rpc::SignalingEvent::TrackMuted {
        sid: "TR_1".into(),
        muted: true,
    });
    room.flush().await;

    assert!(track.is_muted());
    assert!(publication.is_muted());
}

#[tokio::test]
async fn failed_mute_signal_reaches_failure_sink_without_revert() {
    let mut signaling = MockSignaling::new();
    signaling
        .expect_send_mute_track()
        .returning(|_, _| Err(SignalingError::Closed));
    let room = room(signaling);
    let publication = room
        .local_participant()
        .add_publication(video_info("TR_1"), Some(camera()));
    let room_events = Recorder::for_room(&room);

    assert!(publication.mute().unwrap());
    room.flush().await;

    assert!(publication.is_muted());
    assert!(room_events
        .events()
        .contains(&Event::FailedTask(Error::Signaling(SignalingError::Closed))));
}

#[tokio::test]
async fn detached_track_is_not_observed() {
    let mut signaling = MockSignaling::new();
    signaling.expect_send_mute_track().times(0);
    let room = room(signaling);
    let bob = room.add_remote_participant(&remote_info(vec![video_info(
        "TR_1",
    )]));
    let events = Recorder::for_participant(&bob);
    let old = camera();
    let new = camera();

    let publication = room
        .on_track_subscribed(
            &"PA_REMOTE".into(),
            &"TR_1".into(),
            Arc::clone(&old),
        )
        .unwrap();
    let prev = publication.set_track(Some(Arc::clone(&new)));
    assert!(Arc::ptr_eq(&prev.unwrap(), &old));
    assert!(old.set_muted(true, false));
    assert!(new.set_muted(true, false));
    room.flush().await;

    assert_eq!(events.mutes(), vec![Event::Muted("TR_1".into(), true)]);
}

#[tokio::test]
async fn stream_state_is_propagated_to_observers() {
    let room = room(MockSignaling::new());
    let bob = room.add_remote_participant(&remote_info(vec![video_info(
        "TR_1",
    )]));
    let participant_events = Recorder::for_participant(&bob);
    let room_events = Recorder::for_room(&room);
    let publication = bob.publication(&"TR_1".into()).unwrap();

    publication.set_stream_state(StreamState::Paused);
    publication.set_stream_state(StreamState::Paused);
    publication.set_subscription_allowed(false);

    let expected = vec![
        Event::StreamState("TR_1".into(), StreamState::Paused),
        Event::Permission("TR_1".into(), false),
    ];
    assert_eq!(participant_events.events(), expected);
    assert_eq!(room_events.events(), expected);
}

#[tokio::test]
async fn subscription_preference_is_signaled() {
    let mut signaling = MockSignaling::new();
    signaling
        .expect_send_update_subscription()
        .with(eq(TrackSid::from("TR_1")), eq(true))
        .times(1)
        .returning(|_, _| Ok(()));
    let room = room(signaling);
    let bob = room.add_remote_participant(&remote_info(vec![video_info(
        "TR_1",
    )]));
    let publication = bob.publication(&"TR_1".into()).unwrap();

    publication.set_subscribed(true).await.unwrap();

    assert_eq!(publication.prefer_subscribed(), Some(true));
    assert!(!publication.is_subscribed());
}

#[tokio::test]
async fn track_settings_require_subscription() {
    let room = room(MockSignaling::new());
    let bob = room.add_remote_participant(&remote_info(vec![video_info(
        "TR_1",
    )]));
    let publication = bob.publication(&"TR_1".into()).unwrap();

    let err = publication.set_enabled(false).await.unwrap_err();

    assert_eq!(*err.as_ref(), PublicationError::NotSubscribed);
}

#[tokio::test]
async fn failed_track_settings_are_reverted() {
    let mut signaling = MockSignaling::new();
    signaling
        .expect_send_update_track_settings()
        .times(1)
        .returning(|_, _| Err(SignalingError::Rejected("nope".into())));
    let room = room(signaling);
    drop(room.add_remote_participant(&remote_info(vec![video_info("TR_1")])));
    let publication = room
        .on_track_subscribed(&"PA_REMOTE".into(), &"TR_1".into(), camera())
        .unwrap();

    let err = publication
        .set_video_quality(VideoQuality::Low)
        .await
        .unwrap_err();

    assert_eq!(
        *err.as_ref(),
        PublicationError::Signaling(SignalingError::Rejected("nope".into())),
    );
    assert_eq!(publication.track_settings(), TrackSettings::default());
    assert!(!publication.is_sending_track_settings());
}

#[tokio::test]
async fn unchanged_track_settings_are_not_sent() {
    let mut signaling = MockSignaling::new();
    signaling.expect_send_update_track_settings().times(0);
    let room = room(signaling);
    drop(room.add_remote_participant(&remote_info(vec![video_info("TR_1")])));
    let publication = room
        .on_track_subscribed(&"PA_REMOTE".into(), &"TR_1".into(), camera())
        .unwrap();

    publication.set_enabled(true).await.unwrap();
    publication
        .set_video_quality(VideoQuality::High)
        .await
        .unwrap();
}

/// [`SignalingClient`] holding track settings requests until released.
#[derive(Default)]
struct GatedSignaling {
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    sent: std::sync::Mutex<Vec<TrackSettings>>,
}

#[async_trait]
impl SignalingClient for GatedSignaling {
    async fn send_mute_track(
        &self,
        _: TrackSid,
        _: bool,
    ) -> Result<(), SignalingError> {
        Ok(())
    }

    async fn send_update_subscription(
        &self,
        _: TrackSid,
        _: bool,
    ) -> Result<(), SignalingError> {
        Ok(())
    }

    async fn send_update_track_settings(
        &self,
        _: TrackSid,
        settings: TrackSettings,
    ) -> Result<(), SignalingError> {
        self.sent.lock().unwrap().push(settings);
        if let Some(gate) = self.gate.lock().await.take() {
            gate.await.map_err(|_| SignalingError::Closed)?;
        }
        Ok(())
    }
}

#[tokio::test]
async fn concurrent_track_settings_update_is_rejected() {
    let (release, gate) = oneshot::channel();
    let signaling = Arc::new(GatedSignaling {
        gate: Mutex::new(Some(gate)),
        sent: Default::default(),
    });
    let room = medea_sync::Room::new(
        "PA_LOCAL".into(),
        "me".to_owned(),
        Arc::clone(&signaling) as Arc<dyn SignalingClient>,
        medea_sync::MainQueue::spawn().unwrap(),
    );
    drop(room.add_remote_participant(&remote_info(vec![video_info("TR_1")])));
    let publication = room
        .on_track_subscribed(&"PA_REMOTE".into(), &"TR_1".into(), camera())
        .unwrap();

    let first = tokio::spawn({
        let publication = Arc::clone(&publication);
        async move { publication.set_enabled(false).await }
    });
    time::timeout(Duration::from_secs(5), async {
        while !publication.is_sending_track_settings() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    let err = publication
        .set_video_dimensions(Dimensions::new(320, 240))
        .await
        .unwrap_err();
    release.send(()).unwrap();
    first.await.unwrap().unwrap();

    assert_eq!(*err.as_ref(), PublicationError::SettingsUpdateInProgress);
    assert!(!publication.is_sending_track_settings());
    assert!(!publication.track_settings().enabled);
    assert_eq!(publication.track_settings().dimensions, None);
    assert_eq!(signaling.sent.lock().unwrap().len(), 1);
}
