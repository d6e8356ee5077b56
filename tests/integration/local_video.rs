use std::sync::Arc;

use async_trait::async_trait;
use medea_sync::media::{
    CaptureError, Dimensions, Lifecycle, LocalVideoTrack, TrackSource,
    VideoCapturer, VideoSource,
};
use mockall::mock;

mock! {
    pub Capturer {}

    #[async_trait]
    impl VideoCapturer for Capturer {
        async fn start_capture(&self) -> Result<(), CaptureError>;

        async fn stop_capture(&self) -> Result<(), CaptureError>;
    }
}

fn local_video(capturer: MockCapturer) -> LocalVideoTrack {
    LocalVideoTrack::new(
        "cam",
        TrackSource::Camera,
        Arc::new(capturer),
        Arc::new(VideoSource::new(Dimensions::new(1280, 720))),
    )
}

#[tokio::test]
async fn capturer_follows_actual_transitions_only() {
    let mut capturer = MockCapturer::new();
    capturer.expect_start_capture().times(2).returning(|| Ok(()));
    capturer.expect_stop_capture().times(1).returning(|| Ok(()));
    let video = local_video(capturer);

    assert!(!video.stop().await.unwrap());
    assert!(video.start().await.unwrap());
    assert!(!video.start().await.unwrap());
    assert!(video.stop().await.unwrap());
    assert!(!video.stop().await.unwrap());
    assert!(video.start().await.unwrap());

    assert_eq!(video.track().lifecycle(), Lifecycle::Started);
    assert_eq!(
        video.track().dimensions(),
        Some(Dimensions::new(1280, 720)),
    );
}

#[tokio::test]
async fn failed_capture_rolls_lifecycle_back() {
    let mut capturer = MockCapturer::new();
    capturer
        .expect_start_capture()
        .returning(|| Err(CaptureError::StartFailed("busy".into())));
    let video = local_video(capturer);

    let err = video.start().await.unwrap_err();

    assert_eq!(*err.as_ref(), CaptureError::StartFailed("busy".into()));
    assert_eq!(video.track().lifecycle(), Lifecycle::Created);
}

#[tokio::test]
async fn clone_shares_capture_device() {
    let mut capturer = MockCapturer::new();
    capturer.expect_start_capture().times(2).returning(|| Ok(()));
    let video = local_video(capturer);

    let copy = video.clone();
    assert!(video.start().await.unwrap());
    assert!(copy.start().await.unwrap());

    assert_ne!(video.track().id(), copy.track().id());
    assert!(Arc::ptr_eq(video.capturer(), copy.capturer()));
    assert!(Arc::ptr_eq(video.video_source(), copy.video_source()));
}
