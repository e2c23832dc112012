//! End-to-end tests for an AR try-on session
//!
//! Wires the session to synthetic media, a recording scene and a mocked
//! detector, then checks startup, camera switching and teardown.

use bytes::Bytes;
use futures::future::BoxFuture;
use mockall::mock;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::time::{Duration, sleep};
use tryon_tracker::headless::{RecordingScene, SyntheticMedia};
use tryon_tracker::models::{
    BoundingBox, DegradeReason, DetectedObject, PerformanceTier, TrackerConfig,
};
use tryon_tracker::services::camera::{CameraError, FacingMode};
use tryon_tracker::services::detector::{DetectionError, ObjectDetector};
use tryon_tracker::services::device_profiler::EnvironmentProbe;
use tryon_tracker::services::scene::{ArScene, ModelDescriptor};
use tryon_tracker::services::StaticProbe;
use tryon_tracker::{ArSession, SessionDeps, SessionError, StateChange, StateManager, TrackingMetrics};

mock! {
    pub Detector {}

    impl ObjectDetector for Detector {
        fn detect_objects(
            &self,
            image: Bytes,
        ) -> BoxFuture<'static, Result<Vec<DetectedObject>, DetectionError>>;
    }
}

const ANDROID_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";

fn person_detector() -> Arc<dyn ObjectDetector> {
    let mut detector = MockDetector::new();
    detector.expect_detect_objects().returning(|_| {
        Box::pin(async {
            Ok(vec![DetectedObject::new(
                "person",
                0.9,
                BoundingBox::new(320.0, 120.0, 160.0, 300.0),
            )])
        })
    });
    Arc::new(detector)
}

fn desktop_probe() -> StaticProbe {
    StaticProbe {
        screen_size: Some((1920, 1080)),
        memory_gb: Some(8.0),
        cpu_cores: Some(8),
        ..Default::default()
    }
}

fn phone_probe() -> StaticProbe {
    StaticProbe {
        user_agent: Some(ANDROID_UA.to_string()),
        screen_size: Some((412, 915)),
        device_pixel_ratio: Some(2.6),
        memory_gb: Some(8.0),
        cpu_cores: Some(8),
        gpu_renderer: Some("Adreno (TM) 740".to_string()),
        ..Default::default()
    }
}

fn descriptor() -> ModelDescriptor {
    let mut descriptor = ModelDescriptor {
        product_id: "tote-01".to_string(),
        category: "tote".to_string(),
        ..Default::default()
    };
    descriptor
        .models
        .insert("high".to_string(), "/models/tote-01/high.glb".to_string());
    descriptor
}

fn deps(probe: StaticProbe, media: &SyntheticMedia, scene: &RecordingScene) -> SessionDeps {
    SessionDeps {
        probe: Arc::new(probe),
        media: Arc::new(media.clone()),
        detector: person_detector(),
        scene: Arc::new(scene.clone()),
        model: descriptor(),
    }
}

/// Probe for an environment without rendering support
struct HeadlessOnlyProbe;

impl EnvironmentProbe for HeadlessOnlyProbe {
    fn user_agent(&self) -> Option<String> {
        None
    }
    fn screen_size(&self) -> Option<(u32, u32)> {
        None
    }
    fn device_pixel_ratio(&self) -> Option<f32> {
        None
    }
    fn memory_gb(&self) -> Option<f32> {
        None
    }
    fn cpu_cores(&self) -> Option<u32> {
        None
    }
    fn gpu_renderer(&self) -> Option<String> {
        None
    }
    fn supports_rendering(&self) -> bool {
        false
    }
}

#[tokio::test(start_paused = true)]
async fn test_session_tracks_and_shuts_down_cleanly() {
    let media = SyntheticMedia::new(1280, 720);
    let scene = RecordingScene::new();
    let config = TrackerConfig::default();

    let mut session = ArSession::start(&config, deps(desktop_probe(), &media, &scene))
        .await
        .unwrap();

    assert_eq!(session.tier(), PerformanceTier::Medium);
    assert_eq!(session.settings().tracking_fps, 20);
    assert_eq!(session.facing(), FacingMode::User);
    assert!(session.is_tracking());
    assert!(session.startup_degradations().is_empty());
    assert!(!session.model().is_placeholder());
    assert!(session.state().snapshot().offloaded);
    assert_eq!(media.live_streams(), 1);

    sleep(Duration::from_millis(600)).await;
    session.shutdown().await;

    assert!(!session.is_tracking());
    assert!(!session.state().is_tracking());
    assert_eq!(media.live_streams(), 0);
    assert!(scene.is_disposed());
    assert!(scene.transform_updates() > 0);
    assert!(session.metrics().network_calls.load(Ordering::Relaxed) > 0);

    // Second shutdown does nothing
    session.shutdown().await;
    assert_eq!(media.stops(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_sees_startup_events() {
    let media = SyntheticMedia::new(1280, 720);
    let scene = RecordingScene::new();
    let state = StateManager::new();
    let mut rx = state.subscribe();

    let mut session = ArSession::start_with(
        &TrackerConfig::default(),
        deps(desktop_probe(), &media, &scene),
        state,
        Arc::new(TrackingMetrics::new()),
    )
    .await
    .unwrap();
    session.shutdown().await;

    let mut events = Vec::new();
    while let Ok(change) = rx.try_recv() {
        events.push(change);
    }

    assert_eq!(
        events.first(),
        Some(&StateChange::TierAssessed {
            tier: PerformanceTier::Medium,
            target_fps: 20
        })
    );
    assert!(events.contains(&StateChange::CameraSwitched {
        facing: FacingMode::User
    }));
    assert!(events.contains(&StateChange::TrackingStarted { session_id: 1 }));
    assert!(events.contains(&StateChange::TrackingStopped { session_id: 1 }));
}

#[tokio::test(start_paused = true)]
async fn test_failed_model_load_uses_placeholder() {
    let media = SyntheticMedia::new(1280, 720);
    let scene = RecordingScene::new().failing_model_loads();

    let mut session = ArSession::start(
        &TrackerConfig::default(),
        deps(desktop_probe(), &media, &scene),
    )
    .await
    .unwrap();

    assert!(session.model().is_placeholder());
    assert_eq!(
        session.startup_degradations(),
        &[DegradeReason::ModelLoadFailure]
    );
    assert_eq!(
        session.state().snapshot().last_degrade,
        Some(DegradeReason::ModelLoadFailure)
    );

    // The placeholder is still tracked
    sleep(Duration::from_millis(300)).await;
    session.shutdown().await;
    assert!(scene.transform_updates() > 0);
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_environment_is_rejected() {
    let media = SyntheticMedia::new(1280, 720);
    let scene = RecordingScene::new();
    let deps = SessionDeps {
        probe: Arc::new(HeadlessOnlyProbe),
        media: Arc::new(media.clone()),
        detector: person_detector(),
        scene: Arc::new(scene.clone()),
        model: descriptor(),
    };

    let err = ArSession::start(&TrackerConfig::default(), deps)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SessionError::Unsupported));
    assert_eq!(media.starts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_camera_permission_denied_is_fatal() {
    let media = SyntheticMedia::new(1280, 720);
    media.fail_next(CameraError::PermissionDenied);
    let scene = RecordingScene::new();

    let err = ArSession::start(
        &TrackerConfig::default(),
        deps(desktop_probe(), &media, &scene),
    )
    .await
    .err()
    .unwrap();

    assert!(matches!(
        err,
        SessionError::Camera(CameraError::PermissionDenied)
    ));
    assert_eq!(media.live_streams(), 0);
    assert!(scene.current_model().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_relaxed_camera_is_reported_as_degraded() {
    let media = SyntheticMedia::new(1280, 720);
    media.fail_next(CameraError::DeviceUnavailable);
    let scene = RecordingScene::new();

    let mut session = ArSession::start(
        &TrackerConfig::default(),
        deps(desktop_probe(), &media, &scene),
    )
    .await
    .unwrap();

    assert_eq!(
        session.startup_degradations(),
        &[DegradeReason::ConstraintsRelaxed]
    );
    assert!(session.is_tracking());
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_phone_switches_camera_and_keeps_tracking() {
    let media = SyntheticMedia::new(1280, 720);
    let scene = RecordingScene::new();

    let mut session = ArSession::start(
        &TrackerConfig::default(),
        deps(phone_probe(), &media, &scene),
    )
    .await
    .unwrap();
    assert!(session.profile().is_mobile);
    assert_eq!(session.tier(), PerformanceTier::High);

    sleep(Duration::from_millis(200)).await;
    let first = media.last_video().unwrap();

    let facing = session.switch_camera().await.unwrap();
    assert_eq!(facing.into_inner(), FacingMode::Environment);
    assert_eq!(session.facing(), FacingMode::Environment);
    assert_eq!(
        session.state().snapshot().facing,
        Some(FacingMode::Environment)
    );
    assert_eq!(media.live_streams(), 1);
    assert!(!first.is_live());

    let second = media.last_video().unwrap();
    sleep(Duration::from_millis(200)).await;
    assert!(second.frames_captured() > 0);
    assert!(session.is_tracking());

    session.shutdown().await;
    assert_eq!(media.live_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_switch_after_shutdown_fails() {
    let media = SyntheticMedia::new(1280, 720);
    let scene = RecordingScene::new();
    let mut session = ArSession::start(
        &TrackerConfig::default(),
        deps(phone_probe(), &media, &scene),
    )
    .await
    .unwrap();

    session.shutdown().await;
    let err = session.switch_camera().await.err().unwrap();
    assert!(matches!(err, SessionError::Camera(CameraError::NotOpen)));
    assert_eq!(media.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_low_battery_caps_frame_rate() {
    let media = SyntheticMedia::new(1280, 720);
    let scene = RecordingScene::new();
    let probe = StaticProbe {
        battery_level: Some(0.1),
        ..phone_probe()
    };

    let mut session = ArSession::start(&TrackerConfig::default(), deps(probe, &media, &scene))
        .await
        .unwrap();

    assert_eq!(session.tier(), PerformanceTier::High);
    assert_eq!(session.settings().tracking_fps, 10);
    assert!(session.settings().render_scale <= 0.5);
    assert_eq!(session.state().snapshot().target_fps, 10);
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_forced_tier_and_inline_detection() {
    let media = SyntheticMedia::new(1280, 720);
    let scene = RecordingScene::new();
    let mut config = TrackerConfig::default();
    config.session.force_tier = Some(PerformanceTier::Minimal);
    config.tracking.offload = false;

    let mut session = ArSession::start(&config, deps(desktop_probe(), &media, &scene))
        .await
        .unwrap();

    assert_eq!(session.tier(), PerformanceTier::Minimal);
    assert!(!session.state().snapshot().offloaded);
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_background_context_runs_inline() {
    let media = SyntheticMedia::new(1280, 720);
    let scene = RecordingScene::new();
    let probe = StaticProbe {
        no_background_context: true,
        ..desktop_probe()
    };

    let mut session = ArSession::start(&TrackerConfig::default(), deps(probe, &media, &scene))
        .await
        .unwrap();

    assert!(!session.state().snapshot().offloaded);
    sleep(Duration::from_millis(300)).await;
    session.shutdown().await;
    assert!(scene.transform_updates() > 0);
}
