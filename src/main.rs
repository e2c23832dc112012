//! Try-on tracker - headless session runner
//!
//! Runs one AR try-on session against synthetic camera and scene collaborators:
//! - Loads `tryon-data/tryon.yaml` plus `TRYON_*` environment overrides
//! - Initializes logging (file rotation + optional console output)
//! - Profiles the host, picks a tier and starts tracking
//! - Stops after `session.run_seconds` (or Ctrl+C) and logs the metrics summary
//!
//! With no `detector.endpoint` configured every detection falls back to a
//! synthetic pose, which still exercises the full smoothing and placement path.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tryon_tracker::headless::{OfflineDetector, RecordingScene, SyntheticMedia};
use tryon_tracker::models::DetectorConfig;
use tryon_tracker::services::scene::ArScene;
use tryon_tracker::services::{HttpDetector, ModelDescriptor, ObjectDetector, SystemProbe};
use tryon_tracker::{
    APP_NAME, ArSession, ConfigManager, SessionDeps, StateChange, TrackerConfig, VERSION, logging,
};

const CONFIG_DIR: &str = "tryon-data";

fn build_detector(config: &DetectorConfig) -> Result<Arc<dyn ObjectDetector>> {
    if config.is_offline() {
        tracing::warn!("No detector endpoint configured; all poses will be synthetic");
        return Ok(Arc::new(OfflineDetector));
    }

    let detector = HttpDetector::new(&config.endpoint, &config.request_path, &config.api_key)
        .context("Failed to configure remote detector")?;
    Ok(Arc::new(detector))
}

fn demo_model() -> ModelDescriptor {
    ModelDescriptor {
        product_id: "demo-tote".to_string(),
        category: "tote".to_string(),
        ..Default::default()
    }
}

async fn run(config: TrackerConfig) -> Result<()> {
    let scene = RecordingScene::new();
    let deps = SessionDeps {
        probe: Arc::new(SystemProbe::new(
            config.session.user_agent.clone(),
            config.session.battery_level,
        )),
        media: Arc::new(SyntheticMedia::new(1280, 720)),
        detector: build_detector(&config.detector)?,
        scene: Arc::new(scene.clone()),
        model: demo_model(),
    };

    let mut session = ArSession::start(&config, deps)
        .await
        .context("Failed to start AR session")?;

    let mut events = session.state().subscribe();
    let listener = tokio::spawn(async move {
        while let Ok(change) = events.recv().await {
            match change {
                StateChange::FrameRateMeasured {
                    fps,
                    reduce_quality_advised: true,
                } => tracing::warn!("Processing rate {:.1} fps is below target", fps),
                other => tracing::debug!("State change: {:?}", other),
            }
        }
    });

    let run_for = Duration::from_secs(config.session.run_seconds);
    tracing::info!("Tracking for {:?} (Ctrl+C to stop early)", run_for);
    tokio::select! {
        _ = tokio::time::sleep(run_for) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
    }

    let transform = scene.transform();
    session.shutdown().await;
    listener.abort();

    tracing::info!(
        "Final model position: ({:.3}, {:.3}, {:.3}), roll {:.3} rad, {} updates",
        transform.position.x,
        transform.position.y,
        transform.position.z,
        transform.rotation.z,
        scene.transform_updates()
    );
    session.metrics().log_summary();
    Ok(())
}

fn main() -> Result<()> {
    let config_manager = ConfigManager::new(CONFIG_DIR)?;
    let config = config_manager.load()?;

    let _guard = logging::setup_from_config(&config.logging)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("tryon-worker")
        .build()?;

    let result = runtime.block_on(run(config));

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result.map_err(|e| {
        tracing::error!("Session error: {:#}", e);
        e
    })
}
