use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::camera::{CameraAcquisition, CameraError, FacingMode, MediaDevices};
use super::detector::ObjectDetector;
use super::device_profiler::{DeviceProfiler, EnvironmentProbe, is_ar_supported};
use super::landmarks::{LandmarkEstimationService, LandmarkSettings};
use super::performance::{apply_power_saver, battery_override};
use super::quality_policy::{QualityPolicy, QualityPolicyError, settings_for};
use super::scene::{ArScene, ModelDescriptor, ModelHandle, SceneError, load_model_with_fallback};
use super::tracking::{TrackingContext, TrackingLoop, TrackingLoopConfig};
use super::worker::select_strategy;
use crate::metrics::TrackingMetrics;
use crate::models::{
    DegradeReason, DeviceProfile, Outcome, PerformanceTier, QualitySettings, TrackerConfig,
};
use crate::state::StateManager;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("AR is not supported in this environment")]
    Unsupported,

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Policy(#[from] QualityPolicyError),
}

/// External collaborators a session runs against
pub struct SessionDeps {
    pub probe: Arc<dyn EnvironmentProbe>,
    pub media: Arc<dyn MediaDevices>,
    pub detector: Arc<dyn ObjectDetector>,
    pub scene: Arc<dyn ArScene>,
    pub model: ModelDescriptor,
}

/// One try-on session from device assessment to teardown.
///
/// Startup order: profile, tier, settings (with battery override), camera,
/// model, detection strategy, tracking. Any fatal error along the way drops
/// what was already acquired, which stops the camera tracks.
pub struct ArSession {
    profile: DeviceProfile,
    tier: PerformanceTier,
    settings: QualitySettings,
    camera: CameraAcquisition,
    tracking: TrackingLoop,
    scene: Arc<dyn ArScene>,
    model: ModelHandle,
    state: StateManager,
    metrics: Arc<TrackingMetrics>,
    startup_degradations: Vec<DegradeReason>,
    shut_down: bool,
}

impl ArSession {
    pub async fn start(config: &TrackerConfig, deps: SessionDeps) -> Result<Self, SessionError> {
        Self::start_with(
            config,
            deps,
            StateManager::new(),
            Arc::new(TrackingMetrics::new()),
        )
        .await
    }

    /// Start with caller-owned state and metrics, for observers that subscribe first
    pub async fn start_with(
        config: &TrackerConfig,
        deps: SessionDeps,
        state: StateManager,
        metrics: Arc<TrackingMetrics>,
    ) -> Result<Self, SessionError> {
        let SessionDeps {
            probe,
            media,
            detector,
            scene,
            model,
        } = deps;

        if !is_ar_supported(probe.as_ref()) {
            return Err(SessionError::Unsupported);
        }

        let profile = DeviceProfiler::new().profile(probe.as_ref());
        let policy = QualityPolicy::from_config(&config.gpu_rules)?;
        let tier = match config.session.force_tier {
            Some(tier) => {
                info!("Using configured tier {}", tier);
                tier
            }
            None => policy.score_to_tier(&profile),
        };

        let mut settings = settings_for(tier);
        if let Some(level) = probe.battery_level() {
            if let Some(saver) = battery_override(level) {
                info!(
                    "Battery at {:.0}%: capping tracking at {} fps",
                    level * 100.0,
                    saver.tracking_fps
                );
                settings = apply_power_saver(&settings, &saver);
            }
        }
        state.set_tier(tier, settings.tracking_fps);

        let mut startup_degradations = Vec::new();

        let mut camera = CameraAcquisition::new(media, profile.clone(), settings.clone());
        let video = camera.open(FacingMode::User).await?;
        if let Some(reason) = video.reason() {
            state.record_degrade(reason);
            startup_degradations.push(reason);
        }
        state.set_facing(camera.facing());
        let video = video.into_inner();

        let loaded = load_model_with_fallback(scene.as_ref(), &model, &settings, &profile).await?;
        if let Some(reason) = loaded.reason() {
            state.record_degrade(reason);
            startup_degradations.push(reason);
        }
        let model = loaded.into_inner();

        let service = Arc::new(LandmarkEstimationService::new(
            Arc::clone(&detector),
            LandmarkSettings::from(&config.detector),
            Arc::clone(&metrics),
        ));
        let strategy = select_strategy(
            config.tracking.offload,
            probe.supports_background_context(),
            Arc::clone(&service),
            detector,
            config.tracking.worker_init_timeout(),
            Arc::clone(&metrics),
        )
        .await;

        let loop_config = TrackingLoopConfig::new(
            &settings,
            tier,
            &profile,
            &config.tracking,
            &config.detector,
        );
        let ctx = TrackingContext {
            service,
            scene: Arc::clone(&scene),
            state: state.clone(),
            metrics: Arc::clone(&metrics),
            profile: profile.clone(),
        };
        let mut tracking = TrackingLoop::new(ctx, loop_config, strategy);
        tracking.start(video);

        info!(
            "AR session started: tier={}, fps={}, mobile={}, degraded={:?}",
            tier, settings.tracking_fps, profile.is_mobile, startup_degradations
        );

        Ok(Self {
            profile,
            tier,
            settings,
            camera,
            tracking,
            scene,
            model,
            state,
            metrics,
            startup_degradations,
            shut_down: false,
        })
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn tier(&self) -> PerformanceTier {
        self.tier
    }

    pub fn settings(&self) -> &QualitySettings {
        &self.settings
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<TrackingMetrics> {
        &self.metrics
    }

    pub fn facing(&self) -> FacingMode {
        self.camera.facing()
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.is_running()
    }

    /// Degradations hit while starting (relaxed camera, placeholder model)
    pub fn startup_degradations(&self) -> &[DegradeReason] {
        &self.startup_degradations
    }

    /// Toggle the camera and point the tracking loop at the new stream
    pub async fn switch_camera(&mut self) -> Result<Outcome<FacingMode>, SessionError> {
        if self.shut_down {
            return Err(CameraError::NotOpen.into());
        }

        let video = self.camera.switch_camera().await?;
        if let Some(reason) = video.reason() {
            self.state.record_degrade(reason);
        }
        let facing = self.camera.facing();
        self.state.set_facing(facing);

        Ok(video.map(|video| {
            self.tracking.update_video(video);
            facing
        }))
    }

    /// Stop tracking, release the camera and dispose the scene. Idempotent.
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.tracking.stop().await;
        self.camera.dispose();
        self.scene.dispose();
        info!("AR session shut down");
    }
}

impl Drop for ArSession {
    fn drop(&mut self) {
        if !self.shut_down {
            warn!("AR session dropped without shutdown");
        }
    }
}
