// Tracking loop
//
// A spawned task that samples the camera at the tier's interval, runs
// detection through the session's strategy, smooths the shoulder position and
// nudges the scene's model. One tick at a time: the next sleep starts only
// after the current tick has finished, including its detection await.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::camera::{CaptureError, VideoSource};
use super::landmarks::LandmarkEstimationService;
use super::performance::{FrameRateMonitor, adaptive_quality_reduction};
use super::placement::ScenePlacement;
use super::scene::ArScene;
use super::smoothing::PositionSmoother;
use super::worker::{DetectionStrategy, InlineDetector, WorkerError};
use crate::metrics::TrackingMetrics;
use crate::models::{
    DetectorConfig, DeviceProfile, EncodedFrame, PerformanceTier, QualitySettings, TrackingConfig,
};
use crate::state::StateManager;

/// How long `stop()` waits for an in-flight tick before aborting the task
pub const STOP_GRACE: Duration = Duration::from_secs(2);

const MOBILE_CAPTURE_SCALE: f32 = 0.5;

#[derive(Error, Debug)]
pub enum TickError {
    #[error("Frame capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Detection strategy failed: {0}")]
    Strategy(#[from] WorkerError),
}

/// What a single processed tick ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    NotReady,
    /// Tracking stopped while the tick was in flight
    Discarded,
    /// Smoother rejected the pose
    Rejected,
    /// Pose smoothed; `placed` is false while the scene has no model
    Smoothed { placed: bool },
}

/// Timing and capture parameters fixed for one tracking session
#[derive(Debug, Clone)]
pub struct TrackingLoopConfig {
    pub interval: Duration,
    /// Process one of every `frame_skip` ticks
    pub frame_skip: u64,
    pub capture_scale: f32,
    pub jpeg_quality: f32,
    pub history_size: usize,
    pub min_shoulder_confidence: f32,
    /// Cache cleanup every N processed ticks; 0 disables
    pub cache_cleanup_every: u64,
    pub target_fps: f32,
}

impl TrackingLoopConfig {
    pub fn new(
        settings: &QualitySettings,
        tier: PerformanceTier,
        profile: &DeviceProfile,
        tracking: &TrackingConfig,
        detector: &DetectorConfig,
    ) -> Self {
        let frame_skip = if tier == PerformanceTier::Minimal {
            tracking.minimal_tier_frame_skip.max(1)
        } else {
            1
        };

        Self {
            interval: Duration::from_millis(settings.tracking_interval_ms()),
            frame_skip,
            capture_scale: if profile.is_mobile {
                MOBILE_CAPTURE_SCALE
            } else {
                1.0
            },
            jpeg_quality: tracking.jpeg_quality,
            history_size: tracking.history_size,
            min_shoulder_confidence: tracking.min_shoulder_confidence,
            cache_cleanup_every: detector.cache_cleanup_every,
            target_fps: settings.tracking_fps as f32 / frame_skip as f32,
        }
    }
}

/// Collaborators shared by every tick
#[derive(Clone)]
pub struct TrackingContext {
    pub service: Arc<LandmarkEstimationService>,
    pub scene: Arc<dyn ArScene>,
    pub state: StateManager,
    pub metrics: Arc<TrackingMetrics>,
    pub profile: DeviceProfile,
}

/// Per-session loop state, moved into the spawned task
struct TickRunner {
    ctx: TrackingContext,
    config: TrackingLoopConfig,
    strategy: Box<dyn DetectionStrategy>,
    smoother: PositionSmoother,
    placement: ScenePlacement,
    monitor: FrameRateMonitor,
    session_id: u64,
    next_frame_id: u64,
    processed: u64,
}

impl TickRunner {
    async fn run(
        mut self,
        stop: Arc<Notify>,
        video_rx: watch::Receiver<Option<Arc<dyn VideoSource>>>,
    ) -> Box<dyn DetectionStrategy> {
        let mut tick: u64 = 0;

        loop {
            if !self.is_live() {
                break;
            }

            tick += 1;
            self.ctx.metrics.record_tick();

            if tick % self.config.frame_skip != 0 {
                self.ctx.metrics.record_tick_skipped();
            } else {
                let video = video_rx.borrow().clone();
                match self.process(video).await {
                    Ok(outcome) => debug!("Tick {} finished: {:?}", tick, outcome),
                    Err(e) => {
                        error!("Tracking tick {} failed: {}", tick, e);
                        self.ctx.metrics.record_tick_failure();
                    }
                }
            }

            if !self.is_live() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = stop.notified() => break,
            }
        }

        self.release_strategy().await
    }

    fn is_live(&self) -> bool {
        self.ctx.state.is_tracking_session(self.session_id)
    }

    async fn process(
        &mut self,
        video: Option<Arc<dyn VideoSource>>,
    ) -> Result<TickOutcome, TickError> {
        let video = match video {
            Some(video) if video.is_ready() => video,
            _ => {
                self.ctx.metrics.record_not_ready();
                return Ok(TickOutcome::NotReady);
            }
        };

        let started = Instant::now();
        let (width, height) = video.dimensions();
        let width = ((width as f32 * self.config.capture_scale) as u32).max(1);
        let height = ((height as f32 * self.config.capture_scale) as u32).max(1);

        let bytes = video
            .capture_jpeg(width, height, self.config.jpeg_quality)
            .await?;
        self.next_frame_id += 1;
        let frame = EncodedFrame::new(self.next_frame_id, bytes, width, height);

        let outcome = match self.strategy.detect(&frame).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fall_back_to_inline(e).await;
                self.strategy.detect(&frame).await?
            }
        };

        self.ctx.metrics.record_frame_processed(started.elapsed());
        self.housekeeping();

        if let Some(reason) = outcome.reason() {
            self.ctx.state.record_degrade(reason);
        }

        if !self.is_live() {
            debug!("Discarding result for frame {}: tracking stopped", frame.id);
            self.ctx.metrics.record_discarded();
            return Ok(TickOutcome::Discarded);
        }

        let Some(smoothed) = self.smoother.ingest(outcome.value()) else {
            self.ctx.metrics.record_rejected();
            return Ok(TickOutcome::Rejected);
        };

        let placed = self
            .placement
            .apply(self.ctx.scene.as_ref(), smoothed.position, smoothed.angle);
        if placed {
            self.ctx.metrics.record_placement();
        }
        Ok(TickOutcome::Smoothed { placed })
    }

    /// Background context broke: disable it for the rest of the session
    async fn fall_back_to_inline(&mut self, cause: WorkerError) {
        warn!(
            "{} detection failed, using inline detection for the rest of the session: {}",
            self.strategy.name(),
            cause
        );
        self.strategy.teardown().await;
        self.strategy = Box::new(InlineDetector::new(Arc::clone(&self.ctx.service)));
        self.ctx.state.set_offloaded(false);
    }

    fn housekeeping(&mut self) {
        self.processed += 1;

        let every = self.config.cache_cleanup_every;
        if every > 0 && self.processed % every == 0 {
            self.ctx.service.cleanup_cache();
        }

        if let Some(fps) = self.monitor.record_frame() {
            let advice = adaptive_quality_reduction(fps, self.config.target_fps);
            if advice.reduce_quality {
                warn!(
                    "Tracking at {:.1} fps (target {:.1}); advised: {}",
                    fps,
                    self.config.target_fps,
                    advice.recommendations.join(", ")
                );
            }
            self.ctx.state.record_frame_rate(fps, advice.reduce_quality);
        }
    }

    /// Tear down a background context; only an inline strategy survives a stop
    async fn release_strategy(mut self) -> Box<dyn DetectionStrategy> {
        if self.strategy.is_offloaded() {
            self.strategy.teardown().await;
            self.strategy = Box::new(InlineDetector::new(Arc::clone(&self.ctx.service)));
            self.ctx.state.set_offloaded(false);
        }
        self.strategy
    }
}

/// Idle/Tracking state machine around the tick task.
///
/// `start` spawns the task; `stop` flips the liveness flag, wakes the task and
/// waits for it. Both are safe to call in either state.
pub struct TrackingLoop {
    ctx: TrackingContext,
    config: TrackingLoopConfig,
    strategy: Option<Box<dyn DetectionStrategy>>,
    video_tx: watch::Sender<Option<Arc<dyn VideoSource>>>,
    stop: Arc<Notify>,
    task: Option<JoinHandle<Box<dyn DetectionStrategy>>>,
    session_id: Option<u64>,
}

impl TrackingLoop {
    pub fn new(
        ctx: TrackingContext,
        config: TrackingLoopConfig,
        strategy: Box<dyn DetectionStrategy>,
    ) -> Self {
        let (video_tx, _) = watch::channel(None);
        Self {
            ctx,
            config,
            strategy: Some(strategy),
            video_tx,
            stop: Arc::new(Notify::new()),
            task: None,
            session_id: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn config(&self) -> &TrackingLoopConfig {
        &self.config
    }

    /// Begin sampling `video`. Returns false when already tracking.
    pub fn start(&mut self, video: Arc<dyn VideoSource>) -> bool {
        if self.session_id.is_some() {
            debug!("Tracking already running");
            return false;
        }

        self.video_tx.send_replace(Some(video));

        let strategy = self.strategy.take().unwrap_or_else(|| {
            Box::new(InlineDetector::new(Arc::clone(&self.ctx.service)))
        });
        self.ctx.state.set_offloaded(strategy.is_offloaded());

        let session_id = self.ctx.state.begin_tracking();
        info!(
            "Tracking started (session {}, every {:?}, 1 in {} ticks, {} detection)",
            session_id,
            self.config.interval,
            self.config.frame_skip,
            strategy.name()
        );

        let runner = TickRunner {
            ctx: self.ctx.clone(),
            config: self.config.clone(),
            strategy,
            smoother: PositionSmoother::new(
                self.config.history_size,
                self.config.min_shoulder_confidence,
            ),
            placement: ScenePlacement::new(&self.ctx.profile),
            monitor: FrameRateMonitor::new(),
            session_id,
            next_frame_id: 0,
            processed: 0,
        };

        self.stop = Arc::new(Notify::new());
        let stop = Arc::clone(&self.stop);
        let video_rx = self.video_tx.subscribe();
        self.task = Some(tokio::spawn(runner.run(stop, video_rx)));
        self.session_id = Some(session_id);
        true
    }

    /// Point subsequent ticks at a new video handle
    pub fn update_video(&self, video: Arc<dyn VideoSource>) {
        self.video_tx.send_replace(Some(video));
    }

    /// Stop ticking. Results still in flight are discarded, never applied.
    pub async fn stop(&mut self) {
        let Some(session_id) = self.session_id.take() else {
            return;
        };

        self.ctx.state.end_tracking();
        self.stop.notify_one();

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(STOP_GRACE, &mut task).await {
                Ok(Ok(strategy)) => self.strategy = Some(strategy),
                Ok(Err(e)) => error!("Tracking task ended abnormally: {}", e),
                Err(_) => {
                    warn!("Tracking task still busy after {:?}; aborting it", STOP_GRACE);
                    task.abort();
                }
            }
        }

        info!("Tracking stopped (session {})", session_id);
    }
}

impl Drop for TrackingLoop {
    fn drop(&mut self) {
        if self.session_id.take().is_some() {
            self.ctx.state.end_tracking();
            self.stop.notify_one();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::quality_policy::settings_for;

    #[test]
    fn test_config_for_minimal_tier_skips_frames() {
        let settings = settings_for(PerformanceTier::Minimal);
        let config = TrackingLoopConfig::new(
            &settings,
            PerformanceTier::Minimal,
            &DeviceProfile::default(),
            &TrackingConfig::default(),
            &DetectorConfig::default(),
        );
        assert_eq!(config.frame_skip, 3);
        assert_eq!(config.interval, Duration::from_millis(100));
        assert!((config.target_fps - 10.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_config_interval_is_floored() {
        let settings = settings_for(PerformanceTier::High);
        let config = TrackingLoopConfig::new(
            &settings,
            PerformanceTier::High,
            &DeviceProfile::default(),
            &TrackingConfig::default(),
            &DetectorConfig::default(),
        );
        // floor(1000 / 30)
        assert_eq!(config.interval, Duration::from_millis(33));
        assert_eq!(config.frame_skip, 1);
        assert_eq!(config.capture_scale, 1.0);
    }

    #[test]
    fn test_config_mobile_capture_scale() {
        let profile = DeviceProfile {
            is_mobile: true,
            ..Default::default()
        };
        let settings = settings_for(PerformanceTier::Low);
        let config = TrackingLoopConfig::new(
            &settings,
            PerformanceTier::Low,
            &profile,
            &TrackingConfig::default(),
            &DetectorConfig::default(),
        );
        assert_eq!(config.capture_scale, 0.5);
        assert_eq!(config.interval, Duration::from_millis(66));
    }
}
