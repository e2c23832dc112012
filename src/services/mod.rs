//! Services module - the tracking pipeline, one component per file.
//!
//! Data flows through the components in this order:
//!
//! - [`DeviceProfiler`]: one-shot environment snapshot ([`EnvironmentProbe`] in, [`DeviceProfile`](crate::models::DeviceProfile) out)
//! - [`QualityPolicy`]: weighted score to tier, and the fixed per-tier settings table
//! - [`CameraAcquisition`]: owns the capture stream; relaxed-constraint retry and camera switching
//! - [`TrackingLoop`]: timer-driven sampling, frame skip on the minimal tier, strategy dispatch
//! - [`LandmarkEstimationService`]: remote detection with content cache, rate limit and synthetic fallback
//! - [`PositionSmoother`]: bounded, recency-weighted shoulder-centre history
//! - [`ScenePlacement`]: screen-to-world mapping and interpolated model placement
//!
//! [`ArSession`] wires all of them together for one session. Collaborators outside the
//! process (media devices, the remote detector, the 3D scene) are traits so they can be
//! replaced by the synthetic implementations in [`crate::headless`] or by mocks.

pub mod camera;
pub mod detector;
pub mod device_profiler;
pub mod landmarks;
pub mod performance;
pub mod placement;
pub mod quality_policy;
pub mod scene;
pub mod session;
pub mod smoothing;
pub mod tracking;
pub mod worker;

pub use camera::{
    CameraAcquisition, CameraError, CaptureConstraints, CaptureError, FacingMode, MediaDevices,
    MediaStream, VideoSource,
};
pub use detector::{DetectionError, HttpDetector, ObjectDetector};
pub use device_profiler::{DeviceProfiler, EnvironmentProbe, StaticProbe, SystemProbe, is_ar_supported};
pub use landmarks::{LandmarkEstimationService, LandmarkSettings};
pub use performance::{FrameRateMonitor, QualityAdvice};
pub use placement::ScenePlacement;
pub use quality_policy::{GpuScoreTable, QualityPolicy, settings_for};
pub use scene::{ArScene, ModelDescriptor, ModelHandle, SceneError};
pub use session::{ArSession, SessionDeps, SessionError};
pub use smoothing::PositionSmoother;
pub use tracking::{TrackingLoop, TrackingLoopConfig};
pub use worker::{DetectionStrategy, InlineDetector, OffloadedDetector, WorkerError};
