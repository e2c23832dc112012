use bytes::Bytes;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{DegradeReason, DeviceProfile, Outcome, QualitySettings};

/// Hard caps on the ideal capture size
pub const MAX_IDEAL_WIDTH: u32 = 1280;
pub const MAX_IDEAL_HEIGHT: u32 = 720;

/// Absolute constraint maxima handed to the media subsystem
pub const MAX_WIDTH: u32 = 1920;
pub const MAX_HEIGHT: u32 = 1080;
pub const MAX_FRAME_RATE: u32 = 30;

/// Fixed constraints used for the single retry after `DeviceUnavailable`
pub const RELAXED_WIDTH: u32 = 640;
pub const RELAXED_HEIGHT: u32 = 480;

/// Errors surfaced to the caller of [`CameraAcquisition::open`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera permission denied. Please allow camera access for AR features.")]
    PermissionDenied,

    #[error("No camera found on this device.")]
    NoDeviceFound,

    #[error("Camera is in use or could not be started")]
    DeviceUnavailable,

    #[error("No camera stream is open")]
    NotOpen,

    #[error("Camera error: {0}")]
    Other(String),
}

/// Errors while grabbing and encoding a frame from an open video handle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Video is not ready")]
    NotReady,

    #[error("Frame capture failed: {0}")]
    Capture(String),

    #[error("Frame encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacingMode {
    /// Front camera
    User,
    /// Back camera
    Environment,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::User => Self::Environment,
            Self::Environment => Self::User,
        }
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Environment => f.write_str("environment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintRange {
    pub ideal: u32,
    pub max: u32,
}

/// Video capture request handed to the media subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub facing: FacingMode,
    pub width: ConstraintRange,
    pub height: ConstraintRange,
    pub frame_rate: ConstraintRange,
}

impl CaptureConstraints {
    /// Same request with the fixed low-resolution ideal size
    pub fn relaxed(&self) -> Self {
        Self {
            width: ConstraintRange {
                ideal: RELAXED_WIDTH,
                max: self.width.max,
            },
            height: ConstraintRange {
                ideal: RELAXED_HEIGHT,
                max: self.height.max,
            },
            ..*self
        }
    }
}

/// Live video handle: readiness, size and frame grabbing
pub trait VideoSource: Send + Sync {
    /// Current frame data is available
    fn is_ready(&self) -> bool;

    /// Native video size in pixels
    fn dimensions(&self) -> (u32, u32);

    /// Draw the current frame at `width`×`height` and JPEG-encode it
    fn capture_jpeg(
        &self,
        width: u32,
        height: u32,
        quality: f32,
    ) -> BoxFuture<'static, Result<Bytes, CaptureError>>;
}

/// An acquired capture stream
pub trait MediaStream: Send + Sync {
    fn video(&self) -> Arc<dyn VideoSource>;

    /// Stop every track of the stream
    fn stop_tracks(&self);
}

/// Capture-device negotiation
pub trait MediaDevices: Send + Sync {
    /// Acquire a stream; resolves once the video metadata is loaded
    fn open_stream(
        &self,
        constraints: &CaptureConstraints,
    ) -> BoxFuture<'static, Result<Box<dyn MediaStream>, CameraError>>;
}

/// The one active stream of a tracking session. Tracks stop when it is dropped.
pub struct CaptureSession {
    stream: Box<dyn MediaStream>,
    video: Arc<dyn VideoSource>,
    constraints: CaptureConstraints,
}

impl CaptureSession {
    fn new(stream: Box<dyn MediaStream>, constraints: CaptureConstraints) -> Self {
        let video = stream.video();
        Self {
            stream,
            video,
            constraints,
        }
    }

    pub fn video(&self) -> Arc<dyn VideoSource> {
        Arc::clone(&self.video)
    }

    pub fn constraints(&self) -> &CaptureConstraints {
        &self.constraints
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stream.stop_tracks();
        tracing::debug!("Stopped capture tracks ({})", self.constraints.facing);
    }
}

/// Derive capture constraints from the device and quality settings.
///
/// Ideal size is `min(screen * render_scale, 1280x720)`; on iOS the width snaps to
/// 640x480 or 1280x720.
pub fn constraints_for(
    profile: &DeviceProfile,
    settings: &QualitySettings,
    facing: FacingMode,
) -> CaptureConstraints {
    let mut width =
        ((profile.screen_width as f32 * settings.render_scale) as u32).min(MAX_IDEAL_WIDTH);
    let mut height =
        ((profile.screen_height as f32 * settings.render_scale) as u32).min(MAX_IDEAL_HEIGHT);

    if profile.is_ios() {
        if width <= 640 {
            width = 640;
            height = 480;
        } else if width <= 1280 {
            width = 1280;
            height = 720;
        }
    }

    CaptureConstraints {
        facing,
        width: ConstraintRange {
            ideal: width,
            max: MAX_WIDTH,
        },
        height: ConstraintRange {
            ideal: height,
            max: MAX_HEIGHT,
        },
        frame_rate: ConstraintRange {
            ideal: settings.tracking_fps.min(MAX_FRAME_RATE),
            max: MAX_FRAME_RATE,
        },
    }
}

/// Owns the session's capture stream: open, switch facing, dispose.
pub struct CameraAcquisition {
    devices: Arc<dyn MediaDevices>,
    profile: DeviceProfile,
    settings: QualitySettings,
    facing: FacingMode,
    session: Option<CaptureSession>,
}

impl CameraAcquisition {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        profile: DeviceProfile,
        settings: QualitySettings,
    ) -> Self {
        Self {
            devices,
            profile,
            settings,
            facing: FacingMode::User,
            session: None,
        }
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn video(&self) -> Option<Arc<dyn VideoSource>> {
        self.session.as_ref().map(CaptureSession::video)
    }

    pub fn constraints(&self) -> Option<&CaptureConstraints> {
        self.session.as_ref().map(CaptureSession::constraints)
    }

    /// Open a stream facing `facing`, replacing any current one.
    ///
    /// `DeviceUnavailable` is retried once at 640x480 and reported as degraded;
    /// every other failure is returned as is.
    pub async fn open(
        &mut self,
        facing: FacingMode,
    ) -> Result<Outcome<Arc<dyn VideoSource>>, CameraError> {
        self.release();
        self.facing = facing;

        let constraints = constraints_for(&self.profile, &self.settings, facing);
        tracing::info!(
            "Opening camera: facing={}, ideal={}x{}@{}",
            facing,
            constraints.width.ideal,
            constraints.height.ideal,
            constraints.frame_rate.ideal
        );

        match self.devices.open_stream(&constraints).await {
            Ok(stream) => {
                let session = CaptureSession::new(stream, constraints);
                let video = session.video();
                self.session = Some(session);
                Ok(Outcome::Ok(video))
            }
            Err(CameraError::DeviceUnavailable) => {
                let relaxed = constraints.relaxed();
                tracing::warn!(
                    "Camera unavailable at {}x{}, retrying at {}x{}",
                    constraints.width.ideal,
                    constraints.height.ideal,
                    relaxed.width.ideal,
                    relaxed.height.ideal
                );

                let stream = self.devices.open_stream(&relaxed).await.map_err(|e| {
                    tracing::error!("Camera retry failed: {}", e);
                    e
                })?;
                let session = CaptureSession::new(stream, relaxed);
                let video = session.video();
                self.session = Some(session);
                Ok(Outcome::degraded(video, DegradeReason::ConstraintsRelaxed))
            }
            Err(e) => {
                tracing::error!("Camera initialization failed: {}", e);
                Err(e)
            }
        }
    }

    /// Toggle front/back camera. Desktop devices keep their current stream.
    ///
    /// The old stream's tracks are stopped before the new one is requested.
    pub async fn switch_camera(&mut self) -> Result<Outcome<Arc<dyn VideoSource>>, CameraError> {
        if !self.profile.is_mobile {
            tracing::debug!("Camera switch ignored on non-mobile device");
            return self.video().map(Outcome::Ok).ok_or(CameraError::NotOpen);
        }

        let previous = self.facing;
        let next = previous.toggled();
        tracing::info!("Switching camera: {} -> {}", previous, next);

        let result = self.open(next).await;
        if result.is_err() {
            self.facing = previous;
        }
        result
    }

    /// Stop all tracks. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.session.is_some() {
            tracing::info!("Disposing camera");
        }
        self.release();
    }

    fn release(&mut self) {
        // Dropping the session stops its tracks
        self.session.take();
    }
}

impl Drop for CameraAcquisition {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PerformanceTier, Platform};
    use crate::services::quality_policy::settings_for;

    fn ios_profile(width: u32, height: u32) -> DeviceProfile {
        DeviceProfile {
            is_mobile: true,
            platform: Platform::IOS,
            screen_width: width,
            screen_height: height,
            ..Default::default()
        }
    }

    #[test]
    fn test_constraints_desktop_capped() {
        let profile = DeviceProfile::default();
        let settings = settings_for(PerformanceTier::High);
        let c = constraints_for(&profile, &settings, FacingMode::User);

        assert_eq!(c.width.ideal, 1280);
        assert_eq!(c.height.ideal, 720);
        assert_eq!(c.width.max, MAX_WIDTH);
        assert_eq!(c.frame_rate.ideal, 30);
    }

    #[test]
    fn test_constraints_scaled_by_render_scale() {
        let profile = DeviceProfile {
            screen_width: 1000,
            screen_height: 600,
            ..Default::default()
        };
        let settings = settings_for(PerformanceTier::Low);
        let c = constraints_for(&profile, &settings, FacingMode::Environment);

        assert_eq!(c.width.ideal, 600);
        assert_eq!(c.height.ideal, 360);
        assert_eq!(c.frame_rate.ideal, 15);
        assert_eq!(c.facing, FacingMode::Environment);
    }

    #[test]
    fn test_constraints_ios_snapping() {
        let settings = settings_for(PerformanceTier::Minimal);
        let small = constraints_for(&ios_profile(390, 844), &settings, FacingMode::User);
        assert_eq!((small.width.ideal, small.height.ideal), (640, 480));

        let settings = settings_for(PerformanceTier::High);
        let large = constraints_for(&ios_profile(1024, 1366), &settings, FacingMode::User);
        assert_eq!((large.width.ideal, large.height.ideal), (1280, 720));
    }

    #[test]
    fn test_relaxed_constraints() {
        let settings = settings_for(PerformanceTier::High);
        let c = constraints_for(&DeviceProfile::default(), &settings, FacingMode::User);
        let relaxed = c.relaxed();
        assert_eq!(relaxed.width.ideal, RELAXED_WIDTH);
        assert_eq!(relaxed.height.ideal, RELAXED_HEIGHT);
        assert_eq!(relaxed.frame_rate, c.frame_rate);
    }

    #[test]
    fn test_facing_toggle() {
        assert_eq!(FacingMode::User.toggled(), FacingMode::Environment);
        assert_eq!(FacingMode::Environment.toggled(), FacingMode::User);
    }
}
