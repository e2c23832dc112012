//! Data models for the try-on tracking pipeline.
//!
//! - [`DeviceProfile`]: immutable environment snapshot taken once per session
//! - [`PerformanceTier`] / [`QualitySettings`]: the tier ladder and its per-tier settings
//! - [`PoseFrame`] / [`Landmark`]: the four estimated body keypoints of one frame
//! - [`DetectedObject`] / [`EncodedFrame`]: what goes to and comes back from the detector
//! - [`TrackedTransform`]: the placed model's position and rotation
//! - [`Outcome`]: value-or-degraded-value returned by stages that fall back
//! - [`TrackerConfig`]: YAML/environment configuration

pub mod config;
pub mod detection;
pub mod device;
pub mod outcome;
pub mod pose;
pub mod quality;
pub mod session_state;
pub mod transform;

pub use config::{DetectorConfig, LoggingConfig, SessionConfig, TrackerConfig, TrackingConfig};
pub use detection::{BoundingBox, DetectedObject, EncodedFrame};
pub use device::{DeviceProfile, Platform};
pub use outcome::{DegradeReason, Outcome};
pub use pose::{Landmark, Point2, PoseFrame, SmoothedPose};
pub use quality::{PerformanceTier, QualitySettings, ShadowQuality};
pub use session_state::{SessionState, TrackingPhase};
pub use transform::{TrackedTransform, Vec3};
