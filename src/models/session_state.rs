use super::outcome::DegradeReason;
use super::quality::PerformanceTier;
use crate::services::camera::FacingMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingPhase {
    #[default]
    Idle,
    Tracking,
}

/// Observable state of the current AR session.
///
/// Owned by [`crate::state::StateManager`]; never mutated directly.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub phase: TrackingPhase,

    /// Incremented on every tracking start; results from an older id are stale
    pub session_id: u64,

    pub tier: Option<PerformanceTier>,
    pub target_fps: u32,

    pub facing: Option<FacingMode>,

    /// Detection currently runs in the background context
    pub offloaded: bool,

    /// Most recent degradation observed by any stage
    pub last_degrade: Option<DegradeReason>,

    /// Last one-second processing rate
    pub measured_fps: Option<f32>,
    pub reduce_quality_advised: bool,
}

impl SessionState {
    pub fn is_tracking(&self) -> bool {
        self.phase == TrackingPhase::Tracking
    }

    /// True only while tracking for the given session start
    pub fn is_tracking_session(&self, session_id: u64) -> bool {
        self.is_tracking() && self.session_id == session_id
    }
}
