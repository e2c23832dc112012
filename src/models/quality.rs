use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse performance class derived from a device profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
    Minimal,
    Low,
    Medium,
    High,
}

impl PerformanceTier {
    pub const ALL: [PerformanceTier; 4] = [Self::High, Self::Medium, Self::Low, Self::Minimal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Minimal => "minimal",
        }
    }
}

impl fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowQuality {
    High,
    Medium,
    Low,
    None,
}

/// Rendering and tracking settings for one performance tier.
#[derive(Debug, Clone, PartialEq)]
pub struct QualitySettings {
    /// Key into a product's model variants ("original", "medium", ...)
    pub model_quality: &'static str,
    pub texture_size: u32,
    pub render_scale: f32,
    pub shadow_quality: ShadowQuality,
    pub antialiasing: bool,
    pub tracking_fps: u32,
    pub max_polygons: u32,
    pub enable_post_processing: bool,
    pub max_lights: u32,
}

impl QualitySettings {
    /// Milliseconds between tracking ticks, `floor(1000 / fps)`
    pub fn tracking_interval_ms(&self) -> u64 {
        1000 / u64::from(self.tracking_fps.max(1))
    }
}
