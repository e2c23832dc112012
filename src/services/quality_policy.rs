use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::models::{DeviceProfile, PerformanceTier, QualitySettings, ShadowQuality};

/// Points awarded when no GPU rule matches (unknown or integrated)
pub const UNKNOWN_GPU_POINTS: u32 = 10;

/// Deduction applied to phones and tablets
pub const MOBILE_PENALTY: i32 = 10;

#[derive(Error, Debug)]
pub enum QualityPolicyError {
    #[error("Invalid GPU rule pattern '{pattern}': {source}")]
    InvalidGpuPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// One entry of the GPU score table
#[derive(Debug, Clone)]
pub struct GpuRule {
    pub pattern: Regex,
    pub points: u32,
}

/// Ordered, replaceable mapping from GPU renderer strings to score points.
///
/// Rules are tried in order; the first match wins.
#[derive(Debug, Clone)]
pub struct GpuScoreTable {
    rules: Vec<GpuRule>,
    fallback_points: u32,
}

impl GpuScoreTable {
    /// Build a table from `pattern → points`, keeping the map's order
    pub fn from_rules(rules: &IndexMap<String, u32>) -> Result<Self, QualityPolicyError> {
        let rules = rules
            .iter()
            .map(|(pattern, points)| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|pattern| GpuRule {
                        pattern,
                        points: *points,
                    })
                    .map_err(|source| QualityPolicyError::InvalidGpuPattern {
                        pattern: pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules,
            fallback_points: UNKNOWN_GPU_POINTS,
        })
    }

    /// High-end mobile 35, mid-range 25, other known mobile vendors 15
    pub fn default_rules() -> IndexMap<String, u32> {
        let mut rules = IndexMap::new();
        rules.insert(r"adreno 6|mali-g7|apple a1".to_string(), 35);
        rules.insert(r"adreno 5|mali-g5".to_string(), 25);
        rules.insert(r"adreno|mali|apple".to_string(), 15);
        rules
    }

    pub fn points_for(&self, gpu_descriptor: &str) -> u32 {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(gpu_descriptor))
            .map(|rule| rule.points)
            .unwrap_or(self.fallback_points)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for GpuScoreTable {
    fn default() -> Self {
        Self::from_rules(&Self::default_rules()).expect("Invalid built-in GPU rules")
    }
}

/// Maps device profiles to tiers, and tiers to settings.
#[derive(Debug, Clone, Default)]
pub struct QualityPolicy {
    gpu_table: GpuScoreTable,
}

impl QualityPolicy {
    pub fn new(gpu_table: GpuScoreTable) -> Self {
        Self { gpu_table }
    }

    /// Policy from configured GPU rules; an empty map selects the built-in table
    pub fn from_config(gpu_rules: &IndexMap<String, u32>) -> Result<Self, QualityPolicyError> {
        if gpu_rules.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self::new(GpuScoreTable::from_rules(gpu_rules)?))
    }

    /// Weighted point score: memory 0-30, cores 10-25, GPU per table, mobile -10
    pub fn score(&self, profile: &DeviceProfile) -> i32 {
        let memory = memory_points(profile.memory_gb);
        let cores = core_points(profile.cpu_cores);
        let gpu = self.gpu_table.points_for(&profile.gpu_descriptor) as i32;
        let penalty = if profile.is_mobile { MOBILE_PENALTY } else { 0 };

        memory + cores + gpu - penalty
    }

    pub fn score_to_tier(&self, profile: &DeviceProfile) -> PerformanceTier {
        let score = self.score(profile);
        let tier = tier_for_score(score);
        tracing::info!("Performance score {} -> {} tier", score, tier);
        tier
    }
}

fn memory_points(memory_gb: f32) -> i32 {
    if memory_gb >= 8.0 {
        30
    } else if memory_gb >= 4.0 {
        20
    } else if memory_gb >= 2.0 {
        10
    } else {
        0
    }
}

fn core_points(cores: u32) -> i32 {
    if cores >= 8 {
        25
    } else if cores >= 4 {
        20
    } else if cores >= 2 {
        15
    } else {
        10
    }
}

/// Inclusive thresholds: >=70 high, >=50 medium, >=30 low, otherwise minimal
pub fn tier_for_score(score: i32) -> PerformanceTier {
    if score >= 70 {
        PerformanceTier::High
    } else if score >= 50 {
        PerformanceTier::Medium
    } else if score >= 30 {
        PerformanceTier::Low
    } else {
        PerformanceTier::Minimal
    }
}

/// Settings bundle for a tier. Total over all tiers.
pub fn settings_for(tier: PerformanceTier) -> QualitySettings {
    match tier {
        PerformanceTier::High => QualitySettings {
            model_quality: "original",
            texture_size: 1024,
            render_scale: 1.0,
            shadow_quality: ShadowQuality::High,
            antialiasing: true,
            tracking_fps: 30,
            max_polygons: 50_000,
            enable_post_processing: true,
            max_lights: 8,
        },
        PerformanceTier::Medium => QualitySettings {
            model_quality: "medium",
            texture_size: 512,
            render_scale: 0.8,
            shadow_quality: ShadowQuality::Medium,
            antialiasing: false,
            tracking_fps: 20,
            max_polygons: 25_000,
            enable_post_processing: false,
            max_lights: 4,
        },
        PerformanceTier::Low => QualitySettings {
            model_quality: "low",
            texture_size: 256,
            render_scale: 0.6,
            shadow_quality: ShadowQuality::Low,
            antialiasing: false,
            tracking_fps: 15,
            max_polygons: 10_000,
            enable_post_processing: false,
            max_lights: 2,
        },
        PerformanceTier::Minimal => QualitySettings {
            model_quality: "minimal",
            texture_size: 128,
            render_scale: 0.5,
            shadow_quality: ShadowQuality::None,
            antialiasing: false,
            tracking_fps: 10,
            max_polygons: 5_000,
            enable_post_processing: false,
            max_lights: 1,
        },
    }
}
