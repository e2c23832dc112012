use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::quality::PerformanceTier;

/// Top-level settings loaded from `tryon.yaml` plus `TRYON_*` environment overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Ordered GPU score table: regex pattern (case-insensitive) → points.
    /// First matching pattern wins; an empty table means the built-in defaults.
    #[serde(default)]
    pub gpu_rules: IndexMap<String, u32>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

/// Remote detector endpoint and landmark service tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Base URL of the vision service; empty means offline (synthetic poses only)
    #[serde(default)]
    pub endpoint: String,

    /// Access key; normally supplied as `TRYON_DETECTOR__API_KEY`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    #[serde(default = "default_request_path")]
    pub request_path: String,

    #[serde(default = "default_cache_timeout_ms")]
    pub cache_timeout_ms: u64,

    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    #[serde(default = "default_person_confidence_floor")]
    pub person_confidence_floor: f32,

    /// Byte stride used when hashing frame content for the cache key
    #[serde(default = "default_hash_stride")]
    pub hash_stride: usize,

    /// Run an explicit cache cleanup pass every N processed ticks (0 disables)
    #[serde(default = "default_cache_cleanup_every")]
    pub cache_cleanup_every: u64,
}

impl DetectorConfig {
    pub fn is_offline(&self) -> bool {
        self.endpoint.trim().is_empty()
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            request_path: default_request_path(),
            cache_timeout_ms: default_cache_timeout_ms(),
            rate_limit_ms: default_rate_limit_ms(),
            person_confidence_floor: default_person_confidence_floor(),
            hash_stride: default_hash_stride(),
            cache_cleanup_every: default_cache_cleanup_every(),
        }
    }
}

/// Tracking loop and smoothing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Try to run detection in a background worker context
    #[serde(default = "default_true")]
    pub offload: bool,

    #[serde(default = "default_worker_init_timeout_ms")]
    pub worker_init_timeout_ms: u64,

    #[serde(default = "default_min_shoulder_confidence")]
    pub min_shoulder_confidence: f32,

    #[serde(default = "default_history_size")]
    pub history_size: usize,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: f32,

    /// Process one of every N ticks on the minimal tier
    #[serde(default = "default_minimal_tier_frame_skip")]
    pub minimal_tier_frame_skip: u64,
}

impl TrackingConfig {
    pub fn worker_init_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_init_timeout_ms)
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            offload: true,
            worker_init_timeout_ms: default_worker_init_timeout_ms(),
            min_shoulder_confidence: default_min_shoulder_confidence(),
            history_size: default_history_size(),
            jpeg_quality: default_jpeg_quality(),
            minimal_tier_frame_skip: default_minimal_tier_frame_skip(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,

    #[serde(default = "default_log_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            prefix: default_log_prefix(),
            debug: false,
            console: true,
        }
    }
}

/// Settings for the headless session binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_run_seconds")]
    pub run_seconds: u64,

    /// Pretend to be this browser/device when classifying the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Battery level (0.0..=1.0) fed to the power-saver policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f32>,

    /// Skip scoring and use this tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_tier: Option<PerformanceTier>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            run_seconds: default_run_seconds(),
            user_agent: None,
            battery_level: None,
            force_tier: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_request_path() -> String {
    "/vision/v3.2/detect".to_string()
}

fn default_cache_timeout_ms() -> u64 {
    500
}

fn default_rate_limit_ms() -> u64 {
    100
}

fn default_person_confidence_floor() -> f32 {
    0.5
}

fn default_hash_stride() -> usize {
    1000
}

fn default_cache_cleanup_every() -> u64 {
    30
}

fn default_worker_init_timeout_ms() -> u64 {
    1000
}

fn default_min_shoulder_confidence() -> f32 {
    0.5
}

fn default_history_size() -> usize {
    5
}

fn default_jpeg_quality() -> f32 {
    0.7
}

fn default_minimal_tier_frame_skip() -> u64 {
    3
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_prefix() -> String {
    "tryon".to_string()
}

fn default_run_seconds() -> u64 {
    10
}
