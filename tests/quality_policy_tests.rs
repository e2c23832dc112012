//! Integration tests for device profiling and the tier policy
//!
//! Covers the score-to-tier mapping end to end (probe -> profile -> tier ->
//! settings) and the monotonicity properties of the score.

use indexmap::IndexMap;
use proptest::prelude::*;
use tryon_tracker::models::{DeviceProfile, PerformanceTier, Platform};
use tryon_tracker::services::quality_policy::{QualityPolicy, settings_for, tier_for_score};
use tryon_tracker::services::{DeviceProfiler, StaticProbe};

const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

fn profile(memory_gb: f32, cpu_cores: u32, gpu: &str, is_mobile: bool) -> DeviceProfile {
    DeviceProfile {
        memory_gb,
        cpu_cores,
        gpu_descriptor: gpu.to_string(),
        is_mobile,
        ..Default::default()
    }
}

#[test]
fn test_iphone_with_a15_profiles_to_high_at_30_fps() {
    let probe = StaticProbe {
        user_agent: Some(IPHONE_UA.to_string()),
        screen_size: Some((390, 844)),
        device_pixel_ratio: Some(3.0),
        memory_gb: Some(8.0),
        cpu_cores: Some(8),
        gpu_renderer: Some("Apple A15 GPU".to_string()),
        ..Default::default()
    };

    let device = DeviceProfiler::new().profile(&probe);
    assert!(device.is_mobile);
    assert_eq!(device.platform, Platform::IOS);

    let policy = QualityPolicy::default();
    assert_eq!(policy.score(&device), 80);

    let tier = policy.score_to_tier(&device);
    assert_eq!(tier, PerformanceTier::High);
    assert_eq!(settings_for(tier).tracking_fps, 30);
}

#[test]
fn test_probe_without_capabilities_gets_conservative_tier() {
    let device = DeviceProfiler::new().profile(&StaticProbe::default());
    assert_eq!(device.gpu_descriptor, "unknown");

    // memory 10 + cores 20 + unknown gpu 10
    let policy = QualityPolicy::default();
    assert_eq!(policy.score(&device), 40);
    assert_eq!(policy.score_to_tier(&device), PerformanceTier::Low);
}

#[test]
fn test_threshold_boundaries_are_inclusive() {
    assert_eq!(tier_for_score(70), PerformanceTier::High);
    assert_eq!(tier_for_score(69), PerformanceTier::Medium);
    assert_eq!(tier_for_score(50), PerformanceTier::Medium);
    assert_eq!(tier_for_score(49), PerformanceTier::Low);
    assert_eq!(tier_for_score(30), PerformanceTier::Low);
    assert_eq!(tier_for_score(29), PerformanceTier::Minimal);
    assert_eq!(tier_for_score(-10), PerformanceTier::Minimal);
}

#[test]
fn test_every_tier_has_settings_and_fps_decreases() {
    let fps: Vec<u32> = PerformanceTier::ALL
        .iter()
        .map(|tier| settings_for(*tier).tracking_fps)
        .collect();
    assert_eq!(fps, vec![30, 20, 15, 10]);

    for tier in PerformanceTier::ALL {
        let settings = settings_for(tier);
        assert!(settings.render_scale > 0.0 && settings.render_scale <= 1.0);
        assert!(settings.max_lights >= 1);
    }
}

#[test]
fn test_configured_gpu_table_replaces_defaults() {
    let mut rules = IndexMap::new();
    rules.insert("geforce rtx".to_string(), 35);
    rules.insert("geforce".to_string(), 20);
    let policy = QualityPolicy::from_config(&rules).unwrap();

    let desktop = profile(16.0, 16, "NVIDIA GeForce RTX 4070", false);
    assert_eq!(policy.score(&desktop), 90);

    // Default table entries no longer apply; unmatched GPUs get the unknown points
    let phone = profile(8.0, 8, "Apple A15 GPU", true);
    assert_eq!(policy.score(&phone), 30 + 25 + 10 - 10);
}

#[test]
fn test_invalid_gpu_pattern_is_rejected() {
    let mut rules = IndexMap::new();
    rules.insert("adreno (".to_string(), 30);
    assert!(QualityPolicy::from_config(&rules).is_err());
}

proptest! {
    #[test]
    fn prop_score_monotonic_in_memory(
        low in 0.0f32..16.0,
        extra in 0.0f32..16.0,
        cores in 1u32..32,
        mobile in any::<bool>(),
    ) {
        let policy = QualityPolicy::default();
        let a = profile(low, cores, "Mali-G78", mobile);
        let b = profile(low + extra, cores, "Mali-G78", mobile);
        prop_assert!(policy.score(&b) >= policy.score(&a));
        prop_assert!(policy.score_to_tier(&b) >= policy.score_to_tier(&a));
    }

    #[test]
    fn prop_score_monotonic_in_cores(
        memory in 0.0f32..16.0,
        cores in 1u32..32,
        extra in 0u32..32,
        mobile in any::<bool>(),
    ) {
        let policy = QualityPolicy::default();
        let a = profile(memory, cores, "unknown", mobile);
        let b = profile(memory, cores + extra, "unknown", mobile);
        prop_assert!(policy.score(&b) >= policy.score(&a));
        prop_assert!(policy.score_to_tier(&b) >= policy.score_to_tier(&a));
    }

    #[test]
    fn prop_mobile_never_scores_higher(memory in 0.0f32..16.0, cores in 1u32..32) {
        let policy = QualityPolicy::default();
        let desktop = profile(memory, cores, "Adreno 650", false);
        let mobile = profile(memory, cores, "Adreno 650", true);
        prop_assert_eq!(policy.score(&desktop) - policy.score(&mobile), 10);
    }
}
