use std::time::Duration;
use tokio::time::Instant;

use crate::models::QualitySettings;

/// Settings forced by the power saver when the battery runs low
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSaverOverride {
    pub tracking_fps: u32,
    pub render_scale: f32,
    pub disable_effects: bool,
    pub reduce_processing: bool,
}

/// Power-saver override for a battery level: below 20% and below 50%
pub fn battery_override(battery_level: f32) -> Option<PowerSaverOverride> {
    if battery_level < 0.2 {
        Some(PowerSaverOverride {
            tracking_fps: 10,
            render_scale: 0.5,
            disable_effects: true,
            reduce_processing: true,
        })
    } else if battery_level < 0.5 {
        Some(PowerSaverOverride {
            tracking_fps: 15,
            render_scale: 0.7,
            disable_effects: false,
            reduce_processing: false,
        })
    } else {
        None
    }
}

/// Apply a power-saver override. Never raises quality above the tier's own settings.
pub fn apply_power_saver(settings: &QualitySettings, saver: &PowerSaverOverride) -> QualitySettings {
    let mut adjusted = settings.clone();
    adjusted.tracking_fps = adjusted.tracking_fps.min(saver.tracking_fps);
    adjusted.render_scale = adjusted.render_scale.min(saver.render_scale);
    if saver.disable_effects {
        adjusted.antialiasing = false;
        adjusted.enable_post_processing = false;
    }
    adjusted
}

/// Recommendation produced when the measured rate falls behind the target
#[derive(Debug, Clone, PartialEq)]
pub struct QualityAdvice {
    pub reduce_quality: bool,
    pub recommendations: Vec<&'static str>,
}

/// Advise a quality reduction when `current_fps` is under 80% of `target_fps`
pub fn adaptive_quality_reduction(current_fps: f32, target_fps: f32) -> QualityAdvice {
    if current_fps < target_fps * 0.8 {
        QualityAdvice {
            reduce_quality: true,
            recommendations: vec![
                "Reduce texture resolution",
                "Disable shadows",
                "Lower polygon count",
                "Reduce tracking frequency",
            ],
        }
    } else {
        QualityAdvice {
            reduce_quality: false,
            recommendations: Vec::new(),
        }
    }
}

/// Counts processed frames over one-second windows.
#[derive(Debug)]
pub struct FrameRateMonitor {
    window: Duration,
    window_start: Instant,
    frames: u32,
    last_rate: Option<f32>,
}

impl FrameRateMonitor {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            window_start: Instant::now(),
            frames: 0,
            last_rate: None,
        }
    }

    /// Count one frame; returns the measured rate when a window closes
    pub fn record_frame(&mut self) -> Option<f32> {
        self.frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed < self.window {
            return None;
        }

        let rate = self.frames as f32 / elapsed.as_secs_f32();
        self.last_rate = Some(rate);
        self.frames = 0;
        self.window_start = Instant::now();
        Some(rate)
    }

    pub fn last_rate(&self) -> Option<f32> {
        self.last_rate
    }
}

impl Default for FrameRateMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PerformanceTier;
    use crate::services::quality_policy::settings_for;

    #[test]
    fn test_battery_thresholds() {
        let critical = battery_override(0.1).unwrap();
        assert_eq!(critical.tracking_fps, 10);
        assert!(critical.disable_effects);

        let low = battery_override(0.3).unwrap();
        assert_eq!(low.tracking_fps, 15);
        assert!(!low.disable_effects);

        assert!(battery_override(0.5).is_none());
        assert!(battery_override(0.9).is_none());
    }

    #[test]
    fn test_power_saver_never_raises_quality() {
        let minimal = settings_for(PerformanceTier::Minimal);
        let saver = battery_override(0.3).unwrap();
        let adjusted = apply_power_saver(&minimal, &saver);
        assert_eq!(adjusted.tracking_fps, 10);
        assert_eq!(adjusted.render_scale, 0.5);

        let high = settings_for(PerformanceTier::High);
        let saver = battery_override(0.1).unwrap();
        let adjusted = apply_power_saver(&high, &saver);
        assert_eq!(adjusted.tracking_fps, 10);
        assert!(!adjusted.antialiasing);
        assert!(!adjusted.enable_post_processing);
    }

    #[test]
    fn test_adaptive_quality_reduction() {
        assert!(adaptive_quality_reduction(15.0, 20.0).reduce_quality);
        assert!(!adaptive_quality_reduction(16.0, 20.0).reduce_quality);
        assert_eq!(adaptive_quality_reduction(5.0, 30.0).recommendations.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_rate_monitor_window() {
        let mut monitor = FrameRateMonitor::new();
        for _ in 0..9 {
            tokio::time::advance(Duration::from_millis(100)).await;
            assert!(monitor.record_frame().is_none());
        }
        tokio::time::advance(Duration::from_millis(100)).await;
        let rate = monitor.record_frame().unwrap();
        assert!((rate - 10.0).abs() < 0.01);
        assert_eq!(monitor.last_rate(), Some(rate));
    }
}
