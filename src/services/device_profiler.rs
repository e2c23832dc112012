use regex::Regex;
use sysinfo::System;

use crate::models::{DeviceProfile, Platform};

/// Raw capability queries against the runtime environment.
///
/// Every query may be unavailable; the profiler substitutes conservative
/// defaults rather than failing.
pub trait EnvironmentProbe: Send + Sync {
    fn user_agent(&self) -> Option<String>;
    fn screen_size(&self) -> Option<(u32, u32)>;
    fn device_pixel_ratio(&self) -> Option<f32>;
    fn memory_gb(&self) -> Option<f32>;
    fn cpu_cores(&self) -> Option<u32>;
    /// Unmasked GPU renderer string, or a generic marker when only a context exists
    fn gpu_renderer(&self) -> Option<String>;

    /// Battery charge 0.0..=1.0 when the platform reports it
    fn battery_level(&self) -> Option<f32> {
        None
    }

    fn supports_media_capture(&self) -> bool {
        true
    }

    fn supports_rendering(&self) -> bool {
        true
    }

    /// Whether a background execution context can be created for detection
    fn supports_background_context(&self) -> bool {
        true
    }
}

/// Mobile/tablet/platform flags derived from a user-agent string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserAgentClass {
    pub is_mobile: bool,
    pub is_tablet: bool,
    pub platform: Platform,
}

/// Builds a [`DeviceProfile`] from an [`EnvironmentProbe`].
///
/// User-agent patterns are compiled once at construction.
pub struct DeviceProfiler {
    mobile_pattern: Regex,
    ipad_pattern: Regex,
    ios_pattern: Regex,
    android_pattern: Regex,
    phone_token: Regex,
}

impl DeviceProfiler {
    pub fn new() -> Self {
        Self {
            mobile_pattern: Regex::new(
                r"(?i)android|webos|iphone|ipad|ipod|blackberry|iemobile|opera mini",
            )
            .expect("Invalid mobile regex"),
            ipad_pattern: Regex::new(r"(?i)ipad").expect("Invalid iPad regex"),
            ios_pattern: Regex::new(r"(?i)iphone|ipad|ipod").expect("Invalid iOS regex"),
            android_pattern: Regex::new(r"(?i)android").expect("Invalid Android regex"),
            phone_token: Regex::new(r"(?i)\bmobile\b").expect("Invalid phone token regex"),
        }
    }

    /// Classify a user-agent string.
    ///
    /// A tablet is an iPad, or an Android device whose agent lacks the "Mobile" token.
    pub fn classify_user_agent(&self, user_agent: &str) -> UserAgentClass {
        let is_mobile = self.mobile_pattern.is_match(user_agent);
        let is_ios = self.ios_pattern.is_match(user_agent);
        let is_android = self.android_pattern.is_match(user_agent);

        let is_tablet = self.ipad_pattern.is_match(user_agent)
            || (is_android && !self.phone_token.is_match(user_agent));

        let platform = if is_ios {
            Platform::IOS
        } else if is_android {
            Platform::Android
        } else {
            Platform::Other
        };

        UserAgentClass {
            is_mobile,
            is_tablet,
            platform,
        }
    }

    /// Take the session's device snapshot. Never fails.
    pub fn profile(&self, probe: &dyn EnvironmentProbe) -> DeviceProfile {
        let defaults = DeviceProfile::default();

        let class = probe
            .user_agent()
            .map(|ua| self.classify_user_agent(&ua))
            .unwrap_or(UserAgentClass {
                is_mobile: defaults.is_mobile,
                is_tablet: defaults.is_tablet,
                platform: defaults.platform,
            });

        let (screen_width, screen_height) = probe
            .screen_size()
            .filter(|(w, h)| *w > 0 && *h > 0)
            .unwrap_or((defaults.screen_width, defaults.screen_height));

        let profile = DeviceProfile {
            is_mobile: class.is_mobile,
            is_tablet: class.is_tablet,
            platform: class.platform,
            screen_width,
            screen_height,
            device_pixel_ratio: probe
                .device_pixel_ratio()
                .filter(|dpr| *dpr > 0.0)
                .unwrap_or(defaults.device_pixel_ratio),
            memory_gb: probe
                .memory_gb()
                .filter(|m| *m > 0.0)
                .unwrap_or(defaults.memory_gb),
            cpu_cores: probe
                .cpu_cores()
                .filter(|c| *c > 0)
                .unwrap_or(defaults.cpu_cores),
            gpu_descriptor: probe
                .gpu_renderer()
                .filter(|g| !g.trim().is_empty())
                .unwrap_or(defaults.gpu_descriptor),
        };

        tracing::info!(
            "Device profile: mobile={}, tablet={}, platform={:?}, screen={}x{}, memory={}GB, cores={}, gpu={}",
            profile.is_mobile,
            profile.is_tablet,
            profile.platform,
            profile.screen_width,
            profile.screen_height,
            profile.memory_gb,
            profile.cpu_cores,
            profile.gpu_descriptor
        );

        profile
    }
}

impl Default for DeviceProfiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the environment can run the try-on experience at all
pub fn is_ar_supported(probe: &dyn EnvironmentProbe) -> bool {
    probe.supports_media_capture() && probe.supports_rendering()
}

/// Probe with fixed answers, for configured devices and tests
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    pub user_agent: Option<String>,
    pub screen_size: Option<(u32, u32)>,
    pub device_pixel_ratio: Option<f32>,
    pub memory_gb: Option<f32>,
    pub cpu_cores: Option<u32>,
    pub gpu_renderer: Option<String>,
    pub battery_level: Option<f32>,
    pub no_background_context: bool,
}

impl EnvironmentProbe for StaticProbe {
    fn user_agent(&self) -> Option<String> {
        self.user_agent.clone()
    }

    fn screen_size(&self) -> Option<(u32, u32)> {
        self.screen_size
    }

    fn device_pixel_ratio(&self) -> Option<f32> {
        self.device_pixel_ratio
    }

    fn memory_gb(&self) -> Option<f32> {
        self.memory_gb
    }

    fn cpu_cores(&self) -> Option<u32> {
        self.cpu_cores
    }

    fn gpu_renderer(&self) -> Option<String> {
        self.gpu_renderer.clone()
    }

    fn battery_level(&self) -> Option<f32> {
        self.battery_level
    }

    fn supports_background_context(&self) -> bool {
        !self.no_background_context
    }
}

/// Probe backed by the host operating system.
///
/// Memory and core count come from `sysinfo`; there is no GPU context, so the
/// renderer is reported as unavailable.
pub struct SystemProbe {
    user_agent: Option<String>,
    battery_level: Option<f32>,
    memory_gb: Option<f32>,
    cpu_cores: Option<u32>,
}

impl SystemProbe {
    pub fn new(user_agent: Option<String>, battery_level: Option<f32>) -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu();

        let total_bytes = system.total_memory();
        let memory_gb = (total_bytes > 0).then(|| total_bytes as f32 / (1024.0 * 1024.0 * 1024.0));
        let cpu_cores = match system.cpus().len() {
            0 => None,
            n => Some(n as u32),
        };

        tracing::debug!(
            "Host probe: memory={:?}GB, cores={:?}",
            memory_gb,
            cpu_cores
        );

        Self {
            user_agent,
            battery_level,
            memory_gb,
            cpu_cores,
        }
    }
}

impl EnvironmentProbe for SystemProbe {
    fn user_agent(&self) -> Option<String> {
        self.user_agent.clone()
    }

    fn screen_size(&self) -> Option<(u32, u32)> {
        None
    }

    fn device_pixel_ratio(&self) -> Option<f32> {
        None
    }

    fn memory_gb(&self) -> Option<f32> {
        self.memory_gb
    }

    fn cpu_cores(&self) -> Option<u32> {
        self.cpu_cores
    }

    fn gpu_renderer(&self) -> Option<String> {
        None
    }

    fn battery_level(&self) -> Option<f32> {
        self.battery_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148";
    const IPAD_UA: &str = "Mozilla/5.0 (iPad; CPU OS 16_0 like Mac OS X) AppleWebKit/605.1.15";
    const ANDROID_PHONE_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 Chrome/120.0 Mobile Safari/537.36";
    const ANDROID_TABLET_UA: &str = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";
    const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";

    #[test]
    fn test_classify_iphone() {
        let profiler = DeviceProfiler::new();
        let class = profiler.classify_user_agent(IPHONE_UA);
        assert!(class.is_mobile);
        assert!(!class.is_tablet);
        assert_eq!(class.platform, Platform::IOS);
    }

    #[test]
    fn test_classify_ipad_is_tablet() {
        let profiler = DeviceProfiler::new();
        let class = profiler.classify_user_agent(IPAD_UA);
        assert!(class.is_mobile);
        assert!(class.is_tablet);
        assert_eq!(class.platform, Platform::IOS);
    }

    #[test]
    fn test_classify_android_phone_and_tablet() {
        let profiler = DeviceProfiler::new();

        let phone = profiler.classify_user_agent(ANDROID_PHONE_UA);
        assert!(phone.is_mobile);
        assert!(!phone.is_tablet);
        assert_eq!(phone.platform, Platform::Android);

        let tablet = profiler.classify_user_agent(ANDROID_TABLET_UA);
        assert!(tablet.is_tablet);
        assert_eq!(tablet.platform, Platform::Android);
    }

    #[test]
    fn test_classify_desktop() {
        let profiler = DeviceProfiler::new();
        let class = profiler.classify_user_agent(DESKTOP_UA);
        assert!(!class.is_mobile);
        assert!(!class.is_tablet);
        assert_eq!(class.platform, Platform::Other);
    }

    #[test]
    fn test_profile_empty_probe_uses_conservative_defaults() {
        let profiler = DeviceProfiler::new();
        let profile = profiler.profile(&StaticProbe::default());

        assert_eq!(profile, DeviceProfile::default());
        assert_eq!(profile.gpu_descriptor, "unknown");
        assert_eq!(profile.memory_gb, 2.0);
    }

    #[test]
    fn test_profile_reads_probe() {
        let profiler = DeviceProfiler::new();
        let probe = StaticProbe {
            user_agent: Some(IPHONE_UA.to_string()),
            screen_size: Some((390, 844)),
            device_pixel_ratio: Some(3.0),
            memory_gb: Some(6.0),
            cpu_cores: Some(6),
            gpu_renderer: Some("Apple A15 GPU".to_string()),
            ..Default::default()
        };
        let profile = profiler.profile(&probe);

        assert!(profile.is_mobile);
        assert!(profile.is_ios());
        assert_eq!(profile.screen_width, 390);
        assert_eq!(profile.cpu_cores, 6);
        assert_eq!(profile.gpu_descriptor, "Apple A15 GPU");
    }

    #[test]
    fn test_profile_ignores_nonsense_values() {
        let profiler = DeviceProfiler::new();
        let probe = StaticProbe {
            screen_size: Some((0, 0)),
            memory_gb: Some(0.0),
            cpu_cores: Some(0),
            gpu_renderer: Some("   ".to_string()),
            ..Default::default()
        };
        let profile = profiler.profile(&probe);
        assert_eq!(profile, DeviceProfile::default());
    }

    #[test]
    fn test_system_probe_reports_host() {
        let probe = SystemProbe::new(None, Some(0.4));
        assert!(probe.gpu_renderer().is_none());
        assert_eq!(probe.battery_level(), Some(0.4));
        if let Some(cores) = probe.cpu_cores() {
            assert!(cores >= 1);
        }
    }
}
