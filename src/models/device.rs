use serde::{Deserialize, Serialize};

/// Operating platform family, as far as the probe can tell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "ios")]
    IOS,
    Android,
    Other,
}

/// Immutable snapshot of the runtime environment, taken once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub is_mobile: bool,
    pub is_tablet: bool,
    pub platform: Platform,
    pub screen_width: u32,
    pub screen_height: u32,
    pub device_pixel_ratio: f32,
    pub memory_gb: f32,
    pub cpu_cores: u32,
    pub gpu_descriptor: String,
}

impl DeviceProfile {
    pub fn is_ios(&self) -> bool {
        self.platform == Platform::IOS
    }

    pub fn is_android(&self) -> bool {
        self.platform == Platform::Android
    }
}

impl Default for DeviceProfile {
    /// Conservative profile used when capability queries are unavailable
    fn default() -> Self {
        Self {
            is_mobile: false,
            is_tablet: false,
            platform: Platform::Other,
            screen_width: 1920,
            screen_height: 1080,
            device_pixel_ratio: 1.0,
            memory_gb: 2.0,
            cpu_cores: 4,
            gpu_descriptor: "unknown".to_string(),
        }
    }
}
