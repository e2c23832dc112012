// Try-on tracker - pose tracking and model placement for AR try-on
//
// Library crate with the tracking pipeline. The binary (main.rs) runs a headless
// session against synthetic collaborators.

pub mod config;
pub mod headless;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::TrackingMetrics;
pub use models::{DegradeReason, DeviceProfile, Outcome, PerformanceTier, TrackerConfig};
pub use services::{ArSession, SessionDeps, SessionError};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
