use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{
    DegradeReason, DeviceProfile, Outcome, QualitySettings, TrackedTransform, Vec3,
};

pub const MOBILE_MODEL_SCALE: f32 = 0.4;
pub const DESKTOP_MODEL_SCALE: f32 = 0.5;

/// Primitive box used when the product model cannot be loaded
pub const PLACEHOLDER_SIZE: Vec3 = Vec3 {
    x: 0.3,
    y: 0.4,
    z: 0.1,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("Failed to load model from {url}: {reason}")]
    LoadFailed { url: String, reason: String },

    #[error("Scene has been disposed")]
    Disposed,

    #[error("Scene error: {0}")]
    Other(String),
}

/// What the scene is currently showing
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    Asset { url: String },
    Placeholder { size: Vec3 },
}

/// Handle to the model held by the scene
#[derive(Debug, Clone, PartialEq)]
pub struct ModelHandle {
    pub id: u64,
    pub source: ModelSource,
    pub scale: f32,
}

impl ModelHandle {
    pub fn is_placeholder(&self) -> bool {
        matches!(self.source, ModelSource::Placeholder { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub url: String,
    pub scale: f32,
}

/// Product catalogue entry: model URLs keyed by quality label
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub product_id: String,
    pub category: String,
    #[serde(default)]
    pub models: IndexMap<String, String>,
}

impl ModelDescriptor {
    /// URL for the quality label, else the category's generic fallback asset
    pub fn url_for(&self, quality: &str) -> String {
        match self.models.get(quality) {
            Some(url) => url.clone(),
            None => format!("/models/fallback/{}-tote.glb", self.category),
        }
    }
}

pub fn model_scale(profile: &DeviceProfile) -> f32 {
    if profile.is_mobile {
        MOBILE_MODEL_SCALE
    } else {
        DESKTOP_MODEL_SCALE
    }
}

/// The 3D scene that renders the tracked model.
///
/// `current_model` doubles as a readiness gate: placement does nothing
/// while it is `None`.
#[cfg_attr(test, mockall::automock)]
pub trait ArScene: Send + Sync {
    fn load_model(&self, request: ModelRequest) -> BoxFuture<'static, Result<ModelHandle, SceneError>>;

    fn load_placeholder(&self, size: Vec3, scale: f32) -> Result<ModelHandle, SceneError>;

    fn current_model(&self) -> Option<ModelHandle>;

    fn transform(&self) -> TrackedTransform;

    fn set_transform(&self, position: Vec3, rotation: Vec3);

    fn dispose(&self);
}

/// Load the product model for the given settings, falling back to the
/// primitive placeholder when the asset fails.
///
/// Only a placeholder failure is fatal.
pub async fn load_model_with_fallback(
    scene: &dyn ArScene,
    descriptor: &ModelDescriptor,
    settings: &QualitySettings,
    profile: &DeviceProfile,
) -> Result<Outcome<ModelHandle>, SceneError> {
    let request = ModelRequest {
        url: descriptor.url_for(settings.model_quality),
        scale: model_scale(profile),
    };
    info!(
        "Loading model for {} ({} quality): {}",
        descriptor.product_id, settings.model_quality, request.url
    );

    let scale = request.scale;
    match scene.load_model(request).await {
        Ok(handle) => Ok(Outcome::Ok(handle)),
        Err(e) => {
            warn!("Model load failed, using placeholder: {}", e);
            let handle = scene.load_placeholder(PLACEHOLDER_SIZE, scale)?;
            Ok(Outcome::degraded(handle, DegradeReason::ModelLoadFailure))
        }
    }
}
