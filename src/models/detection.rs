use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixels of the source image
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.w / 2.0
    }
}

/// One object reported by the remote detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    #[serde(rename = "object", default)]
    pub label: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(rename = "rectangle")]
    pub rect: BoundingBox,
}

impl DetectedObject {
    pub fn new(label: impl Into<String>, confidence: f32, rect: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            rect,
        }
    }

    /// Case-insensitive "person" substring match on the label
    pub fn is_person(&self) -> bool {
        self.label.to_lowercase().contains("person")
    }
}

/// A captured, compressed video frame on its way to detection
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    /// Monotonic per-session frame number
    pub id: u64,
    pub bytes: Bytes,
    /// Pixel size of the encoded image
    pub width: u32,
    pub height: u32,
}

impl EncodedFrame {
    pub fn new(id: u64, bytes: Bytes, width: u32, height: u32) -> Self {
        Self {
            id,
            bytes,
            width,
            height,
        }
    }
}
