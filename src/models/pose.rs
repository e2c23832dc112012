/// Single body keypoint in screen-normalised coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    /// Normalised X (0.0..=1.0)
    pub x: f32,
    /// Normalised Y (0.0..=1.0)
    pub y: f32,
    /// Confidence score (0.0..=1.0)
    pub confidence: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// True when confidence is at or above the threshold
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }
}

/// The four keypoints tracked per processed frame.
///
/// Any point may be missing when the estimator could not place it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoseFrame {
    pub left_shoulder: Option<Landmark>,
    pub right_shoulder: Option<Landmark>,
    pub left_hip: Option<Landmark>,
    pub right_hip: Option<Landmark>,
}

impl PoseFrame {
    pub fn new(
        left_shoulder: Landmark,
        right_shoulder: Landmark,
        left_hip: Landmark,
        right_hip: Landmark,
    ) -> Self {
        Self {
            left_shoulder: Some(left_shoulder),
            right_shoulder: Some(right_shoulder),
            left_hip: Some(left_hip),
            right_hip: Some(right_hip),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.left_shoulder.is_some()
            && self.right_shoulder.is_some()
            && self.left_hip.is_some()
            && self.right_hip.is_some()
    }

    pub fn landmarks(&self) -> impl Iterator<Item = &Landmark> {
        [
            &self.left_shoulder,
            &self.right_shoulder,
            &self.left_hip,
            &self.right_hip,
        ]
        .into_iter()
        .flatten()
    }
}

/// 2D point in normalised screen space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn midpoint(a: &Landmark, b: &Landmark) -> Self {
        Self {
            x: (a.x + b.x) / 2.0,
            y: (a.y + b.y) / 2.0,
        }
    }
}

/// Smoothed shoulder-centre position plus the raw shoulder-line angle (radians)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedPose {
    pub position: Point2,
    pub angle: f32,
}
