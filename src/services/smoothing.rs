use std::collections::VecDeque;

use crate::models::{Point2, PoseFrame, SmoothedPose};

pub const DEFAULT_HISTORY_SIZE: usize = 5;
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// Recency-weighted smoother over shoulder-centre points.
///
/// The i-th entry (1-indexed, oldest first) of an N-entry history gets
/// weight `i / N`. Frames with a missing or low-confidence shoulder are
/// dropped without touching the history.
#[derive(Debug, Clone)]
pub struct PositionSmoother {
    history: VecDeque<Point2>,
    capacity: usize,
    min_confidence: f32,
}

impl PositionSmoother {
    pub fn new(capacity: usize, min_confidence: f32) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            min_confidence,
        }
    }

    pub fn ingest(&mut self, frame: &PoseFrame) -> Option<SmoothedPose> {
        let left = frame.left_shoulder.filter(|lm| lm.is_valid(self.min_confidence))?;
        let right = frame.right_shoulder.filter(|lm| lm.is_valid(self.min_confidence))?;

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(Point2::midpoint(&left, &right));

        let n = self.history.len() as f32;
        let (mut sum_x, mut sum_y, mut sum_w) = (0.0f32, 0.0f32, 0.0f32);
        for (i, point) in self.history.iter().enumerate() {
            let weight = (i + 1) as f32 / n;
            sum_x += point.x * weight;
            sum_y += point.y * weight;
            sum_w += weight;
        }

        let angle = (right.y - left.y).atan2(right.x - left.x);

        Some(SmoothedPose {
            position: Point2::new(sum_x / sum_w, sum_y / sum_w),
            angle,
        })
    }

    /// Raw midpoints, oldest first
    pub fn history(&self) -> impl Iterator<Item = &Point2> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

impl Default for PositionSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE, DEFAULT_MIN_CONFIDENCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Landmark;

    fn shoulders(lx: f32, ly: f32, rx: f32, ry: f32, confidence: f32) -> PoseFrame {
        PoseFrame {
            left_shoulder: Some(Landmark::new(lx, ly, confidence)),
            right_shoulder: Some(Landmark::new(rx, ry, confidence)),
            left_hip: None,
            right_hip: None,
        }
    }

    #[test]
    fn test_missing_shoulder_rejected() {
        let mut smoother = PositionSmoother::default();
        let mut frame = shoulders(0.4, 0.5, 0.6, 0.5, 0.9);
        frame.right_shoulder = None;

        assert!(smoother.ingest(&frame).is_none());
        assert!(smoother.is_empty());
    }

    #[test]
    fn test_confidence_boundary() {
        let mut smoother = PositionSmoother::default();
        assert!(smoother.ingest(&shoulders(0.4, 0.5, 0.6, 0.5, 0.49)).is_none());
        assert_eq!(smoother.len(), 0);

        assert!(smoother.ingest(&shoulders(0.4, 0.5, 0.6, 0.5, 0.5)).is_some());
        assert_eq!(smoother.len(), 1);
    }

    #[test]
    fn test_single_frame_returns_midpoint() {
        let mut smoother = PositionSmoother::default();
        let out = smoother.ingest(&shoulders(0.4, 0.4, 0.6, 0.6, 0.9)).unwrap();
        assert!((out.position.x - 0.5).abs() < 1e-6);
        assert!((out.position.y - 0.5).abs() < 1e-6);
        assert!((out.angle - std::f32::consts::FRAC_PI_4).abs() < 1e-6);
    }

    #[test]
    fn test_recent_samples_weigh_more() {
        let mut smoother = PositionSmoother::default();
        smoother.ingest(&shoulders(0.0, 0.5, 0.2, 0.5, 0.9));
        let out = smoother.ingest(&shoulders(0.8, 0.5, 1.0, 0.5, 0.9)).unwrap();

        // midpoints 0.1 (w=0.5) and 0.9 (w=1.0): (0.05 + 0.9) / 1.5
        assert!((out.position.x - 0.95 / 1.5).abs() < 1e-6);
        assert!(out.angle.abs() < 1e-6);
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut smoother = PositionSmoother::default();
        for i in 0..7 {
            let x = i as f32 / 10.0;
            smoother.ingest(&shoulders(x, 0.5, x, 0.5, 0.9));
        }
        assert_eq!(smoother.len(), 5);
        let first = smoother.history().next().unwrap();
        assert!((first.x - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut smoother = PositionSmoother::default();
        smoother.ingest(&shoulders(0.4, 0.5, 0.6, 0.5, 0.9));
        smoother.reset();
        assert!(smoother.is_empty());
    }
}
