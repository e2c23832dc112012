use crate::models::{DeviceProfile, Point2, TrackedTransform, Vec3};
use crate::services::scene::ArScene;

/// World units spanned by the normalised screen width
pub const WORLD_WIDTH: f32 = 4.0;
/// World units spanned by the normalised screen height
pub const WORLD_HEIGHT: f32 = 3.0;
/// Drop below the shoulder line where the model hangs
pub const VERTICAL_OFFSET: f32 = -0.5;

pub const MOBILE_LERP_FACTOR: f32 = 0.1;
pub const DESKTOP_LERP_FACTOR: f32 = 0.2;

/// Map a normalised screen point onto the fixed-depth placement plane
pub fn screen_to_world(point: Point2) -> Vec3 {
    Vec3::new(
        (point.x - 0.5) * WORLD_WIDTH,
        -(point.y - 0.5) * WORLD_HEIGHT,
        0.0,
    )
}

pub fn lerp_factor(profile: &DeviceProfile) -> f32 {
    if profile.is_mobile {
        MOBILE_LERP_FACTOR
    } else {
        DESKTOP_LERP_FACTOR
    }
}

/// Next transform one step from `current` towards the target.
///
/// Closes `factor` of the remaining distance; never lands on the target
/// in a single step for factors below 1.
pub fn step_towards(
    current: &TrackedTransform,
    point: Point2,
    angle: f32,
    factor: f32,
) -> TrackedTransform {
    let mut target = screen_to_world(point);
    target.y += VERTICAL_OFFSET;

    let target_rotation = Vec3::new(current.rotation.x, current.rotation.y, angle);

    TrackedTransform::new(
        current.position.lerp(&target, factor),
        current.rotation.lerp(&target_rotation, factor),
    )
}

/// Nudges the scene's tracked model towards the smoothed shoulder position
#[derive(Debug, Clone)]
pub struct ScenePlacement {
    factor: f32,
}

impl ScenePlacement {
    pub fn new(profile: &DeviceProfile) -> Self {
        Self {
            factor: lerp_factor(profile),
        }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Returns false without touching the scene when no model is loaded
    pub fn apply(&self, scene: &dyn ArScene, point: Point2, angle: f32) -> bool {
        if scene.current_model().is_none() {
            tracing::trace!("Placement skipped: no model loaded");
            return false;
        }

        let next = step_towards(&scene.transform(), point, angle, self.factor);
        scene.set_transform(next.position, next.rotation);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_centre_maps_to_origin() {
        let world = screen_to_world(Point2::new(0.5, 0.5));
        assert_eq!(world, Vec3::ZERO);
    }

    #[test]
    fn test_screen_corners() {
        let top_left = screen_to_world(Point2::new(0.0, 0.0));
        assert!((top_left.x + 2.0).abs() < 1e-6);
        assert!((top_left.y - 1.5).abs() < 1e-6);

        let bottom_right = screen_to_world(Point2::new(1.0, 1.0));
        assert!((bottom_right.x - 2.0).abs() < 1e-6);
        assert!((bottom_right.y + 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_step_moves_fraction_of_distance() {
        let current = TrackedTransform::default();
        let next = step_towards(&current, Point2::new(0.75, 0.5), 0.4, 0.2);

        // target x = 1.0, y = -0.5
        assert!((next.position.x - 0.2).abs() < 1e-6);
        assert!((next.position.y + 0.1).abs() < 1e-6);
        assert!((next.rotation.z - 0.08).abs() < 1e-6);
        assert_eq!(next.rotation.x, 0.0);
    }

    #[test]
    fn test_lerp_factor_by_device() {
        let mut profile = DeviceProfile::default();
        assert_eq!(lerp_factor(&profile), DESKTOP_LERP_FACTOR);
        profile.is_mobile = true;
        assert_eq!(lerp_factor(&profile), MOBILE_LERP_FACTOR);
    }

    #[test]
    fn test_repeated_steps_converge_without_snapping() {
        let mut current = TrackedTransform::default();
        let mut previous_distance = f32::MAX;
        let target = Vec3::new(1.0, -0.5, 0.0);

        for _ in 0..50 {
            current = step_towards(&current, Point2::new(0.75, 0.5), 0.0, 0.1);
            let distance = current.position.distance(&target);
            assert!(distance < previous_distance);
            assert!(distance > 0.0);
            previous_distance = distance;
        }
        assert!(previous_distance < 0.01);
    }
}
