use glam::{Vec2, Vec3};
use log::trace;
use serde::Deserialize;

/// Tuning for the pointer-driven orbit camera.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Multiplier applied to raw pointer deltas before they are accumulated.
    pub sensitivity: f32,
    /// Distance of the eye from the origin.
    pub radius: f32,
    /// Fixed camera position; the orbit eye looks at this point.
    pub position: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.5,
            radius: 10.0,
            position: Vec3::ZERO,
            up: Vec3::Y,
            fov: 45.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

/// Orbit camera fed by absolute pointer coordinates.
///
/// Yaw and pitch accumulate the scaled pixel deltas and are fed straight
/// into `cos`/`sin`, so one scaled pixel is one radian. The derived orbit
/// vector is used as the eye position of the view matrix.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    config: CameraConfig,
    yaw: f32,
    pitch: f32,
    last_pointer: Option<Vec2>,
    orbit: Vec3,
}

impl OrbitCamera {
    pub fn new(config: CameraConfig) -> Self {
        let mut camera = Self {
            config,
            yaw: 0.0,
            pitch: 0.0,
            last_pointer: None,
            orbit: Vec3::ZERO,
        };
        camera.orbit = camera.compute_orbit();
        camera
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Eye position derived from the current yaw and pitch.
    pub fn orbit(&self) -> Vec3 {
        self.orbit
    }

    /// Whether the next pointer event will only be latched as the reference.
    pub fn is_latched(&self) -> bool {
        self.last_pointer.is_none()
    }

    /// Forgets the reference point so the next event cannot cause a jump.
    pub fn reset_latch(&mut self) {
        self.last_pointer = None;
    }

    /// Feeds an absolute pointer position in window pixels.
    pub fn pointer_moved(&mut self, x: f32, y: f32) {
        let current = Vec2::new(x, y);
        let last = self.last_pointer.replace(current).unwrap_or(current);

        // Screen y grows downwards; moving the pointer up raises the pitch.
        let offset = Vec2::new(current.x - last.x, last.y - current.y) * self.config.sensitivity;
        self.yaw += offset.x;
        self.pitch += offset.y;
        self.orbit = self.compute_orbit();

        trace!(
            "pointer ({x}, {y}) yaw={} pitch={} orbit={:?}",
            self.yaw,
            self.pitch,
            self.orbit
        );
    }

    fn compute_orbit(&self) -> Vec3 {
        let radius = self.config.radius;
        Vec3::new(
            radius * self.yaw.cos(),
            radius * self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos() * radius,
        )
    }
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::new(CameraConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_event_only_latches() {
        let mut camera = OrbitCamera::default();
        assert!(camera.is_latched());
        camera.pointer_moved(123.0, 456.0);
        assert!(!camera.is_latched());
        assert_eq!(camera.yaw(), 0.0);
        assert_eq!(camera.pitch(), 0.0);
    }

    #[test]
    fn reset_latch_swallows_the_next_jump() {
        let mut camera = OrbitCamera::default();
        camera.pointer_moved(0.0, 0.0);
        camera.pointer_moved(4.0, 0.0);
        let yaw = camera.yaw();

        camera.reset_latch();
        camera.pointer_moved(700.0, 20.0);
        assert_eq!(camera.yaw(), yaw);
        assert_eq!(camera.pitch(), 0.0);
    }

    #[test]
    fn deltas_are_scaled_and_pitch_is_inverted() {
        let mut camera = OrbitCamera::default();
        camera.pointer_moved(400.0, 300.0);
        camera.pointer_moved(410.0, 296.0);
        assert_eq!(camera.yaw(), 5.0);
        assert_eq!(camera.pitch(), 2.0);
    }

    #[test]
    fn identical_deltas_accumulate_identically() {
        let run = |start: Vec2| {
            let mut camera = OrbitCamera::default();
            camera.pointer_moved(start.x, start.y);
            camera.pointer_moved(start.x + 7.0, start.y - 3.0);
            (camera.yaw().to_bits(), camera.pitch().to_bits())
        };
        assert_eq!(run(Vec2::new(0.0, 0.0)), run(Vec2::new(640.0, 480.0)));
        assert_eq!(run(Vec2::new(12.0, 99.0)), run(Vec2::new(-3.0, 1000.0)));
    }

    #[test]
    fn rest_orbit_sits_on_positive_x() {
        let camera = OrbitCamera::default();
        assert_eq!(camera.orbit(), Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn orbit_follows_yaw_and_pitch() {
        let mut camera = OrbitCamera::default();
        camera.pointer_moved(0.0, 0.0);
        camera.pointer_moved(2.0, -1.0);
        let (yaw, pitch) = (1.0f32, 0.5f32);
        let expected = Vec3::new(
            10.0 * yaw.cos(),
            10.0 * pitch.sin(),
            yaw.sin() * pitch.cos() * 10.0,
        );
        assert!(camera.orbit().abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn pitch_is_not_clamped() {
        let mut camera = OrbitCamera::default();
        camera.pointer_moved(0.0, 0.0);
        camera.pointer_moved(0.0, -20.0);
        assert_eq!(camera.pitch(), 10.0);
    }
}
