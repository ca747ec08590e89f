//! Per-frame matrix computation, kept apart from the GPU so it can be
//! checked without a device.

use glam::{Mat4, Vec3};

use crate::camera::OrbitCamera;
use crate::scene::SceneConfig;

/// Drawable surface size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Uniform values of the lit object pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectUniforms {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    pub object_color: Vec3,
    pub light_color: Vec3,
    pub light_position: Vec3,
    pub view_position: Vec3,
    pub ambient_strength: f32,
    pub specular_strength: f32,
}

/// Uniform values of the lamp marker pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LampUniforms {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

/// Everything the GPU half needs to draw one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameParams {
    pub clear_color: Vec3,
    pub object: ObjectUniforms,
    pub lamp: LampUniforms,
}

/// Mutable state shared by the camera controller and the frame renderer.
#[derive(Debug, Clone)]
pub struct RenderState {
    scene: SceneConfig,
    camera: OrbitCamera,
    viewport: Viewport,
}

impl RenderState {
    pub fn new(scene: SceneConfig) -> Self {
        let camera = OrbitCamera::new(scene.camera);
        let viewport = Viewport {
            width: scene.width.max(1),
            height: scene.height.max(1),
        };
        Self {
            scene,
            camera,
            viewport,
        }
    }

    pub fn scene(&self) -> &SceneConfig {
        &self.scene
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        &mut self.camera
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn pointer_moved(&mut self, x: f32, y: f32) {
        self.camera.pointer_moved(x, y);
    }

    /// Records the new surface size. Zero-area sizes (minimised windows) are
    /// ignored and the previous aspect ratio is kept.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.viewport = Viewport { width, height };
    }

    pub fn view_matrix(&self) -> Mat4 {
        let config = self.camera.config();
        Mat4::look_at_rh(self.camera.orbit(), config.position, config.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        let config = self.camera.config();
        Mat4::perspective_rh(
            config.fov.to_radians(),
            self.viewport.aspect(),
            config.near,
            config.far,
        )
    }

    pub fn frame(&self) -> FrameParams {
        let view = self.view_matrix();
        let projection = self.projection_matrix();
        FrameParams {
            clear_color: self.scene.clear_color,
            object: ObjectUniforms {
                model: self.scene.stool.model_matrix(),
                view,
                projection,
                object_color: self.scene.object_color,
                light_color: self.scene.light_color,
                light_position: self.scene.light_position(),
                view_position: self.camera.config().position,
                ambient_strength: self.scene.ambient_strength,
                specular_strength: self.scene.specular_strength,
            },
            lamp: LampUniforms {
                model: self.scene.lamp.model_matrix(),
                view,
                projection,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_1_SQRT_2;

    fn projection_aspect(projection: Mat4) -> f32 {
        projection.y_axis.y / projection.x_axis.x
    }

    #[test]
    fn object_model_rotates_then_scales() {
        let frame = RenderState::new(SceneConfig::default()).frame();
        let point = frame.object.model.transform_point3(Vec3::X);
        let expected = Vec3::new(2.0 * FRAC_1_SQRT_2, 0.0, -2.0 * FRAC_1_SQRT_2);
        assert!(point.abs_diff_eq(expected, 1e-5), "{point:?}");
    }

    #[test]
    fn lamp_model_is_independent_of_object_model() {
        let frame = RenderState::new(SceneConfig::default()).frame();
        let expected =
            Mat4::from_translation(Vec3::new(0.5, 0.5, -3.0)) * Mat4::from_scale(Vec3::splat(0.3));
        assert!(frame.lamp.model.abs_diff_eq(expected, 1e-6));
        let origin = frame.lamp.model.transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(0.5, 0.5, -3.0), 1e-6));
    }

    #[test]
    fn resize_changes_aspect_on_next_frame() {
        let mut state = RenderState::new(SceneConfig::default());
        assert!((projection_aspect(state.frame().object.projection) - 800.0 / 600.0).abs() < 1e-5);

        state.resize(1920, 1080);
        let frame = state.frame();
        assert!((projection_aspect(frame.object.projection) - 1920.0 / 1080.0).abs() < 1e-5);
        assert_eq!(frame.object.projection, frame.lamp.projection);
    }

    #[test]
    fn zero_sized_resize_is_ignored() {
        let mut state = RenderState::new(SceneConfig::default());
        state.resize(0, 720);
        assert_eq!(
            state.viewport(),
            Viewport {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn view_looks_from_orbit_towards_camera_position() {
        let state = RenderState::new(SceneConfig::default());
        let view = state.frame().object.view;
        // The eye lands at the view-space origin and the target straight ahead.
        let eye = view.transform_point3(Vec3::new(10.0, 0.0, 0.0));
        assert!(eye.abs_diff_eq(Vec3::ZERO, 1e-5));
        let target = view.transform_point3(Vec3::ZERO);
        assert!(target.abs_diff_eq(Vec3::new(0.0, 0.0, -10.0), 1e-5));
    }

    #[test]
    fn pointer_motion_moves_the_eye() {
        let mut state = RenderState::new(SceneConfig::default());
        let before = state.frame().object.view;
        state.pointer_moved(400.0, 300.0);
        assert_eq!(state.frame().object.view, before);
        state.pointer_moved(402.0, 300.0);
        assert_ne!(state.frame().object.view, before);
    }

    #[test]
    fn object_pass_carries_scene_constants() {
        let frame = RenderState::new(SceneConfig::default()).frame();
        assert_eq!(frame.object.object_color, Vec3::new(0.6, 0.5, 0.75));
        assert_eq!(frame.object.light_color, Vec3::ONE);
        assert_eq!(frame.object.light_position, Vec3::new(0.5, 0.5, -3.0));
        assert_eq!(frame.object.view_position, Vec3::ZERO);
        assert_eq!(frame.clear_color, Vec3::ZERO);
        assert_eq!(frame.object.ambient_strength, 0.1);
        assert_eq!(frame.object.specular_strength, 0.8);
    }

    #[test]
    fn lighting_strengths_follow_the_scene() {
        let scene = SceneConfig::from_json(r#"{ "ambient_strength": 0.3, "specular_strength": 0.0 }"#)
            .unwrap();
        let frame = RenderState::new(scene).frame();
        assert_eq!(frame.object.ambient_strength, 0.3);
        assert_eq!(frame.object.specular_strength, 0.0);
    }
}
