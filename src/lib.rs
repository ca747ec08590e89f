//! Building blocks of the stool viewer: a Phong-lit stool and a small lamp
//! marker drawn from one shared mesh, viewed through a pointer-driven orbit
//! camera.
//!
//! Everything except [`render::Renderer`] is plain data and math, so the
//! camera, the per-frame matrices and the shader compiler can be exercised
//! without a GPU or a window.

pub mod camera;
pub mod frame;
pub mod geometry;
pub mod render;
pub mod scene;
pub mod shader;
pub mod texture;

pub use camera::{CameraConfig, OrbitCamera};
pub use frame::{FrameParams, RenderState, Viewport};
pub use render::{FrameError, Programs, Renderer};
pub use scene::{ConfigError, Placement, SceneConfig};
pub use shader::{
    compile_program, CompiledProgram, ProgramSource, ShaderError, UniformError, UniformLocation,
};
pub use texture::{load_rgb_image, AssetError};
