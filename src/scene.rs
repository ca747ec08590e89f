use std::fs;
use std::path::{Path, PathBuf};

use glam::{Mat4, Vec3};
use serde::Deserialize;
use thiserror::Error;

use crate::camera::CameraConfig;

/// Failure to obtain a scene configuration from disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read scene config {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scene config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Position, scale and fixed Y rotation of a drawable.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Placement {
    pub position: Vec3,
    pub scale: Vec3,
    /// Rotation about +Y in degrees.
    pub rotation_y: f32,
}

impl Placement {
    /// Composes `translate * rotate_y * scale`, starting from identity.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position)
            * Mat4::from_rotation_y(self.rotation_y.to_radians())
            * Mat4::from_scale(self.scale)
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation_y: 0.0,
        }
    }
}

/// Constant inputs of the renderer. Every field falls back to its default
/// when missing from a config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub clear_color: Vec3,
    pub object_color: Vec3,
    pub light_color: Vec3,
    /// Share of the light colour applied everywhere, regardless of facing.
    pub ambient_strength: f32,
    pub specular_strength: f32,
    pub stool: Placement,
    pub lamp: Placement,
    pub camera: CameraConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            title: "Modern OpenGL".to_string(),
            width: 800,
            height: 600,
            clear_color: Vec3::ZERO,
            object_color: Vec3::new(0.6, 0.5, 0.75),
            light_color: Vec3::ONE,
            ambient_strength: 0.1,
            specular_strength: 0.8,
            stool: Placement {
                position: Vec3::ZERO,
                scale: Vec3::splat(2.0),
                rotation_y: 45.0,
            },
            lamp: Placement {
                position: Vec3::new(0.5, 0.5, -3.0),
                scale: Vec3::splat(0.3),
                rotation_y: 0.0,
            },
            camera: CameraConfig::default(),
        }
    }
}

impl SceneConfig {
    /// Parses a JSON document, keeping defaults for absent fields.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Light position as seen by the shaders; it is the lamp's placement.
    pub fn light_position(&self) -> Vec3 {
        self.lamp.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_stool_scene() {
        let scene = SceneConfig::default();
        assert_eq!(scene.width, 800);
        assert_eq!(scene.height, 600);
        assert_eq!(scene.object_color, Vec3::new(0.6, 0.5, 0.75));
        assert_eq!(scene.light_position(), Vec3::new(0.5, 0.5, -3.0));
        assert_eq!(scene.lamp.scale, Vec3::splat(0.3));
        assert_eq!(scene.camera.radius, 10.0);
        assert_eq!(scene.ambient_strength, 0.1);
        assert_eq!(scene.specular_strength, 0.8);
    }

    #[test]
    fn partial_json_only_overrides_named_fields() {
        let scene = SceneConfig::from_json(
            r#"{ "object_color": [1.0, 0.0, 0.0], "lamp": { "position": [0.0, 2.0, 0.0] } }"#,
        )
        .unwrap();
        assert_eq!(scene.object_color, Vec3::X);
        assert_eq!(scene.lamp.position, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(scene.lamp.scale, Vec3::ONE);
        assert_eq!(scene.stool, SceneConfig::default().stool);
        assert_eq!(scene.title, "Modern OpenGL");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "width": 1024, "camera": {{ "sensitivity": 0.25 }} }}"#).unwrap();
        let scene = SceneConfig::load(file.path()).unwrap();
        assert_eq!(scene.width, 1024);
        assert_eq!(scene.camera.sensitivity, 0.25);
        assert_eq!(scene.camera.radius, 10.0);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = SceneConfig::from_json("{ \"width\": ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = SceneConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn placement_composes_translate_rotate_scale() {
        let placement = Placement {
            position: Vec3::new(1.0, 0.0, 0.0),
            scale: Vec3::splat(2.0),
            rotation_y: 90.0,
        };
        let point = placement.model_matrix().transform_point3(Vec3::X);
        assert!(point.abs_diff_eq(Vec3::new(1.0, 0.0, -2.0), 1e-5));
    }
}
