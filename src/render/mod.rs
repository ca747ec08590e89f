mod native;
pub mod shaders;

pub use native::{FrameError, Renderer};

use crate::shader::{compile_program, CompiledProgram, ShaderError};

/// The two linked programs drawn every frame.
#[derive(Debug, Clone)]
pub struct Programs {
    pub object: CompiledProgram,
    pub lamp: CompiledProgram,
}

impl Programs {
    /// Compiles the built-in object and lamp programs.
    pub fn compile() -> Result<Self, ShaderError> {
        Ok(Self {
            object: compile_program("object", shaders::OBJECT_PROGRAM)?,
            lamp: compile_program("lamp", shaders::LAMP_PROGRAM)?,
        })
    }
}
