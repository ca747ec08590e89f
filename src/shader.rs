//! WGSL program compilation and uniform reflection.
//!
//! Each stage is parsed and validated on its own, then the pair is linked by
//! matching the vertex outputs against the fragment inputs. A successful link
//! yields a [`CompiledProgram`] with a name-to-location uniform table, in the
//! spirit of `glGetUniformLocation`.

use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Module, Scalar, ShaderStage, TypeInner, VectorSize};
use thiserror::Error;

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Pipeline stage of a shader source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    fn entry_point(self) -> &'static str {
        match self {
            Self::Vertex => VERTEX_ENTRY,
            Self::Fragment => FRAGMENT_ENTRY,
        }
    }

    fn naga_stage(self) -> ShaderStage {
        match self {
            Self::Vertex => ShaderStage::Vertex,
            Self::Fragment => ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        })
    }
}

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("{program}: {stage} shader failed to compile:\n{log}")]
    Compile {
        program: String,
        stage: Stage,
        log: String,
    },
    #[error("{program}: program failed to link:\n{log}")]
    Link { program: String, log: String },
}

#[derive(Debug, Error)]
pub enum UniformError {
    #[error("uniform `{name}` is not declared by {program}")]
    Missing { program: String, name: String },
    #[error("uniform `{name}` of {program} is {found:?}, not {expected:?}")]
    TypeMismatch {
        program: String,
        name: String,
        expected: UniformKind,
        found: UniformKind,
    },
}

/// Value shape of a reflected uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    F32,
    Vec3,
    Vec4,
    Mat4,
    Other,
}

impl UniformKind {
    fn of(inner: &TypeInner) -> Self {
        match *inner {
            TypeInner::Scalar(Scalar::F32) => Self::F32,
            TypeInner::Vector {
                size: VectorSize::Tri,
                scalar: Scalar::F32,
            } => Self::Vec3,
            TypeInner::Vector {
                size: VectorSize::Quad,
                scalar: Scalar::F32,
            } => Self::Vec4,
            TypeInner::Matrix {
                columns: VectorSize::Quad,
                rows: VectorSize::Quad,
                scalar: Scalar::F32,
            } => Self::Mat4,
            _ => Self::Other,
        }
    }
}

/// Where a named uniform lives: the buffer slot and the byte range inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    pub group: u32,
    pub binding: u32,
    pub offset: u32,
    pub size: u32,
    pub kind: UniformKind,
}

/// A `var<uniform>` declaration backing one or more named uniforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlock {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub size: u32,
}

/// Source text of both stages of a program.
#[derive(Debug, Clone, Copy)]
pub struct ProgramSource<'a> {
    pub vertex: &'a str,
    pub fragment: &'a str,
}

/// A validated and linked program, ready to be handed to the GPU.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    label: String,
    vertex_source: String,
    fragment_source: String,
    blocks: BTreeMap<(u32, u32), UniformBlock>,
    uniforms: BTreeMap<String, UniformLocation>,
}

impl CompiledProgram {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self, stage: Stage) -> &str {
        match stage {
            Stage::Vertex => &self.vertex_source,
            Stage::Fragment => &self.fragment_source,
        }
    }

    /// Uniform blocks ordered by `(group, binding)`.
    pub fn uniform_blocks(&self) -> impl Iterator<Item = &UniformBlock> {
        self.blocks.values()
    }

    pub fn uniform_names(&self) -> impl Iterator<Item = &str> {
        self.uniforms.keys().map(String::as_str)
    }

    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }

    /// Looks up `name` and checks that it holds a value of `expected` shape.
    pub fn typed_location(
        &self,
        name: &str,
        expected: UniformKind,
    ) -> Result<UniformLocation, UniformError> {
        let location = self
            .uniform_location(name)
            .ok_or_else(|| UniformError::Missing {
                program: self.label.clone(),
                name: name.to_string(),
            })?;
        if location.kind != expected {
            return Err(UniformError::TypeMismatch {
                program: self.label.clone(),
                name: name.to_string(),
                expected,
                found: location.kind,
            });
        }
        Ok(location)
    }
}

/// Compiles both stages of `source` and links them into a program.
pub fn compile_program(
    label: &str,
    source: ProgramSource<'_>,
) -> Result<CompiledProgram, ShaderError> {
    let vertex = compile_stage(label, Stage::Vertex, source.vertex)?;
    let fragment = compile_stage(label, Stage::Fragment, source.fragment)?;

    let mut linker = Linker::new(label);
    linker.match_interface(&vertex, &fragment);
    let mut blocks = BTreeMap::new();
    let mut uniforms = BTreeMap::new();
    for module in [&vertex, &fragment] {
        linker.reflect_uniforms(module, &mut blocks, &mut uniforms);
    }
    linker.finish()?;

    debug!(
        "linked program {label}: {} uniform block(s), {} uniform(s)",
        blocks.len(),
        uniforms.len()
    );
    Ok(CompiledProgram {
        label: label.to_string(),
        vertex_source: source.vertex.to_string(),
        fragment_source: source.fragment.to_string(),
        blocks,
        uniforms,
    })
}

fn compile_stage(label: &str, stage: Stage, source: &str) -> Result<Module, ShaderError> {
    let compile_error = |log: String| ShaderError::Compile {
        program: label.to_string(),
        stage,
        log,
    };

    let module = naga::front::wgsl::parse_str(source)
        .map_err(|err| compile_error(err.emit_to_string(source)))?;
    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|err| compile_error(err.emit_to_string(source)))?;

    let has_entry = module
        .entry_points
        .iter()
        .any(|ep| ep.stage == stage.naga_stage() && ep.name == stage.entry_point());
    if !has_entry {
        return Err(compile_error(format!(
            "missing @{stage} entry point `{}`",
            stage.entry_point()
        )));
    }
    Ok(module)
}

/// One user-defined value crossing the vertex/fragment boundary.
struct Varying {
    location: u32,
    name: String,
    ty: TypeInner,
}

struct Linker {
    label: String,
    errors: Vec<String>,
}

impl Linker {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            errors: Vec::new(),
        }
    }

    fn match_interface(&mut self, vertex: &Module, fragment: &Module) {
        let outputs = stage_outputs(vertex);
        for input in stage_inputs(fragment) {
            match outputs.iter().find(|out| out.location == input.location) {
                None => self.errors.push(format!(
                    "fragment input `{}` at location {} is not written by the vertex stage",
                    input.name, input.location
                )),
                Some(output) if output.ty != input.ty => self.errors.push(format!(
                    "location {}: vertex output `{}` is {:?} but fragment input `{}` is {:?}",
                    input.location, output.name, output.ty, input.name, input.ty
                )),
                Some(_) => {}
            }
        }
    }

    fn reflect_uniforms(
        &mut self,
        module: &Module,
        blocks: &mut BTreeMap<(u32, u32), UniformBlock>,
        uniforms: &mut BTreeMap<String, UniformLocation>,
    ) {
        let ctx = module.to_ctx();
        for (_, var) in module.global_variables.iter() {
            if var.space != AddressSpace::Uniform {
                continue;
            }
            let Some(slot) = var.binding.as_ref() else {
                continue;
            };
            let name = var.name.clone().unwrap_or_default();
            let inner = &module.types[var.ty].inner;
            let size = inner.size(ctx);

            let key = (slot.group, slot.binding);
            if let Some(existing) = blocks.get(&key) {
                if existing.size != size {
                    self.errors.push(format!(
                        "@group({}) @binding({}) is `{}` ({} bytes) in one stage and `{}` ({} bytes) in the other",
                        slot.group, slot.binding, existing.name, existing.size, name, size
                    ));
                }
                continue;
            }
            blocks.insert(
                key,
                UniformBlock {
                    name: name.clone(),
                    group: slot.group,
                    binding: slot.binding,
                    size,
                },
            );

            match inner {
                TypeInner::Struct { members, .. } => {
                    for member in members {
                        let Some(member_name) = member.name.clone() else {
                            continue;
                        };
                        let member_inner = &module.types[member.ty].inner;
                        let location = UniformLocation {
                            group: slot.group,
                            binding: slot.binding,
                            offset: member.offset,
                            size: member_inner.size(ctx),
                            kind: UniformKind::of(member_inner),
                        };
                        self.declare_uniform(uniforms, member_name, location);
                    }
                }
                other => {
                    let location = UniformLocation {
                        group: slot.group,
                        binding: slot.binding,
                        offset: 0,
                        size,
                        kind: UniformKind::of(other),
                    };
                    self.declare_uniform(uniforms, name, location);
                }
            }
        }
    }

    /// Uniform names must resolve to a single slot across both stages.
    fn declare_uniform(
        &mut self,
        uniforms: &mut BTreeMap<String, UniformLocation>,
        name: String,
        location: UniformLocation,
    ) {
        match uniforms.get(&name) {
            Some(existing) => self.errors.push(format!(
                "uniform `{name}` declared in two blocks: @group({}) @binding({}) and @group({}) @binding({})",
                existing.group, existing.binding, location.group, location.binding
            )),
            None => {
                uniforms.insert(name, location);
            }
        }
    }

    fn finish(self) -> Result<(), ShaderError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ShaderError::Link {
                program: self.label,
                log: self.errors.join("\n"),
            })
        }
    }
}

fn entry_point(module: &Module, stage: Stage) -> Option<&naga::EntryPoint> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage.naga_stage() && ep.name == stage.entry_point())
}

fn stage_outputs(module: &Module) -> Vec<Varying> {
    let mut varyings = Vec::new();
    let result = entry_point(module, Stage::Vertex).and_then(|ep| ep.function.result.as_ref());
    if let Some(result) = result {
        collect_varyings(module, "return", result.ty, result.binding.as_ref(), &mut varyings);
    }
    varyings
}

fn stage_inputs(module: &Module) -> Vec<Varying> {
    let mut varyings = Vec::new();
    if let Some(ep) = entry_point(module, Stage::Fragment) {
        for arg in &ep.function.arguments {
            let name = arg.name.as_deref().unwrap_or("argument");
            collect_varyings(module, name, arg.ty, arg.binding.as_ref(), &mut varyings);
        }
    }
    varyings
}

fn collect_varyings(
    module: &Module,
    name: &str,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
    out: &mut Vec<Varying>,
) {
    let inner = &module.types[ty].inner;
    match binding {
        Some(Binding::Location { location, .. }) => out.push(Varying {
            location: *location,
            name: name.to_string(),
            ty: inner.clone(),
        }),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = inner {
                for member in members {
                    let member_name = member.name.as_deref().unwrap_or(name);
                    collect_varyings(module, member_name, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}
