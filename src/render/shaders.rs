use crate::shader::ProgramSource;

/// Phong-lit stool: position and normal in, lit colour out.
pub const OBJECT_PROGRAM: ProgramSource<'static> = ProgramSource {
    vertex: OBJECT_VERTEX,
    fragment: OBJECT_FRAGMENT,
};

/// Lamp marker: position in, opaque white out.
pub const LAMP_PROGRAM: ProgramSource<'static> = ProgramSource {
    vertex: LAMP_VERTEX,
    fragment: LAMP_FRAGMENT,
};

const OBJECT_VERTEX: &str = r#"
struct Transform {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
}

@group(0) @binding(0)
var<uniform> transform: Transform;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) fragment_pos: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = transform.model * vec4<f32>(input.position, 1.0);
    out.clip_position = transform.projection * transform.view * world_position;
    out.normal = (transform.model * vec4<f32>(input.normal, 0.0)).xyz;
    out.fragment_pos = world_position.xyz;
    return out;
}
"#;

const OBJECT_FRAGMENT: &str = r#"
struct Lighting {
    object_color: vec3<f32>,
    light_color: vec3<f32>,
    light_pos: vec3<f32>,
    view_position: vec3<f32>,
    ambient_strength: f32,
    specular_strength: f32,
}

@group(0) @binding(1)
var<uniform> lighting: Lighting;

const HIGHLIGHT_SIZE: f32 = 16.0;

@fragment
fn fs_main(
    @location(0) normal: vec3<f32>,
    @location(1) fragment_pos: vec3<f32>,
) -> @location(0) vec4<f32> {
    let ambient = lighting.ambient_strength * lighting.light_color;

    let norm = normalize(normal);
    let light_direction = normalize(lighting.light_pos - fragment_pos);
    let impact = max(dot(norm, light_direction), 0.0);
    let diffuse = impact * lighting.light_color;

    let view_direction = normalize(lighting.view_position - fragment_pos);
    let reflect_direction = reflect(-light_direction, norm);
    let specular_component = pow(max(dot(view_direction, reflect_direction), 0.0), HIGHLIGHT_SIZE);
    let specular = lighting.specular_strength * specular_component * lighting.light_color;

    let phong = (ambient + diffuse + specular) * lighting.object_color;
    return vec4<f32>(phong, 1.0);
}
"#;

const LAMP_VERTEX: &str = r#"
struct Transform {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
}

@group(0) @binding(0)
var<uniform> transform: Transform;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return transform.projection * transform.view * transform.model * vec4<f32>(position, 1.0);
}
"#;

const LAMP_FRAGMENT: &str = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{compile_program, UniformKind};

    #[test]
    fn object_program_declares_every_uniform_it_is_fed() {
        let program = compile_program("object", OBJECT_PROGRAM).unwrap();
        for name in ["model", "view", "projection"] {
            let location = program.uniform_location(name).unwrap();
            assert_eq!((location.group, location.binding), (0, 0));
            assert_eq!(location.kind, UniformKind::Mat4);
        }
        let offsets: Vec<u32> = ["object_color", "light_color", "light_pos", "view_position"]
            .iter()
            .map(|name| program.typed_location(name, UniformKind::Vec3).unwrap())
            .map(|location| {
                assert_eq!((location.group, location.binding), (0, 1));
                location.offset
            })
            .collect();
        assert_eq!(offsets, vec![0, 16, 32, 48]);

        let ambient = program.typed_location("ambient_strength", UniformKind::F32).unwrap();
        let specular = program.typed_location("specular_strength", UniformKind::F32).unwrap();
        assert_eq!((ambient.offset, specular.offset), (60, 64));

        let sizes: Vec<u32> = program.uniform_blocks().map(|block| block.size).collect();
        assert_eq!(sizes, vec![192, 80]);
    }

    #[test]
    fn lamp_program_only_takes_matrices() {
        let program = compile_program("lamp", LAMP_PROGRAM).unwrap();
        let mut names: Vec<&str> = program.uniform_names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["model", "projection", "view"]);
        let block = program.uniform_blocks().next().unwrap();
        assert_eq!(block.size, 192);
    }
}
