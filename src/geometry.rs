use bytemuck::{Pod, Zeroable};

/// Interleaved vertex: `position.xyz` followed by `normal.xyz`.
///
/// The second attribute doubles as the per-vertex colour in the source data;
/// the object shader reads it as a normal.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    const fn new(position: [f32; 3], normal: [f32; 3]) -> Self {
        Self { position, normal }
    }
}

/// Byte stride shared by both vertex configurations.
pub const VERTEX_STRIDE: u64 = std::mem::size_of::<Vertex>() as u64;

pub const STOOL_VERTICES: [Vertex; 8] = [
    // position                // normal / colour
    Vertex::new([0.0, 0.5, -0.5], [1.0, 0.0, 0.0]), // top right
    Vertex::new([0.5, -0.5, 0.0], [0.0, 1.0, 0.0]), // bottom right
    Vertex::new([-0.5, -0.5, 0.0], [0.0, 0.0, 1.0]), // bottom left
    Vertex::new([0.0, 0.5, -0.5], [1.0, 0.0, 1.0]), // top left
    Vertex::new([0.5, -0.5, -1.0], [0.5, 0.5, 1.0]), // bottom right, back
    Vertex::new([0.5, 0.5, -1.0], [1.0, 1.0, 0.5]), // top left, right side
    Vertex::new([0.0, 0.5, -0.5], [0.2, 0.2, 0.5]), // top left, top
    Vertex::new([-0.5, -0.5, -1.0], [1.0, 0.0, 1.0]), // bottom left, back
];

pub const STOOL_INDICES: [u32; 18] = [
    1, 2, 3, // front
    0, 1, 4, // right
    4, 6, 7, // back
    2, 6, 7, // left
    1, 4, 7, // bottom back
    1, 2, 7, // bottom front
];

/// Number of indices issued by each draw call.
pub const STOOL_INDEX_COUNT: u32 = STOOL_INDICES.len() as u32;

/// Attribute layout used by the object pass: position at location 0 and the
/// normal channel at location 1.
pub const OBJECT_ATTRIBUTES: [wgpu::VertexAttribute; 2] = [
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: 0,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: std::mem::size_of::<[f32; 3]>() as u64,
        shader_location: 1,
    },
];

/// Attribute layout used by the lamp pass. Reads only the position from the
/// same buffer as the object pass.
pub const LAMP_ATTRIBUTES: [wgpu::VertexAttribute; 1] = [OBJECT_ATTRIBUTES[0]];

/// Selects one of the two views onto the shared vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexConfig {
    Object,
    Lamp,
}

impl VertexConfig {
    pub fn attributes(self) -> &'static [wgpu::VertexAttribute] {
        match self {
            Self::Object => &OBJECT_ATTRIBUTES,
            Self::Lamp => &LAMP_ATTRIBUTES,
        }
    }

    pub fn layout(self) -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: VERTEX_STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: self.attributes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_six_packed_floats() {
        assert_eq!(VERTEX_STRIDE, 24);
        let bytes: &[u8] = bytemuck::cast_slice(&STOOL_VERTICES);
        assert_eq!(bytes.len(), 8 * 24);
    }

    #[test]
    fn indices_stay_inside_vertex_array() {
        assert_eq!(STOOL_INDEX_COUNT, 18);
        assert_eq!(STOOL_INDICES.len() % 3, 0);
        assert!(STOOL_INDICES
            .iter()
            .all(|&index| (index as usize) < STOOL_VERTICES.len()));
    }

    #[test]
    fn lamp_config_shares_position_slot_with_object() {
        let object = VertexConfig::Object.layout();
        let lamp = VertexConfig::Lamp.layout();
        assert_eq!(object.array_stride, lamp.array_stride);
        assert_eq!(lamp.attributes.len(), 1);
        assert_eq!(lamp.attributes[0], object.attributes[0]);
        assert_eq!(object.attributes[1].offset, 12);
        assert_eq!(object.attributes[1].shader_location, 1);
    }
}
