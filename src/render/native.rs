use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::bytes_of;
use glam::{Mat4, Vec3};
use image::RgbImage;
use log::{debug, info};
use thiserror::Error;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use super::Programs;
use crate::frame::FrameParams;
use crate::geometry::{Vertex, VertexConfig, STOOL_INDEX_COUNT, STOOL_INDICES, STOOL_VERTICES};
use crate::shader::{CompiledProgram, ShaderError, Stage, UniformError, UniformKind};
use crate::texture::{check_texture_size, rgb_to_rgba, AssetError};

/// Reasons a single frame could not be drawn.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Surface(#[from] wgpu::SurfaceError),
    #[error(transparent)]
    Uniform(#[from] UniformError),
}

/// Owns the surface, the device and every GPU object used to draw the stool
/// and its lamp. All of them are released when the renderer is dropped.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    depth: DepthBuffer,
    mesh: MeshBuffers,
    object: GpuProgram,
    lamp: GpuProgram,
    texture: Option<UploadedTexture>,
}

impl Renderer {
    /// Initializes the device for `window` and uploads both programs and the
    /// shared geometry.
    pub async fn new(window: Arc<Window>, programs: &Programs) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        let adapter_info = adapter.get_info();
        info!(
            "using adapter {} ({:?})",
            adapter_info.name, adapter_info.backend
        );

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("stool-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                .using_resolution(adapter.limits()),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no supported formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);
        let mesh = MeshBuffers::upload(&device, &STOOL_VERTICES, &STOOL_INDICES, "stool");
        let object =
            GpuProgram::new(&device, &programs.object, VertexConfig::Object, surface_format)
                .await
                .context("failed to create object program")?;
        let lamp = GpuProgram::new(&device, &programs.lamp, VertexConfig::Lamp, surface_format)
            .await
            .context("failed to create lamp program")?;

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            depth,
            mesh,
            object,
            lamp,
            texture: None,
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Resizes the swap chain to match the new dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    /// Uploads an RGB image as a 2D texture kept alive until shutdown.
    /// Images larger than the device allows are rejected before any GPU call.
    pub fn upload_texture(&mut self, image: &RgbImage) -> Result<(), AssetError> {
        check_texture_size(image, self.device.limits().max_texture_dimension_2d)?;
        let texture = UploadedTexture::upload(&self.device, &self.queue, image, "wood-texture");
        debug!("uploaded {}x{} texture", image.width(), image.height());
        self.texture = Some(texture);
        Ok(())
    }

    /// Draws the stool and then the lamp marker, and presents the frame.
    pub fn render(&mut self, frame: &FrameParams) -> Result<(), FrameError> {
        let object = &frame.object;
        self.object.set_mat4(&self.queue, "model", object.model)?;
        self.object.set_mat4(&self.queue, "view", object.view)?;
        self.object.set_mat4(&self.queue, "projection", object.projection)?;
        self.object
            .set_vec3(&self.queue, "object_color", object.object_color)?;
        self.object
            .set_vec3(&self.queue, "light_color", object.light_color)?;
        self.object
            .set_vec3(&self.queue, "light_pos", object.light_position)?;
        self.object
            .set_vec3(&self.queue, "view_position", object.view_position)?;
        self.object
            .set_f32(&self.queue, "ambient_strength", object.ambient_strength)?;
        self.object
            .set_f32(&self.queue, "specular_strength", object.specular_strength)?;

        let lamp = &frame.lamp;
        self.lamp.set_mat4(&self.queue, "model", lamp.model)?;
        self.lamp.set_mat4(&self.queue, "view", lamp.view)?;
        self.lamp.set_mat4(&self.queue, "projection", lamp.projection)?;

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        let clear = frame.clear_color;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("frame-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: clear.x as f64,
                        g: clear.y as f64,
                        b: clear.z as f64,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_vertex_buffer(0, self.mesh.vertex.slice(..));
        pass.set_index_buffer(self.mesh.index.slice(..), wgpu::IndexFormat::Uint32);
        for program in [&self.object, &self.lamp] {
            program.bind(&mut pass);
            pass.draw_indexed(0..STOOL_INDEX_COUNT, 0, 0..1);
        }

        drop(pass);
        self.queue.submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        output.present();
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        info!(
            "releasing GPU resources ({}, {}, shared mesh{})",
            self.object.label(),
            self.lamp.label(),
            if self.texture.is_some() { ", texture" } else { "" }
        );
    }
}

/// Linked render pipeline plus the uniform buffers its shaders declare.
struct GpuProgram {
    program: CompiledProgram,
    pipeline: wgpu::RenderPipeline,
    buffers: BTreeMap<(u32, u32), wgpu::Buffer>,
    bind_groups: Vec<(u32, wgpu::BindGroup)>,
}

impl GpuProgram {
    async fn new(
        device: &wgpu::Device,
        program: &CompiledProgram,
        vertex_config: VertexConfig,
        target_format: wgpu::TextureFormat,
    ) -> Result<Self, ShaderError> {
        let label = program.label();
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label}-vertex")),
            source: wgpu::ShaderSource::Wgsl(program.source(Stage::Vertex).into()),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label}-fragment")),
            source: wgpu::ShaderSource::Wgsl(program.source(Stage::Fragment).into()),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: None,
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some(crate::shader::VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers: &[vertex_config.layout()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some(crate::shader::FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        let mut buffers = BTreeMap::new();
        for block in program.uniform_blocks() {
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("{label}-{}", block.name)),
                size: u64::from(block.size),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            buffers.insert((block.group, block.binding), buffer);
        }

        let mut groups: BTreeMap<u32, Vec<wgpu::BindGroupEntry<'_>>> = BTreeMap::new();
        for (&(group, binding), buffer) in &buffers {
            groups.entry(group).or_default().push(wgpu::BindGroupEntry {
                binding,
                resource: buffer.as_entire_binding(),
            });
        }
        let bind_groups = groups
            .into_iter()
            .map(|(group, entries)| {
                let layout = pipeline.get_bind_group_layout(group);
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("{label}-group{group}")),
                    layout: &layout,
                    entries: &entries,
                });
                (group, bind_group)
            })
            .collect();

        if let Some(err) = device.pop_error_scope().await {
            return Err(ShaderError::Link {
                program: label.to_string(),
                log: err.to_string(),
            });
        }
        debug!("created GPU program {label}");

        Ok(Self {
            program: program.clone(),
            pipeline,
            buffers,
            bind_groups,
        })
    }

    fn label(&self) -> &str {
        self.program.label()
    }

    fn write(
        &self,
        queue: &wgpu::Queue,
        name: &str,
        kind: UniformKind,
        bytes: &[u8],
    ) -> Result<(), UniformError> {
        let location = self.program.typed_location(name, kind)?;
        let buffer = self
            .buffers
            .get(&(location.group, location.binding))
            .ok_or_else(|| UniformError::Missing {
                program: self.label().to_string(),
                name: name.to_string(),
            })?;
        queue.write_buffer(buffer, u64::from(location.offset), bytes);
        Ok(())
    }

    fn set_mat4(&self, queue: &wgpu::Queue, name: &str, value: Mat4) -> Result<(), UniformError> {
        self.write(queue, name, UniformKind::Mat4, bytes_of(&value.to_cols_array()))
    }

    fn set_vec3(&self, queue: &wgpu::Queue, name: &str, value: Vec3) -> Result<(), UniformError> {
        self.write(queue, name, UniformKind::Vec3, bytes_of(&value.to_array()))
    }

    fn set_f32(&self, queue: &wgpu::Queue, name: &str, value: f32) -> Result<(), UniformError> {
        self.write(queue, name, UniformKind::F32, bytes_of(&value))
    }

    fn bind(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_pipeline(&self.pipeline);
        for (group, bind_group) in &self.bind_groups {
            pass.set_bind_group(*group, bind_group, &[]);
        }
    }
}

/// GPU copy of the shared vertex and index arrays.
struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
}

impl MeshBuffers {
    fn upload(device: &wgpu::Device, vertices: &[Vertex], indices: &[u32], label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self { vertex, index }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

struct UploadedTexture {
    _texture: wgpu::Texture,
    _view: wgpu::TextureView,
}

impl UploadedTexture {
    fn upload(device: &wgpu::Device, queue: &wgpu::Queue, image: &RgbImage, label: &str) -> Self {
        let (width, height) = image.dimensions();
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgb_to_rgba(image),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            _view: view,
        }
    }
}
