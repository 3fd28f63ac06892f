use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use tracing::warn;

use ketch_common::{EngineConfig, Light};
use ketch_render::{DrawCall, ProgramId, RenderBackend, RenderError};
use ketch_scene::{ProgramHandle, Topology, VertexLayout};

use crate::shaders;

/// Per-draw uniform block. One aligned slot per draw in a shared buffer,
/// selected with a dynamic offset.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    light_vector: [f32; 4],
    light_color: [f32; 4],
}

/// Minimum dynamic-offset alignment wgpu guarantees across adapters.
const UNIFORM_STRIDE: u64 = 256;

struct ProgramSpec {
    wgsl: String,
    layout: VertexLayout,
    topology: Topology,
}

/// wgpu implementation of the render backend.
///
/// Vertex and index storage are two large GPU buffers sized from the engine
/// config, mirroring the staging arrays one-to-one, so a dirty span uploads
/// at the same offset it occupies on the CPU side. Draw calls slice into
/// them by offset.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    /// CPU mirror of the index buffer; index uploads are widened to the
    /// 4-byte copy alignment wgpu requires, which can cover indices the
    /// caller did not pass.
    index_mirror: Vec<u16>,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    pipeline_layout: wgpu::PipelineLayout,
    specs: HashMap<ProgramHandle, ProgramSpec>,
    pipelines: Vec<wgpu::RenderPipeline>,
    /// Slot each handle's pipeline lives in; relinks replace in place.
    linked: HashMap<ProgramHandle, ProgramId>,
    max_draws: usize,
    depth_texture: wgpu::TextureView,
    target: Option<wgpu::TextureView>,
    frame_view_proj: Mat4,
    frame_light: Light,
    draws: Vec<DrawCall>,
}

impl WgpuBackend {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        config: &EngineConfig,
        width: u32,
        height: u32,
    ) -> Self {
        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene_vertex_buffer"),
            size: (config.vbo_capacity * std::mem::size_of::<f32>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let index_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene_index_buffer"),
            size: index_bytes(config.ibo_capacity),
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let max_draws = config.max_objects;
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("draw_uniform_buffer"),
            size: max_draws as u64 * UNIFORM_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw_uniform_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<Uniforms>() as u64
                    ),
                },
                count: None,
            }],
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("draw_uniform_bind_group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<Uniforms>() as u64),
                }),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let depth_texture = create_depth_texture(&device, width, height);

        Self {
            device,
            queue,
            surface_format,
            vertex_buffer,
            index_buffer,
            // Even length keeps widened uploads inside the mirror.
            index_mirror: vec![0; config.ibo_capacity.next_multiple_of(2)],
            uniform_buffer,
            uniform_bind_group,
            pipeline_layout,
            specs: HashMap::new(),
            pipelines: Vec::new(),
            linked: HashMap::new(),
            max_draws,
            depth_texture,
            target: None,
            frame_view_proj: Mat4::IDENTITY,
            frame_light: Light::default(),
            draws: Vec::new(),
        }
    }

    /// Register WGSL source for a program handle; linking happens on first
    /// draw that references it.
    pub fn register_program(
        &mut self,
        handle: ProgramHandle,
        wgsl: impl Into<String>,
        layout: VertexLayout,
        topology: Topology,
    ) {
        self.specs.insert(
            handle,
            ProgramSpec {
                wgsl: wgsl.into(),
                layout,
                topology,
            },
        );
    }

    /// Register the built-in lit and unlit programs under the given handles.
    pub fn register_default_programs(&mut self, lit: ProgramHandle, unlit: ProgramHandle) {
        self.register_program(lit, shaders::LIT_SHADER, VertexLayout::lit(), Topology::Triangles);
        self.register_program(
            unlit,
            shaders::UNLIT_SHADER,
            VertexLayout::new(vec![ketch_scene::AttributeKind::Position]),
            Topology::Lines,
        );
    }

    /// Set the texture the next `end_frame` renders into. Consumed per frame.
    pub fn set_target(&mut self, target: wgpu::TextureView) {
        self.target = Some(target);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.depth_texture = create_depth_texture(&self.device, width, height);
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    fn build_pipeline(&self, spec: &ProgramSpec) -> wgpu::RenderPipeline {
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("scene_shader"),
                source: wgpu::ShaderSource::Wgsl(spec.wgsl.as_str().into()),
            });

        let attributes = vertex_attributes(&spec.layout);
        let buffer_layout = wgpu::VertexBufferLayout {
            array_stride: (spec.layout.stride() * std::mem::size_of::<f32>()) as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        };

        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("scene_pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[buffer_layout],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.surface_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: primitive_topology(spec.topology),
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: wgpu::TextureFormat::Depth32Float,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: Default::default(),
                multiview: None,
                cache: None,
            })
    }
}

impl RenderBackend for WgpuBackend {
    fn link_program(&mut self, handle: ProgramHandle) -> Result<ProgramId, RenderError> {
        let Some(spec) = self.specs.get(&handle) else {
            return Err(RenderError::ProgramLink {
                handle,
                reason: "no shader registered for handle".into(),
            });
        };
        let pipeline = self.build_pipeline(spec);
        let (id, is_new) = pipeline_slot(&mut self.linked, self.pipelines.len(), handle);
        if is_new {
            self.pipelines.push(pipeline);
        } else {
            // Relink after a cache invalidation: drop the stale pipeline.
            self.pipelines[id.0 as usize] = pipeline;
        }
        Ok(id)
    }

    fn upload_vertices(&mut self, first: usize, data: &[f32]) {
        self.queue.write_buffer(
            &self.vertex_buffer,
            (first * std::mem::size_of::<f32>()) as u64,
            bytemuck::cast_slice(data),
        );
    }

    fn upload_indices(&mut self, first: usize, data: &[u16]) {
        let end = first + data.len();
        if end > self.index_mirror.len() {
            warn!(first, len = data.len(), "index upload past capacity, dropped");
            return;
        }
        self.index_mirror[first..end].copy_from_slice(data);

        // Widen to the 4-byte copy alignment, refilling from the mirror.
        let aligned_first = first & !1;
        let aligned_end = (end + 1) & !1;
        let aligned_end = aligned_end.min(self.index_mirror.len());
        self.queue.write_buffer(
            &self.index_buffer,
            (aligned_first * std::mem::size_of::<u16>()) as u64,
            bytemuck::cast_slice(&self.index_mirror[aligned_first..aligned_end]),
        );
    }

    fn begin_frame(&mut self, view_proj: Mat4, light: Light) {
        self.frame_view_proj = view_proj;
        self.frame_light = light;
        self.draws.clear();
    }

    fn draw(&mut self, call: &DrawCall) {
        if self.draws.len() >= self.max_draws {
            warn!(max = self.max_draws, "draw limit reached, call dropped");
            return;
        }
        self.draws.push(*call);
    }

    fn end_frame(&mut self) {
        let Some(target) = self.target.take() else {
            warn!("no render target set, frame dropped");
            return;
        };

        for (slot, call) in self.draws.iter().enumerate() {
            let uniforms = Uniforms {
                view_proj: self.frame_view_proj.to_cols_array_2d(),
                model: call.model.to_cols_array_2d(),
                light_vector: self.frame_light.vector.extend(0.0).to_array(),
                light_color: self.frame_light.color.extend(1.0).to_array(),
            };
            self.queue.write_buffer(
                &self.uniform_buffer,
                slot as u64 * UNIFORM_STRIDE,
                bytemuck::bytes_of(&uniforms),
            );
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.08,
                            g: 0.08,
                            b: 0.1,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for (slot, call) in self.draws.iter().enumerate() {
                let Some(pipeline) = self.pipelines.get(call.program.0 as usize) else {
                    warn!(program = call.program.0, "unknown pipeline, draw skipped");
                    continue;
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(
                    0,
                    &self.uniform_bind_group,
                    &[(slot as u64 * UNIFORM_STRIDE) as u32],
                );
                pass.set_vertex_buffer(
                    0,
                    self.vertex_buffer
                        .slice((call.vbo_offset * std::mem::size_of::<f32>()) as u64..),
                );
                pass.set_index_buffer(
                    self.index_buffer
                        .slice((call.ibo_offset * std::mem::size_of::<u16>()) as u64..),
                    wgpu::IndexFormat::Uint16,
                );
                pass.draw_indexed(0..call.index_count as u32, 0, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

/// Slot a handle's pipeline occupies. A handle keeps its slot for the
/// backend's lifetime; the second return says whether the slot is new.
fn pipeline_slot(
    linked: &mut HashMap<ProgramHandle, ProgramId>,
    slot_count: usize,
    handle: ProgramHandle,
) -> (ProgramId, bool) {
    match linked.get(&handle) {
        Some(&id) => (id, false),
        None => {
            let id = ProgramId(slot_count as u32);
            linked.insert(handle, id);
            (id, true)
        }
    }
}

/// Index buffer byte size, rounded up to wgpu's copy alignment.
fn index_bytes(capacity: usize) -> u64 {
    let bytes = capacity * std::mem::size_of::<u16>();
    bytes.next_multiple_of(4) as u64
}

fn primitive_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Topology::Lines => wgpu::PrimitiveTopology::LineList,
        Topology::Points => wgpu::PrimitiveTopology::PointList,
    }
}

/// Sequentially numbered shader locations matching an interleaved layout.
fn vertex_attributes(layout: &VertexLayout) -> Vec<wgpu::VertexAttribute> {
    let mut attributes = Vec::with_capacity(layout.attrs().len());
    let mut offset = 0u64;
    for (location, attr) in layout.attrs().iter().enumerate() {
        let format = match attr.size() {
            2 => wgpu::VertexFormat::Float32x2,
            _ => wgpu::VertexFormat::Float32x3,
        };
        attributes.push(wgpu::VertexAttribute {
            format,
            offset,
            shader_location: location as u32,
        });
        offset += (attr.size() * std::mem::size_of::<f32>()) as u64;
    }
    attributes
}

fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Depth32Float,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}
