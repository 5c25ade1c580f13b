//! Replays recorded frames on the GPU.
//!
//! [`ShapePass`] turns the device-agnostic [`RecordedFrame`] produced by
//! [`Surface::render_frame`](crate::Surface::render_frame) into a single wgpu
//! render pass.
//!
//! # Architecture
//!
//! Every uniform the program declares gets its own buffer in bind group 0,
//! bound with a dynamic offset. While replaying, the pass tracks the latest
//! value written to each uniform and copies those values into a fresh slot
//! for every draw, so each draw sees exactly the uniforms that were current
//! when it was recorded.
//!
//! Pipelines are created lazily per polygon mode and device state and cached
//! until the program changes.
//!
//! # Depth Buffer
//!
//! The pass owns a `Depth32Float` depth buffer, cleared every frame and
//! recreated by [`ensure_depth_size`](ShapePass::ensure_depth_size) when the
//! surface size changes.

use std::collections::HashMap;
use std::num::NonZeroU64;

use crate::color::Color;
use crate::frame::{DeviceState, DrawCommand, PolygonMode, RecordedFrame, UniformValue};
use crate::gpu::GpuContext;
use crate::mesh::Vertex;
use crate::shader::{ShaderCompileError, ShaderProgram, UniformLocation};

type PipelineKey = (PolygonMode, DeviceState);

/// One uniform's buffer slot layout.
struct UniformSlot {
    location: UniformLocation,
    /// Bytes bound per draw.
    size: u64,
    /// Bytes between consecutive draws, a multiple of the device's offset alignment.
    stride: u64,
}

/// Per-uniform buffers with room for `capacity` draws, and their bind group.
struct UniformStorage {
    buffers: Vec<wgpu::Buffer>,
    bind_group: wgpu::BindGroup,
    capacity: u64,
}

/// Device objects derived from one [`ShaderProgram`].
struct ProgramPipelines {
    vertex_module: wgpu::ShaderModule,
    fragment_module: wgpu::ShaderModule,
    vertex_entry: String,
    fragment_entry: String,
    attributes: Vec<wgpu::VertexAttribute>,
    slots: Vec<UniformSlot>,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    storage: Option<UniformStorage>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl ProgramPipelines {
    fn new(gpu: &GpuContext, program: &ShaderProgram) -> Self {
        let device = &gpu.device;

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shape Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(program.vertex_source().into()),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shape Fragment Shader"),
            source: wgpu::ShaderSource::Wgsl(program.fragment_source().into()),
        });

        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let mut slots: Vec<UniformSlot> = program
            .uniforms()
            .present()
            .map(|(uniform, location)| {
                let size = uniform.ty().size().max(16);
                UniformSlot {
                    location,
                    size,
                    stride: size.div_ceil(alignment) * alignment,
                }
            })
            .collect();
        // Dynamic offsets are passed in binding order.
        slots.sort_by_key(|slot| slot.location);

        let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = slots
            .iter()
            .map(|slot| wgpu::BindGroupLayoutEntry {
                binding: slot.location.binding,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(slot.size),
                },
                count: None,
            })
            .collect();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shape Uniforms Bind Group Layout"),
            entries: &layout_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shape Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            vertex_module,
            fragment_module,
            vertex_entry: program.vertex_entry_point().to_owned(),
            fragment_entry: program.fragment_entry_point().to_owned(),
            attributes: program.attributes().vertex_attributes(),
            slots,
            bind_group_layout,
            pipeline_layout,
            storage: None,
            pipelines: HashMap::new(),
        }
    }

    fn slot_index(&self, location: UniformLocation) -> Option<usize> {
        self.slots.iter().position(|slot| slot.location == location)
    }

    fn ensure_pipeline(&mut self, gpu: &GpuContext, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        let (mode, state) = key;

        let (label, polygon_mode, bias) = match mode {
            PolygonMode::Fill => (
                "Shape Fill Pipeline",
                wgpu::PolygonMode::Fill,
                wgpu::DepthBiasState::default(),
            ),
            // Pull outlines slightly towards the eye so they win over their own faces.
            PolygonMode::Line => (
                "Shape Outline Pipeline",
                wgpu::PolygonMode::Line,
                wgpu::DepthBiasState {
                    constant: -1,
                    slope_scale: -1.0,
                    clamp: 0.0,
                },
            ),
        };

        let pipeline = gpu
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.vertex_module,
                    entry_point: Some(self.vertex_entry.as_str()),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: Vertex::STRIDE,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &self.attributes,
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &self.fragment_module,
                    entry_point: Some(self.fragment_entry.as_str()),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: gpu.config.format,
                        blend: Some(if state.alpha_blending {
                            wgpu::BlendState::ALPHA_BLENDING
                        } else {
                            wgpu::BlendState::REPLACE
                        }),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: state.cull_back_faces.then_some(wgpu::Face::Back),
                    polygon_mode,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: wgpu::TextureFormat::Depth32Float,
                    depth_write_enabled: state.depth_test,
                    depth_compare: if state.depth_test {
                        wgpu::CompareFunction::LessEqual
                    } else {
                        wgpu::CompareFunction::Always
                    },
                    stencil: wgpu::StencilState::default(),
                    bias,
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        self.pipelines.insert(key, pipeline);
    }

    /// Grows the uniform buffers to hold at least `draws` slots.
    fn ensure_capacity(&mut self, gpu: &GpuContext, draws: u64) {
        let needed = draws.max(1);
        if self
            .storage
            .as_ref()
            .is_some_and(|storage| storage.capacity >= needed)
        {
            return;
        }
        let capacity = needed.next_power_of_two();

        let buffers: Vec<wgpu::Buffer> = self
            .slots
            .iter()
            .map(|slot| {
                gpu.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Shape Uniforms"),
                    size: slot.stride * capacity,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        let entries: Vec<wgpu::BindGroupEntry> = self
            .slots
            .iter()
            .zip(&buffers)
            .map(|(slot, buffer)| wgpu::BindGroupEntry {
                binding: slot.location.binding,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: 0,
                    size: NonZeroU64::new(slot.size),
                }),
            })
            .collect();

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shape Uniforms Bind Group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        log::debug!("Shape uniform storage grown to {capacity} draws");
        self.storage = Some(UniformStorage {
            buffers,
            bind_group,
            capacity,
        });
    }

    /// Uploads one slot per draw for every uniform.
    fn write_uniforms(&self, gpu: &GpuContext, snapshots: &[Vec<Option<UniformValue>>]) {
        let Some(storage) = &self.storage else {
            return;
        };

        for (index, (slot, buffer)) in self.slots.iter().zip(&storage.buffers).enumerate() {
            let mut data = vec![0u8; (slot.stride * snapshots.len() as u64) as usize];
            for (draw, values) in snapshots.iter().enumerate() {
                let Some(value) = values[index] else {
                    continue;
                };
                let bytes = value.to_bytes();
                let start = draw * slot.stride as usize;
                let len = bytes.len().min(slot.size as usize);
                data[start..start + len].copy_from_slice(&bytes[..len]);
            }
            if !data.is_empty() {
                gpu.queue.write_buffer(buffer, 0, &data);
            }
        }
    }

    fn dynamic_offsets(&self, draw: usize) -> Vec<u32> {
        self.slots
            .iter()
            .map(|slot| (draw as u64 * slot.stride) as u32)
            .collect()
    }
}

/// A draw resolved from the command stream.
struct PlannedDraw<'a> {
    key: PipelineKey,
    vertices: &'a wgpu::Buffer,
    indices: &'a wgpu::Buffer,
    index_count: u32,
    viewport: Option<(u32, u32)>,
}

/// Executes recorded frames with wgpu.
pub struct ShapePass {
    program: Option<ProgramPipelines>,
    program_generation: u64,
    /// The depth texture used for depth testing.
    pub(crate) depth_texture: wgpu::Texture,
    /// View into the depth texture for render pass attachment.
    pub(crate) depth_view: wgpu::TextureView,
    depth_size: (u32, u32),
    warned_no_wireframe: bool,
}

impl ShapePass {
    pub fn new(gpu: &GpuContext) -> Self {
        let (depth_texture, depth_view) = Self::create_depth_texture(gpu);

        Self {
            program: None,
            program_generation: 0,
            depth_texture,
            depth_view,
            depth_size: (gpu.width(), gpu.height()),
            warned_no_wireframe: false,
        }
    }

    /// Builds device objects for `program` when `generation` differs from the
    /// last one seen.
    ///
    /// Device-side failures are caught and returned as
    /// [`ShaderCompileError::Device`]; the pipelines of the previous program
    /// stay in use.
    pub fn prepare(
        &mut self,
        gpu: &GpuContext,
        program: Option<&ShaderProgram>,
        generation: u64,
    ) -> Result<(), ShaderCompileError> {
        let Some(program) = program else {
            self.program = None;
            return Ok(());
        };
        if generation == self.program_generation {
            return Ok(());
        }
        self.program_generation = generation;

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut candidate = ProgramPipelines::new(gpu, program);
        candidate.ensure_pipeline(gpu, (PolygonMode::Fill, DeviceState::SCENE));

        let error = pollster::block_on(gpu.device.pop_error_scope());
        if let Some(err) = error {
            log::warn!("Device rejected shader program: {err}. Keeping old pipelines.");
            return Err(ShaderCompileError::Device(err.to_string()));
        }

        log::debug!(
            "Built pipelines for program generation {generation} ({} uniforms)",
            candidate.slots.len()
        );
        self.program = Some(candidate);
        Ok(())
    }

    fn create_depth_texture(gpu: &GpuContext) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Shape Depth Texture"),
            size: wgpu::Extent3d {
                width: gpu.width(),
                height: gpu.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }

    /// Recreates the depth buffer if the surface size changed.
    pub fn ensure_depth_size(&mut self, gpu: &GpuContext) {
        if self.depth_size != (gpu.width(), gpu.height()) {
            let (texture, view) = Self::create_depth_texture(gpu);
            self.depth_texture = texture;
            self.depth_view = view;
            self.depth_size = (gpu.width(), gpu.height());
        }
    }

    /// Replays `frame` into `target` and submits the work.
    ///
    /// Draws issued before `UseProgram` or without bound buffers are skipped.
    /// Outline draws are skipped when the device cannot rasterize lines.
    pub fn execute(
        &mut self,
        gpu: &GpuContext,
        frame: &RecordedFrame<'_, wgpu::Buffer>,
        target: &wgpu::TextureView,
    ) {
        self.ensure_depth_size(gpu);

        let mut clear = Color::BLACK;
        let mut draws = Vec::new();
        let mut snapshots = Vec::new();

        if let Some(program) = self.program.as_mut() {
            let mut current: Vec<Option<UniformValue>> = vec![None; program.slots.len()];
            let mut mode = PolygonMode::Fill;
            let mut state = DeviceState::SCENE;
            let mut viewport = None;
            let mut bound = None;
            let mut active = false;

            for command in frame.commands() {
                match command {
                    DrawCommand::Clear(color) => clear = *color,
                    DrawCommand::SetState(next) => state = *next,
                    DrawCommand::Viewport { width, height } => viewport = Some((*width, *height)),
                    DrawCommand::UseProgram => active = true,
                    DrawCommand::SetUniform { location, value } => {
                        if let Some(index) = program.slot_index(*location) {
                            current[index] = Some(*value);
                        }
                    }
                    DrawCommand::PolygonMode(next) => mode = *next,
                    DrawCommand::BindBuffers { vertices, indices } => {
                        bound = Some((*vertices, *indices));
                    }
                    DrawCommand::UnbindBuffers => bound = None,
                    DrawCommand::DrawIndexed { index_count } => {
                        let Some((vertices, indices)) = bound else {
                            continue;
                        };
                        if !active {
                            continue;
                        }
                        if mode == PolygonMode::Line && !gpu.supports_wireframe {
                            if !self.warned_no_wireframe {
                                log::warn!("Skipping outline draws: device cannot rasterize lines");
                                self.warned_no_wireframe = true;
                            }
                            continue;
                        }

                        snapshots.push(current.clone());
                        draws.push(PlannedDraw {
                            key: (mode, state),
                            vertices,
                            indices,
                            index_count: *index_count,
                            viewport,
                        });
                    }
                }
            }

            program.ensure_capacity(gpu, draws.len() as u64);
            for draw in &draws {
                program.ensure_pipeline(gpu, draw.key);
            }
            program.write_uniforms(gpu, &snapshots);
        } else if let Some(DrawCommand::Clear(color)) = frame.commands().first() {
            clear = *color;
        }

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Shape Pass Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Shape Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear.to_wgpu()),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some(program) = &self.program {
                let bind_group = program.storage.as_ref().map(|storage| &storage.bind_group);

                for (index, draw) in draws.iter().enumerate() {
                    let Some(pipeline) = program.pipelines.get(&draw.key) else {
                        continue;
                    };
                    render_pass.set_pipeline(pipeline);

                    if let Some((width, height)) = draw.viewport {
                        let width = width.min(gpu.width());
                        let height = height.min(gpu.height());
                        if width > 0 && height > 0 {
                            render_pass.set_viewport(
                                0.0,
                                0.0,
                                width as f32,
                                height as f32,
                                0.0,
                                1.0,
                            );
                        }
                    }

                    if let Some(bind_group) = bind_group {
                        render_pass.set_bind_group(0, bind_group, &program.dynamic_offsets(index));
                    }
                    render_pass.set_vertex_buffer(0, draw.vertices.slice(..));
                    render_pass.set_index_buffer(draw.indices.slice(..), wgpu::IndexFormat::Uint32);
                    render_pass.draw_indexed(0..draw.index_count, 0, 0..1);
                }
            }
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
    }
}
