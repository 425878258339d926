//! wgpu-backed graphics resources, enabled with the `render-wgpu` feature.
//!
//! Per-eye color/depth targets are multisampled at 4x; the render pass
//! resolves each eye into a single-sample texture, which is then copied into
//! its half of the double-width composite.

use super::{CompositeImage, EyeUniforms, GpuBackend, GraphicsError, RenderResult};
use crate::scene::{SceneConfig, SceneGeometry};
use crate::session::{CompositeHandle, Eye};
use pollster::block_on;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use wgpu::util::DeviceExt;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const SAMPLE_COUNT: u32 = 4;

static NEXT_COMPOSITE_ID: AtomicU64 = AtomicU64::new(1);

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
    uv: [f32; 2],
}

impl Vertex {
    // The shader has no reflection step; locations 0/1/2 are load-bearing.
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    mvp: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    light_position: [f32; 4],
    light_ambient: [f32; 4],
    light_diffuse: [f32; 4],
    light_specular: [f32; 4],
    eye_position: [f32; 4],
    params: [f32; 4],
}

impl Uniforms {
    fn from_eye(uniforms: &EyeUniforms) -> Self {
        let lighting = uniforms.lighting.unwrap_or_default();
        let lit = if uniforms.lighting.is_some() { 1.0 } else { 0.0 };
        let vec4 = |v: [f32; 3]| [v[0], v[1], v[2], 1.0];
        Self {
            mvp: uniforms.mvp.to_cols_array_2d(),
            model: uniforms.model.to_cols_array_2d(),
            light_position: vec4(lighting.position),
            light_ambient: vec4(lighting.ambient),
            light_diffuse: vec4(lighting.diffuse),
            light_specular: vec4(lighting.specular),
            eye_position: uniforms.eye_position.to_array(),
            params: [lighting.shininess, lit, 0.0, 0.0],
        }
    }
}

struct EyeTarget {
    _color: wgpu::Texture,
    color_view: wgpu::TextureView,
    _depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
    resolved: wgpu::Texture,
    resolved_view: wgpu::TextureView,
}

struct GpuResources {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    vertex_count: u32,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    eye_targets: [EyeTarget; 2],
    composite: wgpu::Texture,
    composite_id: u64,
    eye_size: (u32, u32),
}

/// Offscreen wgpu backend. The context (instance/adapter/device/queue)
/// outlives setup/teardown cycles; everything else lives in `GpuResources`
/// and is dropped as one unit.
pub struct WgpuBackend {
    _instance: wgpu::Instance,
    _adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    resources: Option<GpuResources>,
}

impl WgpuBackend {
    pub fn initialize() -> RenderResult<Self> {
        block_on(Self::initialize_async())
    }

    async fn initialize_async() -> RenderResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                GraphicsError::Context("no compatible GPU adapter found".to_owned())
            })?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Stereoscope Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                },
                None,
            )
            .await
            .map_err(|err| GraphicsError::Context(err.to_string()))?;

        log::info!(
            "[render] wgpu backend initialized (adapter: {:?})",
            adapter.get_info().name
        );

        Ok(Self {
            _instance: instance,
            _adapter: adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            resources: None,
        })
    }

    fn create_texture(
        &self,
        label: &str,
        size: (u32, u32),
        format: wgpu::TextureFormat,
        sample_count: u32,
        usage: wgpu::TextureUsages,
    ) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.0.max(1),
                height: size.1.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        })
    }

    fn create_eye_target(&self, eye: Eye, size: (u32, u32)) -> EyeTarget {
        let label = match eye {
            Eye::Left => "Left Eye",
            Eye::Right => "Right Eye",
        };
        let color = self.create_texture(
            label,
            size,
            COLOR_FORMAT,
            SAMPLE_COUNT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        let depth = self.create_texture(
            label,
            size,
            DEPTH_FORMAT,
            SAMPLE_COUNT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        let resolved = self.create_texture(
            label,
            size,
            COLOR_FORMAT,
            1,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );

        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        let resolved_view = resolved.create_view(&wgpu::TextureViewDescriptor::default());
        EyeTarget {
            _color: color,
            color_view,
            _depth: depth,
            depth_view,
            resolved,
            resolved_view,
        }
    }

    fn load_diffuse_texture(&self, scene: &SceneConfig) -> RenderResult<wgpu::Texture> {
        let (size, pixels) = match scene.textures.first() {
            Some(path) => {
                let decoded = image::open(path)
                    .map_err(|err| {
                        log::error!("[render] failed to load texture {path:?}: {err}");
                        GraphicsError::Backend("failed to load texture image")
                    })?
                    .to_rgba8();
                ((decoded.width(), decoded.height()), decoded.into_raw())
            }
            // No asset configured: a single white texel keeps the shader's
            // sampling path uniform.
            None => ((1, 1), vec![0xff; 4]),
        };

        let texture = self.create_texture(
            "Diffuse",
            size,
            COLOR_FORMAT,
            1,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size.0 * 4),
                rows_per_image: Some(size.1),
            },
            wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
        );
        Ok(texture)
    }
}

impl GpuBackend for WgpuBackend {
    fn label(&self) -> &'static str {
        "WGPU Backend"
    }

    fn setup(
        &mut self,
        scene: &SceneConfig,
        geometry: &SceneGeometry,
        eye_size: (u32, u32),
    ) -> RenderResult<()> {
        // Shader compilation and pipeline creation are validated through an
        // error scope so a broken module surfaces as a typed failure with
        // the compiler log instead of a device loss.
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Stereo Shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("shaders/stereo.wgsl").into()),
            });

        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Stereo Bind Group Layout"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                    ],
                });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Stereo Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Stereo Render Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_main",
                    buffers: &[Vertex::desc()],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: COLOR_FORMAT,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: SAMPLE_COUNT,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
            });

        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(GraphicsError::ShaderLink {
                log: err.to_string(),
            });
        }

        let vertices: Vec<Vertex> = geometry
            .positions
            .iter()
            .zip(&geometry.normals)
            .zip(&geometry.uvs)
            .map(|((&position, &normal), &uv)| Vertex {
                position,
                normal,
                uv,
            })
            .collect();

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Scene Vertex Buffer"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Stereo Uniform Buffer"),
            size: std::mem::size_of::<Uniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let diffuse = self.load_diffuse_texture(scene)?;
        let diffuse_view = diffuse.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Diffuse Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Stereo Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&diffuse_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let eye_targets = [
            self.create_eye_target(Eye::Left, eye_size),
            self.create_eye_target(Eye::Right, eye_size),
        ];
        let composite = self.create_texture(
            "Composite",
            (eye_size.0 * 2, eye_size.1),
            COLOR_FORMAT,
            1,
            wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
        );

        self.resources = Some(GpuResources {
            pipeline,
            vertex_buffer,
            vertex_count: vertices.len() as u32,
            uniform_buffer,
            bind_group,
            eye_targets,
            composite,
            composite_id: NEXT_COMPOSITE_ID.fetch_add(1, Ordering::Relaxed),
            eye_size,
        });
        Ok(())
    }

    fn draw_eye(&mut self, eye: Eye, uniforms: &EyeUniforms) -> RenderResult<()> {
        let resources = self.resources.as_ref().ok_or(GraphicsError::NotReady)?;
        let target = &resources.eye_targets[eye.index()];

        self.queue.write_buffer(
            &resources.uniform_buffer,
            0,
            bytemuck::cast_slice(&[Uniforms::from_eye(uniforms)]),
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Eye Encoder"),
            });
        {
            let [r, g, b, a] = uniforms.clear_color;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Eye Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    // Multisample resolve happens here, at the end of the
                    // pass.
                    resolve_target: Some(&target.resolved_view),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&resources.pipeline);
            pass.set_bind_group(0, &resources.bind_group, &[]);
            pass.set_vertex_buffer(0, resources.vertex_buffer.slice(..));
            pass.draw(0..resources.vertex_count, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn resolve_eye(&mut self, eye: Eye) -> RenderResult<()> {
        let resources = self.resources.as_ref().ok_or(GraphicsError::NotReady)?;
        let (eye_width, eye_height) = resources.eye_size;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Resolve Encoder"),
            });
        encoder.copy_texture_to_texture(
            wgpu::ImageCopyTexture {
                texture: &resources.eye_targets[eye.index()].resolved,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyTexture {
                texture: &resources.composite,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: eye.index() as u32 * eye_width,
                    y: 0,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: eye_width,
                height: eye_height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn composite_handle(&self) -> Option<CompositeHandle> {
        self.resources.as_ref().map(|resources| CompositeHandle {
            id: resources.composite_id,
            size: [resources.eye_size.0 * 2, resources.eye_size.1],
        })
    }

    fn snapshot(&mut self) -> RenderResult<CompositeImage> {
        let resources = self.resources.as_ref().ok_or(GraphicsError::NotReady)?;
        let (width, height) = (resources.eye_size.0 * 2, resources.eye_size.1);

        let unpadded_bytes_per_row = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Snapshot Buffer"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Snapshot Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &resources.composite,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| GraphicsError::Backend("snapshot map callback dropped"))?
            .map_err(|_| GraphicsError::Backend("failed to map snapshot buffer"))?;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity(unpadded_bytes_per_row as usize * height as usize);
        for row in mapped.chunks_exact(padded_bytes_per_row as usize) {
            pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
        }
        drop(mapped);
        readback.unmap();

        Ok(CompositeImage {
            width,
            height,
            pixels,
        })
    }

    fn teardown(&mut self) {
        // Scoped ownership: dropping the bundle releases shader, buffers,
        // textures, and targets in one sweep.
        self.resources = None;
    }
}
