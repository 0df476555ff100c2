#![forbid(unsafe_code)]

use std::borrow::Cow;
use std::num::NonZeroU64;

use frame_exchange::FrameView;
use thiserror::Error;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;

pub use geometry::{Mat4, RenderGeometry, ScaleMode};
pub use overlay::{rect_line_vertices, MAX_OVERLAY_RECTS};
pub use shader::yuv_shader_source;
pub use upload::{plane_specs, PlaneSpec};

#[cfg(test)]
mod colorspace;
pub mod geometry;
mod overlay;
mod shader;
mod upload;

use overlay::OverlayPipeline;
use shader::{params_bytes, PARAMS_SIZE};
use upload::PlaneTextures;

#[derive(Debug, Error)]
pub enum RenderInitError {
    #[error("surface creation failed: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("request device failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),
}

/// Failure of a single draw. The frame is skipped; the render loop goes on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GpuCallError {
    #[error("surface acquisition failed: {0}")]
    Surface(wgpu::SurfaceError),
    #[error("texture size overflow")]
    SizeOverflow,
    #[error("plane data size mismatch: expected {expected} bytes, got {actual}")]
    DataSizeMismatch { expected: usize, actual: usize },
    #[error("plane textures do not match a {width}x{height} frame")]
    TextureMismatch { width: u32, height: u32 },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DrawError {
    #[error("GPU out of memory")]
    OutOfMemory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RendererState {
    Uninitialized,
    /// Shader compiled and surface configured; nothing drawn yet.
    SurfaceReady,
    Rendering,
    Released,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrawOutcome {
    /// No frame has arrived yet; the surface was cleared.
    Cleared,
    Drawn,
    Skipped(GpuCallError),
    Released,
}

struct YuvPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    params_buffer: wgpu::Buffer,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

struct BoundPlanes {
    textures: PlaneTextures,
    bind_group: wgpu::BindGroup,
}

/// Draws packed YUV frames to a window surface. Must live on the thread that
/// owns the GPU device.
pub struct YuvRenderer<'window> {
    window: &'window winit::window::Window,
    surface: Option<wgpu::Surface<'window>>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    clear_color: wgpu::Color,
    scale_mode: ScaleMode,
    state: RendererState,
    pipeline: Option<YuvPipeline>,
    overlay: Option<OverlayPipeline>,
    planes: Option<BoundPlanes>,
}

impl<'window> YuvRenderer<'window> {
    pub fn new(
        window: &'window winit::window::Window,
        scale_mode: ScaleMode,
    ) -> Result<Self, RenderInitError> {
        pollster::block_on(Self::new_async(window, scale_mode))
    }

    pub fn window(&self) -> &winit::window::Window {
        self.window
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn set_clear_color_rgba(&mut self, r: f64, g: f64, b: f64, a: f64) {
        self.clear_color = wgpu::Color { r, g, b, a };
    }

    pub fn set_scale_mode(&mut self, scale_mode: ScaleMode) {
        self.scale_mode = scale_mode;
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.config);
        }
    }

    /// Replaces the outline boxes, given in view pixels as `[x, y, w, h]`.
    pub fn set_overlay_rects(&mut self, rects: &[[f32; 4]]) {
        if let Some(overlay) = &mut self.overlay {
            let vertices = rect_line_vertices(rects, [self.size.width, self.size.height]);
            overlay.update(&self.queue, &vertices);
        }
    }

    /// Uploads and draws `frame`, or only clears when no frame exists yet.
    /// Per-frame GPU failures come back as [`DrawOutcome::Skipped`].
    pub fn draw(&mut self, frame: Option<FrameView<'_>>) -> Result<DrawOutcome, DrawError> {
        if self.state == RendererState::Released {
            return Ok(DrawOutcome::Released);
        }
        let frame = frame.filter(|frame| !frame.buffer().is_empty());
        if let Some(frame) = frame {
            if let Err(error) = self.prepare(frame) {
                tracing::warn!(%error, "frame upload failed; skipping");
                return Ok(DrawOutcome::Skipped(error));
            }
        }
        match self.encode_and_present(frame.is_some()) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(DrawError::OutOfMemory),
            Err(error @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                tracing::warn!(%error, "surface lost; reconfiguring");
                self.resize(self.size);
                return Ok(DrawOutcome::Skipped(GpuCallError::Surface(error)));
            }
            Err(error) => {
                tracing::warn!(%error, "surface acquisition failed; skipping");
                return Ok(DrawOutcome::Skipped(GpuCallError::Surface(error)));
            }
        }
        if self.state == RendererState::SurfaceReady {
            tracing::debug!("renderer entered rendering state");
        }
        self.state = RendererState::Rendering;
        Ok(if frame.is_some() {
            DrawOutcome::Drawn
        } else {
            DrawOutcome::Cleared
        })
    }

    /// Drops every GPU object tied to the surface. Later draws are no-ops.
    pub fn release(&mut self) {
        if self.state == RendererState::Released {
            return;
        }
        self.planes = None;
        self.overlay = None;
        self.pipeline = None;
        self.surface = None;
        self.state = RendererState::Released;
        tracing::info!("renderer released");
    }

    async fn new_async(
        window: &'window winit::window::Window,
        scale_mode: ScaleMode,
    ) -> Result<Self, RenderInitError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderInitError::NoAdapter)?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("preview.device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await?;
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .first()
            .copied()
            .unwrap_or(wgpu::TextureFormat::Bgra8UnormSrgb);
        let present_mode = caps
            .present_modes
            .first()
            .copied()
            .unwrap_or(wgpu::PresentMode::Fifo);
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        tracing::info!(
            adapter = %adapter.get_info().name,
            ?format,
            width = config.width,
            height = config.height,
            "surface configured"
        );

        let mut renderer = Self {
            window,
            surface: Some(surface),
            device,
            queue,
            config,
            size,
            clear_color: wgpu::Color {
                r: 0.0,
                g: 0.0,
                b: 0.0,
                a: 1.0,
            },
            scale_mode,
            state: RendererState::Uninitialized,
            pipeline: None,
            overlay: None,
            planes: None,
        };
        renderer.compile_pipeline().await?;
        Ok(renderer)
    }

    async fn compile_pipeline(&mut self) -> Result<(), RenderInitError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = YuvPipeline::new(&self.device, &self.config);
        let overlay = OverlayPipeline::new(&self.device, self.config.format);
        if let Some(error) = self.device.pop_error_scope().await {
            return Err(RenderInitError::ShaderCompile(error.to_string()));
        }
        self.pipeline = Some(pipeline);
        self.overlay = Some(overlay);
        self.state = RendererState::SurfaceReady;
        Ok(())
    }

    fn prepare(&mut self, frame: FrameView<'_>) -> Result<(), GpuCallError> {
        let Some(pipeline) = &self.pipeline else {
            return Ok(());
        };
        let buffer = frame.buffer();
        let needs_new = match &self.planes {
            Some(planes) => !planes
                .textures
                .matches(buffer.format(), buffer.width(), buffer.height()),
            None => true,
        };
        if needs_new {
            let textures =
                PlaneTextures::new(&self.device, buffer.format(), buffer.width(), buffer.height());
            let bind_group = pipeline.bind_group(&self.device, &textures);
            self.planes = Some(BoundPlanes {
                textures,
                bind_group,
            });
        }
        if let Some(planes) = &self.planes {
            planes.textures.upload(&self.queue, buffer)?;
        }

        let meta = frame.meta();
        let geometry = RenderGeometry {
            view: [self.size.width, self.size.height],
            frame: [meta.width, meta.height],
            rotation: meta.rotation,
            mirrored: meta.mirrored,
            scale_mode: self.scale_mode,
        };
        self.queue.write_buffer(
            &pipeline.params_buffer,
            0,
            &params_bytes(geometry.matrix(), meta.format.shader_tag()),
        );
        Ok(())
    }

    fn encode_and_present(&self, draw_frame: bool) -> Result<(), wgpu::SurfaceError> {
        let Some(surface) = &self.surface else {
            return Ok(());
        };
        let frame = surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("preview.render.encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("preview.render.pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if draw_frame {
                if let (Some(pipeline), Some(planes)) = (&self.pipeline, &self.planes) {
                    pipeline.draw(&mut pass, &planes.bind_group);
                }
                if let Some(overlay) = &self.overlay {
                    overlay.draw(&mut pass);
                }
            }
        }
        self.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }
}

impl YuvPipeline {
    fn new(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> Self {
        let source = yuv_shader_source(config.format.is_srgb());
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("preview.yuv.shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("preview.yuv.sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let plane_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("preview.yuv.bind_group_layout"),
            entries: &[
                plane_entry(0),
                plane_entry(1),
                plane_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(PARAMS_SIZE),
                    },
                    count: None,
                },
            ],
        });

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("preview.yuv.params_buffer"),
            contents: &params_bytes(geometry::identity(), 0),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("preview.yuv.vertex_buffer"),
            contents: &quad_vertex_bytes(),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("preview.yuv.index_buffer"),
            contents: &quad_index_bytes(),
            usage: wgpu::BufferUsages::INDEX,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("preview.yuv.pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("preview.yuv.pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: 16,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[
                        wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 0,
                            format: wgpu::VertexFormat::Float32x2,
                        },
                        wgpu::VertexAttribute {
                            offset: 8,
                            shader_location: 1,
                            format: wgpu::VertexFormat::Float32x2,
                        },
                    ],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        Self {
            pipeline,
            bind_group_layout,
            sampler,
            params_buffer,
            vertex_buffer,
            index_buffer,
            index_count: 6,
        }
    }

    fn bind_group(&self, device: &wgpu::Device, textures: &PlaneTextures) -> wgpu::BindGroup {
        let [view_y, view_u, view_v] = textures.binding_views();
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("preview.yuv.bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view_y),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view_u),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(view_v),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.params_buffer.as_entire_binding(),
                },
            ],
        })
    }

    fn draw<'pass>(&'pass self, pass: &mut wgpu::RenderPass<'pass>, bind_group: &'pass wgpu::BindGroup) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

/// Full-screen quad with GL-style texture coordinates (row 0 at the bottom);
/// the vertical flip in the geometry matrix puts row 0 back on top.
fn quad_vertex_bytes() -> Vec<u8> {
    let vertices = [
        [-1.0f32, 1.0f32, 0.0f32, 1.0f32],
        [1.0f32, 1.0f32, 1.0f32, 1.0f32],
        [1.0f32, -1.0f32, 1.0f32, 0.0f32],
        [-1.0f32, -1.0f32, 0.0f32, 0.0f32],
    ];
    let mut bytes = Vec::with_capacity(vertices.len() * 16);
    for vertex in vertices {
        for value in vertex {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    bytes
}

fn quad_index_bytes() -> Vec<u8> {
    let indices = [0u16, 1, 2, 0, 2, 3];
    let mut bytes = Vec::with_capacity(indices.len() * 2);
    for index in indices {
        bytes.extend_from_slice(&index.to_le_bytes());
    }
    bytes
}
