use std::borrow::Cow;

use crate::shader::OVERLAY_SHADER;

pub const MAX_OVERLAY_RECTS: usize = 32;
const VERTICES_PER_RECT: usize = 8;
const VERTEX_STRIDE: u64 = 8;

/// Line-list vertices in clip space for `rects` given as `[x, y, w, h]` in
/// view pixels with the origin at the top left. Extra rects are ignored.
pub fn rect_line_vertices(rects: &[[f32; 4]], view: [u32; 2]) -> Vec<[f32; 2]> {
    let [vw, vh] = view;
    if vw == 0 || vh == 0 {
        return Vec::new();
    }
    let to_clip = |x: f32, y: f32| [x / vw as f32 * 2.0 - 1.0, 1.0 - y / vh as f32 * 2.0];
    let mut out = Vec::with_capacity(rects.len().min(MAX_OVERLAY_RECTS) * VERTICES_PER_RECT);
    for &[x, y, w, h] in rects.iter().take(MAX_OVERLAY_RECTS) {
        let tl = to_clip(x, y);
        let tr = to_clip(x + w, y);
        let br = to_clip(x + w, y + h);
        let bl = to_clip(x, y + h);
        out.extend_from_slice(&[tl, tr, tr, br, br, bl, bl, tl]);
    }
    out
}

pub(crate) struct OverlayPipeline {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    vertex_count: u32,
}

impl OverlayPipeline {
    pub(crate) fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("preview.overlay.shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(OVERLAY_SHADER)),
        });
        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("preview.overlay.vertex_buffer"),
            size: (MAX_OVERLAY_RECTS * VERTICES_PER_RECT) as u64 * VERTEX_STRIDE,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("preview.overlay.pipeline_layout"),
            bind_group_layouts: &[],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("preview.overlay.pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: VERTEX_STRIDE,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        offset: 0,
                        shader_location: 0,
                        format: wgpu::VertexFormat::Float32x2,
                    }],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });
        Self {
            pipeline,
            vertex_buffer,
            vertex_count: 0,
        }
    }

    pub(crate) fn update(&mut self, queue: &wgpu::Queue, vertices: &[[f32; 2]]) {
        self.vertex_count = vertices.len() as u32;
        if vertices.is_empty() {
            return;
        }
        let mut bytes = Vec::with_capacity(vertices.len() * VERTEX_STRIDE as usize);
        for [x, y] in vertices {
            bytes.extend_from_slice(&x.to_le_bytes());
            bytes.extend_from_slice(&y.to_le_bytes());
        }
        queue.write_buffer(&self.vertex_buffer, 0, &bytes);
    }

    pub(crate) fn draw<'pass>(&'pass self, pass: &mut wgpu::RenderPass<'pass>) {
        if self.vertex_count == 0 {
            return;
        }
        pass.set_pipeline(&self.pipeline);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.draw(0..self.vertex_count, 0..1);
    }
}
