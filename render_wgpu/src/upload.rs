use yuv_frame::{ChromaPlanes, PackedYuvBuffer, YuvFormat};

use crate::GpuCallError;

/// Shape of one plane texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneSpec {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl PlaneSpec {
    pub fn bytes_per_texel(&self) -> usize {
        match self.format {
            wgpu::TextureFormat::Rg8Unorm => 2,
            _ => 1,
        }
    }
}

/// Textures needed for `format`: Y/U/V as single-channel planes for I420,
/// Y plus a two-channel chroma plane for NV12/NV21.
pub fn plane_specs(format: YuvFormat, width: u32, height: u32) -> Vec<PlaneSpec> {
    let (cw, ch) = (width / 2, height / 2);
    let y = PlaneSpec {
        label: "preview.yuv.texture_y",
        width,
        height,
        format: wgpu::TextureFormat::R8Unorm,
    };
    match format {
        YuvFormat::I420 => vec![
            y,
            PlaneSpec {
                label: "preview.yuv.texture_u",
                width: cw,
                height: ch,
                format: wgpu::TextureFormat::R8Unorm,
            },
            PlaneSpec {
                label: "preview.yuv.texture_v",
                width: cw,
                height: ch,
                format: wgpu::TextureFormat::R8Unorm,
            },
        ],
        YuvFormat::Nv12 | YuvFormat::Nv21 => vec![
            y,
            PlaneSpec {
                label: "preview.yuv.texture_uv",
                width: cw,
                height: ch,
                format: wgpu::TextureFormat::Rg8Unorm,
            },
        ],
    }
}

/// Plane textures for one `(dimensions, format)` pair.
pub struct PlaneTextures {
    pub width: u32,
    pub height: u32,
    pub format: YuvFormat,
    specs: Vec<PlaneSpec>,
    textures: Vec<wgpu::Texture>,
    views: Vec<wgpu::TextureView>,
}

impl PlaneTextures {
    pub fn new(device: &wgpu::Device, format: YuvFormat, width: u32, height: u32) -> Self {
        let specs = plane_specs(format, width, height);
        let textures: Vec<_> = specs
            .iter()
            .map(|spec| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(spec.label),
                    size: wgpu::Extent3d {
                        width: spec.width,
                        height: spec.height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: spec.format,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                })
            })
            .collect();
        let views = textures
            .iter()
            .map(|texture| texture.create_view(&wgpu::TextureViewDescriptor::default()))
            .collect();
        tracing::debug!(width, height, %format, planes = specs.len(), "plane textures allocated");
        Self {
            width,
            height,
            format,
            specs,
            textures,
            views,
        }
    }

    pub fn matches(&self, format: YuvFormat, width: u32, height: u32) -> bool {
        self.format == format && self.width == width && self.height == height
    }

    /// Views for bindings 0..=2. Semi-planar input binds the chroma view twice.
    pub fn binding_views(&self) -> [&wgpu::TextureView; 3] {
        match self.views.as_slice() {
            [y, u, v] => [y, u, v],
            [y, uv] => [y, uv, uv],
            _ => unreachable!("plane textures always hold two or three views"),
        }
    }

    pub fn upload(&self, queue: &wgpu::Queue, buffer: &PackedYuvBuffer) -> Result<(), GpuCallError> {
        if !self.matches(buffer.format(), buffer.width(), buffer.height()) {
            return Err(GpuCallError::TextureMismatch {
                width: buffer.width(),
                height: buffer.height(),
            });
        }
        let planes: Vec<&[u8]> = match buffer.chroma() {
            ChromaPlanes::Planar { u, v } => vec![buffer.y(), u.data(), v.data()],
            ChromaPlanes::Interleaved(uv) => vec![buffer.y(), uv.data()],
        };
        for ((spec, texture), data) in self.specs.iter().zip(&self.textures).zip(planes) {
            upload_plane(queue, texture, spec, data)?;
        }
        Ok(())
    }
}

/// Row pitch of a tightly packed plane. `Queue::write_texture` takes unaligned
/// rows, so packed planes go up without a copy.
fn packed_row_bytes(spec: &PlaneSpec, data_len: usize) -> Result<u32, GpuCallError> {
    let row_bytes = usize::try_from(spec.width)
        .ok()
        .and_then(|w| w.checked_mul(spec.bytes_per_texel()))
        .ok_or(GpuCallError::SizeOverflow)?;
    let height = usize::try_from(spec.height).map_err(|_| GpuCallError::SizeOverflow)?;
    let expected = row_bytes
        .checked_mul(height)
        .ok_or(GpuCallError::SizeOverflow)?;
    if data_len != expected {
        return Err(GpuCallError::DataSizeMismatch {
            expected,
            actual: data_len,
        });
    }
    u32::try_from(row_bytes).map_err(|_| GpuCallError::SizeOverflow)
}

fn upload_plane(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    spec: &PlaneSpec,
    data: &[u8],
) -> Result<(), GpuCallError> {
    let bytes_per_row = packed_row_bytes(spec, data.len())?;
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(bytes_per_row),
            rows_per_image: Some(spec.height),
        },
        wgpu::Extent3d {
            width: spec.width,
            height: spec.height,
            depth_or_array_layers: 1,
        },
    );
    Ok(())
}
