// CPU mirror of the fragment shader, so the GPU paths can be checked without
// a device.

use yuv_frame::{ChromaPlanes, PackedYuvBuffer, YuvFormat};

use crate::shader::{chroma_channels, ChromaChannel};

/// Texels the shader samples at one chroma position.
#[derive(Clone, Copy, Debug, PartialEq)]
struct ChromaTexels {
    first_r: f32,
    first_g: f32,
    second_r: f32,
}

impl ChromaTexels {
    fn read(&self, channel: ChromaChannel) -> f32 {
        match channel {
            ChromaChannel::FirstR => self.first_r,
            ChromaChannel::FirstG => self.first_g,
            ChromaChannel::SecondR => self.second_r,
        }
    }
}

/// BT.601 conversion with chroma biased by -0.5, clamped to `[0, 1]`.
fn yuv_to_rgb(y: f32, cb: f32, cr: f32) -> [f32; 3] {
    let u = cb - 0.5;
    let v = cr - 0.5;
    let r = y + 1.402 * v;
    let g = y - 0.344 * u - 0.714 * v;
    let b = y + 1.772 * u;
    [r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0)]
}

fn sample_chroma(format: YuvFormat, texels: ChromaTexels) -> (f32, f32) {
    let [cb, cr] = chroma_channels(format);
    (texels.read(cb), texels.read(cr))
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Texels uploaded for pixel `(x, y)` of `buffer`, nearest sampling.
fn chroma_texels(buffer: &PackedYuvBuffer, x: u32, y: u32) -> ChromaTexels {
    let cw = (buffer.width() / 2) as usize;
    let index = (y / 2) as usize * cw + (x / 2) as usize;
    match buffer.chroma() {
        ChromaPlanes::Planar { u, v } => ChromaTexels {
            first_r: unorm(u.data()[index]),
            first_g: 0.0,
            second_r: unorm(v.data()[index]),
        },
        ChromaPlanes::Interleaved(uv) => {
            let first_r = unorm(uv.data()[index * 2]);
            let first_g = unorm(uv.data()[index * 2 + 1]);
            // The second binding aliases the chroma texture for semi-planar input.
            ChromaTexels {
                first_r,
                first_g,
                second_r: first_r,
            }
        }
    }
}

/// RGB the shader would produce for pixel `(x, y)` before any sRGB step.
fn pixel_rgb(buffer: &PackedYuvBuffer, x: u32, y: u32) -> [f32; 3] {
    let luma = unorm(buffer.y()[(y * buffer.width() + x) as usize]);
    let (cb, cr) = sample_chroma(buffer.format(), chroma_texels(buffer, x, y));
    yuv_to_rgb(luma, cb, cr)
}

fn unorm(value: u8) -> f32 {
    f32::from(value) / 255.0
}

mod tests {
    use super::*;
    use yuv_frame::{i420_to_nv12, i420_to_nv21, packed_len};

    const EPSILON: f32 = 1e-5;

    fn assert_close(a: [f32; 3], b: [f32; 3]) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < EPSILON, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn neutral_chroma_is_grey() {
        assert_close(yuv_to_rgb(0.25, 0.5, 0.5), [0.25, 0.25, 0.25]);
        assert_close(yuv_to_rgb(1.0, 0.5, 0.5), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn coefficients_match_bt601() {
        let [r, g, b] = yuv_to_rgb(0.5, 0.6, 0.4);
        assert!((r - (0.5 - 0.1402)).abs() < EPSILON);
        assert!((g - (0.5 - 0.0344 + 0.0714)).abs() < EPSILON);
        assert!((b - (0.5 + 0.1772)).abs() < EPSILON);
    }

    #[test]
    fn all_layouts_agree_on_rgb() {
        let (width, height) = (8u32, 4u32);
        let len = packed_len(width, height).unwrap();
        let i420_bytes: Vec<u8> = (0..len).map(|i| (i * 37 % 251) as u8).collect();
        let mut nv12_bytes = vec![0u8; len];
        let mut nv21_bytes = vec![0u8; len];
        i420_to_nv12(&i420_bytes, width, height, &mut nv12_bytes).unwrap();
        i420_to_nv21(&i420_bytes, width, height, &mut nv21_bytes).unwrap();

        let i420 = PackedYuvBuffer::from_bytes(width, height, YuvFormat::I420, i420_bytes).unwrap();
        let nv12 = PackedYuvBuffer::from_bytes(width, height, YuvFormat::Nv12, nv12_bytes).unwrap();
        let nv21 = PackedYuvBuffer::from_bytes(width, height, YuvFormat::Nv21, nv21_bytes).unwrap();

        for y in 0..height {
            for x in 0..width {
                let reference = pixel_rgb(&i420, x, y);
                assert_close(pixel_rgb(&nv12, x, y), reference);
                assert_close(pixel_rgb(&nv21, x, y), reference);
            }
        }
    }

    #[test]
    fn semi_planar_channel_order_is_swapped() {
        let texels = ChromaTexels {
            first_r: 0.2,
            first_g: 0.8,
            second_r: 0.2,
        };
        assert_eq!(sample_chroma(YuvFormat::Nv12, texels), (0.2, 0.8));
        assert_eq!(sample_chroma(YuvFormat::Nv21, texels), (0.8, 0.2));
    }

    #[test]
    fn srgb_linearisation_endpoints() {
        assert_eq!(srgb_to_linear(0.0), 0.0);
        assert!((srgb_to_linear(1.0) - 1.0).abs() < EPSILON);
        assert!(srgb_to_linear(0.5) < 0.5);
    }
}
