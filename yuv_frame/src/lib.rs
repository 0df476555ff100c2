#![forbid(unsafe_code)]
//! YUV 4:2:0 frame model shared by the capture, exchange and render crates.

use std::fmt;

use thiserror::Error;

pub use convert::{
    i420_to_nv12, i420_to_nv21, nv12_to_i420, nv21_to_i420, swap_chroma_in_place, to_nv21,
};
pub use extract::PlaneExtractor;

pub mod convert;
pub mod extract;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum YuvFormat {
    I420,
    Nv12,
    Nv21,
}

impl YuvFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            YuvFormat::I420 => "i420",
            YuvFormat::Nv12 => "nv12",
            YuvFormat::Nv21 => "nv21",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "i420" | "yuv420p" => Some(YuvFormat::I420),
            "nv12" => Some(YuvFormat::Nv12),
            "nv21" => Some(YuvFormat::Nv21),
            _ => None,
        }
    }

    pub fn plane_count(self) -> usize {
        match self {
            YuvFormat::I420 => 3,
            YuvFormat::Nv12 | YuvFormat::Nv21 => 2,
        }
    }

    pub fn is_semi_planar(self) -> bool {
        self.plane_count() == 2
    }

    /// Integer tag the fragment shader switches on.
    pub fn shader_tag(self) -> u32 {
        match self {
            YuvFormat::I420 => 0,
            YuvFormat::Nv12 => 1,
            YuvFormat::Nv21 => 2,
        }
    }
}

impl fmt::Display for YuvFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which chroma channel comes first in an interleaved plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChromaOrder {
    UFirst,
    VFirst,
}

impl ChromaOrder {
    pub fn format(self) -> YuvFormat {
        match self {
            ChromaOrder::UFirst => YuvFormat::Nv12,
            ChromaOrder::VFirst => YuvFormat::Nv21,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Snaps an arbitrary angle to the nearest quarter turn; ties round up.
    pub fn nearest(degrees: i32) -> Self {
        let normalized = degrees.rem_euclid(360);
        match ((normalized + 45) / 90) % 4 {
            0 => Rotation::Deg0,
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            _ => Rotation::Deg270,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    pub fn radians(self) -> f32 {
        (self.degrees() as f32).to_radians()
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Metadata stored next to a published frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameMeta {
    pub width: u32,
    pub height: u32,
    pub format: YuvFormat,
    pub rotation: Rotation,
    pub mirrored: bool,
    pub sequence: u64,
    pub timestamp_ns: u64,
}

/// Errors for frames that cannot be extracted or converted. Every variant
/// means the frame is dropped; none of them is fatal to the pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid frame dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("frame size overflow")]
    SizeOverflow,
    #[error("{format} frame expects {expected} planes, got {actual}")]
    PlaneCountMismatch {
        format: YuvFormat,
        expected: usize,
        actual: usize,
    },
    #[error("{plane} plane has unsupported pixel stride {pixel_stride}")]
    UnsupportedPixelStride {
        plane: &'static str,
        pixel_stride: usize,
    },
    #[error("{plane} plane row stride {row_stride} is narrower than {required} bytes")]
    InvalidStride {
        plane: &'static str,
        row_stride: usize,
        required: usize,
    },
    #[error("{plane} plane too short: expected at least {expected} bytes, got {actual}")]
    PlaneTooShort {
        plane: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },
    #[error("no frame staged for packing")]
    NothingStaged,
}

/// Borrowed view over one plane of a hardware image.
#[derive(Clone, Copy, Debug)]
pub struct PixelPlane<'a> {
    data: &'a [u8],
    row_stride: usize,
    pixel_stride: usize,
}

impl<'a> PixelPlane<'a> {
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// A plane with no padding and one byte per sample.
    pub fn packed(data: &'a [u8], width: usize) -> Self {
        Self::new(data, width, 1)
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn pixel_stride(&self) -> usize {
        self.pixel_stride
    }

    fn check(
        &self,
        plane: &'static str,
        samples: usize,
        pixel_stride: usize,
    ) -> Result<(), FrameError> {
        if self.pixel_stride != pixel_stride {
            return Err(FrameError::UnsupportedPixelStride {
                plane,
                pixel_stride: self.pixel_stride,
            });
        }
        let required = samples
            .checked_mul(pixel_stride)
            .ok_or(FrameError::SizeOverflow)?;
        if self.row_stride < required {
            return Err(FrameError::InvalidStride {
                plane,
                row_stride: self.row_stride,
                required,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub enum ChromaPlanes<'a> {
    Planar {
        u: PixelPlane<'a>,
        v: PixelPlane<'a>,
    },
    /// One plane of paired samples; the frame format says which comes first.
    Interleaved(PixelPlane<'a>),
}

/// One captured image, borrowed for the duration of the capture callback.
#[derive(Clone, Copy, Debug)]
pub struct YuvFrame<'a> {
    width: u32,
    height: u32,
    format: YuvFormat,
    luma: PixelPlane<'a>,
    chroma: ChromaPlanes<'a>,
}

impl<'a> YuvFrame<'a> {
    pub fn new(
        width: u32,
        height: u32,
        format: YuvFormat,
        planes: &[PixelPlane<'a>],
    ) -> Result<Self, FrameError> {
        check_dimensions(width, height)?;
        if planes.len() != format.plane_count() {
            return Err(FrameError::PlaneCountMismatch {
                format,
                expected: format.plane_count(),
                actual: planes.len(),
            });
        }
        let w = width as usize;
        let luma = planes[0];
        luma.check("y", w, 1)?;
        let chroma = match format {
            YuvFormat::I420 => {
                let (u, v) = (planes[1], planes[2]);
                u.check("u", w / 2, 1)?;
                v.check("v", w / 2, 1)?;
                ChromaPlanes::Planar { u, v }
            }
            YuvFormat::Nv12 | YuvFormat::Nv21 => {
                let uv = planes[1];
                uv.check("uv", w / 2, 2)?;
                ChromaPlanes::Interleaved(uv)
            }
        };
        Ok(Self {
            width,
            height,
            format,
            luma,
            chroma,
        })
    }

    /// Wraps a tightly packed buffer, as delivered by the legacy camera API.
    pub fn from_packed(
        data: &'a [u8],
        width: u32,
        height: u32,
        format: YuvFormat,
    ) -> Result<Self, FrameError> {
        check_dimensions(width, height)?;
        let expected = packed_len(width, height)?;
        if data.len() < expected {
            return Err(FrameError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        let w = width as usize;
        let y_len = plane_len(width, height)?;
        let (y, chroma) = data[..expected].split_at(y_len);
        let luma = PixelPlane::packed(y, w);
        match format {
            YuvFormat::I420 => {
                let (u, v) = chroma.split_at(y_len / 4);
                Self::new(
                    width,
                    height,
                    format,
                    &[luma, PixelPlane::packed(u, w / 2), PixelPlane::packed(v, w / 2)],
                )
            }
            YuvFormat::Nv12 | YuvFormat::Nv21 => {
                Self::new(width, height, format, &[luma, PixelPlane::new(chroma, w, 2)])
            }
        }
    }

    /// Classifies a three-plane `YUV_420_888` image. Pixel stride 1 chroma is
    /// planar I420; pixel stride 2 chroma is a semi-planar layout whose first
    /// sampled channel is given by `order`.
    pub fn from_yuv420_888(
        width: u32,
        height: u32,
        y: PixelPlane<'a>,
        u: PixelPlane<'a>,
        v: PixelPlane<'a>,
        order: ChromaOrder,
    ) -> Result<Self, FrameError> {
        if u.pixel_stride() != v.pixel_stride() {
            return Err(FrameError::UnsupportedPixelStride {
                plane: "v",
                pixel_stride: v.pixel_stride(),
            });
        }
        match u.pixel_stride() {
            1 => Self::new(width, height, YuvFormat::I420, &[y, u, v]),
            2 => {
                let first = match order {
                    ChromaOrder::UFirst => u,
                    ChromaOrder::VFirst => v,
                };
                Self::new(width, height, order.format(), &[y, first])
            }
            other => Err(FrameError::UnsupportedPixelStride {
                plane: "u",
                pixel_stride: other,
            }),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> YuvFormat {
        self.format
    }

    pub fn luma(&self) -> PixelPlane<'a> {
        self.luma
    }

    pub fn chroma(&self) -> ChromaPlanes<'a> {
        self.chroma
    }
}

/// Tightly packed `width * height * 3 / 2` frame with no stride padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedYuvBuffer {
    width: u32,
    height: u32,
    format: YuvFormat,
    data: Vec<u8>,
}

impl Default for PackedYuvBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

impl PackedYuvBuffer {
    /// Zero-capacity sentinel meaning "no frame yet".
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            format: YuvFormat::I420,
            data: Vec::new(),
        }
    }

    pub fn new(width: u32, height: u32, format: YuvFormat) -> Result<Self, FrameError> {
        check_dimensions(width, height)?;
        let len = packed_len(width, height)?;
        Ok(Self {
            width,
            height,
            format,
            data: vec![0u8; len],
        })
    }

    pub fn from_bytes(
        width: u32,
        height: u32,
        format: YuvFormat,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        check_dimensions(width, height)?;
        let expected = packed_len(width, height)?;
        if data.len() != expected {
            return Err(FrameError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> YuvFormat {
        self.format
    }

    pub fn set_format(&mut self, format: YuvFormat) {
        self.format = format;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn y(&self) -> &[u8] {
        &self.data[..self.luma_len()]
    }

    /// Planar U samples; `None` for semi-planar buffers.
    pub fn u(&self) -> Option<&[u8]> {
        match self.chroma() {
            ChromaPlanes::Planar { u, .. } => Some(u.data()),
            ChromaPlanes::Interleaved(_) => None,
        }
    }

    pub fn v(&self) -> Option<&[u8]> {
        match self.chroma() {
            ChromaPlanes::Planar { v, .. } => Some(v.data()),
            ChromaPlanes::Interleaved(_) => None,
        }
    }

    /// Interleaved chroma pairs in the buffer's own order (UV for NV12, VU for NV21).
    pub fn uv(&self) -> Option<&[u8]> {
        match self.chroma() {
            ChromaPlanes::Interleaved(uv) => Some(uv.data()),
            ChromaPlanes::Planar { .. } => None,
        }
    }

    pub fn chroma(&self) -> ChromaPlanes<'_> {
        let w = self.width as usize;
        let y_len = self.luma_len();
        let chroma = &self.data[y_len..];
        match self.format {
            YuvFormat::I420 => {
                let (u, v) = chroma.split_at(y_len / 4);
                ChromaPlanes::Planar {
                    u: PixelPlane::packed(u, w / 2),
                    v: PixelPlane::packed(v, w / 2),
                }
            }
            YuvFormat::Nv12 | YuvFormat::Nv21 => {
                ChromaPlanes::Interleaved(PixelPlane::new(chroma, w, 2))
            }
        }
    }

    /// Changes the shape, reallocating only when the dimensions differ.
    /// Returns `true` when the backing storage was replaced.
    pub fn reshape(
        &mut self,
        width: u32,
        height: u32,
        format: YuvFormat,
    ) -> Result<bool, FrameError> {
        if self.width == width && self.height == height && !self.data.is_empty() {
            self.format = format;
            return Ok(false);
        }
        *self = Self::new(width, height, format)?;
        Ok(true)
    }

    /// Copies `other` in place. Returns `true` when storage was reallocated.
    pub fn copy_from(&mut self, other: &PackedYuvBuffer) -> Result<bool, FrameError> {
        if other.is_empty() {
            *self = Self::empty();
            return Ok(true);
        }
        let reallocated = self.reshape(other.width, other.height, other.format)?;
        self.data.copy_from_slice(&other.data);
        Ok(reallocated)
    }
}

pub fn check_dimensions(width: u32, height: u32) -> Result<(), FrameError> {
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(FrameError::InvalidDimensions { width, height });
    }
    Ok(())
}

pub fn plane_len(width: u32, height: u32) -> Result<usize, FrameError> {
    let width = usize::try_from(width).map_err(|_| FrameError::SizeOverflow)?;
    let height = usize::try_from(height).map_err(|_| FrameError::SizeOverflow)?;
    width.checked_mul(height).ok_or(FrameError::SizeOverflow)
}

/// Byte length of a packed 4:2:0 frame.
pub fn packed_len(width: u32, height: u32) -> Result<usize, FrameError> {
    let luma = plane_len(width, height)?;
    luma.checked_add(luma / 2).ok_or(FrameError::SizeOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_snaps_to_quarter_turns() {
        assert_eq!(Rotation::nearest(0), Rotation::Deg0);
        assert_eq!(Rotation::nearest(44), Rotation::Deg0);
        assert_eq!(Rotation::nearest(45), Rotation::Deg90);
        assert_eq!(Rotation::nearest(181), Rotation::Deg180);
        assert_eq!(Rotation::nearest(316), Rotation::Deg0);
        assert_eq!(Rotation::nearest(-90), Rotation::Deg270);
        assert_eq!(Rotation::nearest(450), Rotation::Deg90);
    }

    #[test]
    fn format_tags_and_plane_counts() {
        assert_eq!(YuvFormat::I420.shader_tag(), 0);
        assert_eq!(YuvFormat::Nv12.shader_tag(), 1);
        assert_eq!(YuvFormat::Nv21.shader_tag(), 2);
        assert_eq!(YuvFormat::I420.plane_count(), 3);
        assert_eq!(YuvFormat::Nv21.plane_count(), 2);
        assert_eq!(YuvFormat::parse(" NV21 "), Some(YuvFormat::Nv21));
        assert_eq!(YuvFormat::parse("rgba"), None);
    }

    #[test]
    fn frame_rejects_wrong_plane_count() {
        let y = [0u8; 16];
        let plane = PixelPlane::packed(&y, 4);
        let err = YuvFrame::new(4, 4, YuvFormat::I420, &[plane, plane]).unwrap_err();
        assert_eq!(
            err,
            FrameError::PlaneCountMismatch {
                format: YuvFormat::I420,
                expected: 3,
                actual: 2,
            }
        );
    }

    #[test]
    fn frame_rejects_odd_dimensions() {
        let data = [0u8; 64];
        let err = YuvFrame::from_packed(&data, 3, 4, YuvFormat::Nv21).unwrap_err();
        assert_eq!(err, FrameError::InvalidDimensions { width: 3, height: 4 });
    }

    #[test]
    fn frame_rejects_narrow_stride() {
        let data = [0u8; 64];
        let y = PixelPlane::new(&data, 2, 1);
        let uv = PixelPlane::new(&data, 4, 2);
        let err = YuvFrame::new(4, 4, YuvFormat::Nv12, &[y, uv]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidStride { plane: "y", .. }));
    }

    #[test]
    fn yuv420_888_classification_follows_pixel_stride() {
        let y = [0u8; 16];
        let chroma = [0u8; 8];
        let planar = YuvFrame::from_yuv420_888(
            4,
            4,
            PixelPlane::packed(&y, 4),
            PixelPlane::packed(&chroma[..4], 2),
            PixelPlane::packed(&chroma[4..], 2),
            ChromaOrder::VFirst,
        )
        .unwrap();
        assert_eq!(planar.format(), YuvFormat::I420);

        let semi = YuvFrame::from_yuv420_888(
            4,
            4,
            PixelPlane::packed(&y, 4),
            PixelPlane::new(&chroma[1..], 4, 2),
            PixelPlane::new(&chroma[..7], 4, 2),
            ChromaOrder::VFirst,
        )
        .unwrap();
        assert_eq!(semi.format(), YuvFormat::Nv21);
        match semi.chroma() {
            ChromaPlanes::Interleaved(plane) => assert_eq!(plane.len(), 7),
            ChromaPlanes::Planar { .. } => panic!("expected interleaved chroma"),
        }
    }

    #[test]
    fn packed_buffer_reshape_reuses_storage() {
        let mut buffer = PackedYuvBuffer::new(4, 4, YuvFormat::I420).unwrap();
        assert!(!buffer.reshape(4, 4, YuvFormat::Nv21).unwrap());
        assert_eq!(buffer.format(), YuvFormat::Nv21);
        assert!(buffer.reshape(8, 4, YuvFormat::Nv21).unwrap());
        assert_eq!(buffer.as_bytes().len(), 48);
        assert!(PackedYuvBuffer::empty().is_empty());
    }

    #[test]
    fn failed_reshape_keeps_buffer_intact() {
        let mut buffer = PackedYuvBuffer::new(4, 4, YuvFormat::I420).unwrap();
        let err = buffer.reshape(3, 4, YuvFormat::Nv21).unwrap_err();
        assert_eq!(err, FrameError::InvalidDimensions { width: 3, height: 4 });
        assert_eq!(buffer.format(), YuvFormat::I420);
        assert_eq!((buffer.width(), buffer.height()), (4, 4));
        assert_eq!(buffer.as_bytes().len(), 24);
        assert!(buffer.u().is_some());
    }
}
