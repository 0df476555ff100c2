use crate::{
    check_dimensions, packed_len, plane_len, ChromaPlanes, FrameError, PackedYuvBuffer, PixelPlane,
    YuvFormat, YuvFrame,
};

#[derive(Clone, Copy, Debug)]
enum StagedChroma {
    Planar { u_stride: usize, v_stride: usize },
    Interleaved { stride: usize },
}

#[derive(Clone, Copy, Debug)]
struct StagedLayout {
    width: u32,
    height: u32,
    format: YuvFormat,
    y_stride: usize,
    chroma: StagedChroma,
}

/// [`stage`](Self::stage) copies raw planes out so the hardware image can go
/// back early; [`pack`](Self::pack) then strips the stride padding.
#[derive(Default)]
pub struct PlaneExtractor {
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
    packed: PackedYuvBuffer,
    staged: Option<StagedLayout>,
    dims: Option<(u32, u32)>,
    allocations: u64,
}

impl PlaneExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the scratch set has been (re)allocated.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Last successfully packed frame; empty until the first extraction.
    pub fn packed(&self) -> &PackedYuvBuffer {
        &self.packed
    }

    pub fn extract(&mut self, frame: &YuvFrame<'_>) -> Result<&PackedYuvBuffer, FrameError> {
        self.stage(frame)?;
        self.pack()
    }

    /// Validates `frame` and copies its raw planes into scratch. Nothing is
    /// written when validation fails, so the previous output stays intact.
    pub fn stage(&mut self, frame: &YuvFrame<'_>) -> Result<(), FrameError> {
        let width = frame.width();
        let height = frame.height();
        check_dimensions(width, height)?;
        let w = width as usize;
        let h = height as usize;

        let luma = frame.luma();
        require_rows("y", &luma, h, w)?;
        let chroma = frame.chroma();
        match chroma {
            ChromaPlanes::Planar { u, v } => {
                require_rows("u", &u, h / 2, w / 2)?;
                require_rows("v", &v, h / 2, w / 2)?;
            }
            ChromaPlanes::Interleaved(uv) => {
                // The final row only needs to start inside the buffer.
                require_rows("uv", &uv, h / 2, 1)?;
            }
        }

        if self.dims != Some((width, height)) {
            self.reallocate(frame)?;
        }

        copy_raw(&mut self.y, luma.data());
        let (format, staged_chroma) = match chroma {
            ChromaPlanes::Planar { u, v } => {
                copy_raw(&mut self.u, u.data());
                copy_raw(&mut self.v, v.data());
                (
                    YuvFormat::I420,
                    StagedChroma::Planar {
                        u_stride: u.row_stride(),
                        v_stride: v.row_stride(),
                    },
                )
            }
            ChromaPlanes::Interleaved(uv) => {
                copy_raw(&mut self.u, uv.data());
                self.v.clear();
                (
                    frame.format(),
                    StagedChroma::Interleaved {
                        stride: uv.row_stride(),
                    },
                )
            }
        };
        self.staged = Some(StagedLayout {
            width,
            height,
            format,
            y_stride: luma.row_stride(),
            chroma: staged_chroma,
        });
        Ok(())
    }

    /// Packs the staged planes, dropping stride padding.
    pub fn pack(&mut self) -> Result<&PackedYuvBuffer, FrameError> {
        let layout = self.staged.take().ok_or(FrameError::NothingStaged)?;
        let w = layout.width as usize;
        let h = layout.height as usize;
        let y_len = w * h;
        let c_len = y_len / 4;

        self.packed.set_format(layout.format);
        let out = self.packed.as_bytes_mut();
        copy_rows(&self.y, layout.y_stride, w, h, &mut out[..y_len]);
        match layout.chroma {
            StagedChroma::Planar { u_stride, v_stride } => {
                copy_rows(&self.u, u_stride, w / 2, h / 2, &mut out[y_len..y_len + c_len]);
                copy_rows(&self.v, v_stride, w / 2, h / 2, &mut out[y_len + c_len..]);
            }
            StagedChroma::Interleaved { stride } => {
                copy_interleaved(&self.u, stride, w, h / 2, &mut out[y_len..]);
            }
        }
        Ok(&self.packed)
    }

    fn reallocate(&mut self, frame: &YuvFrame<'_>) -> Result<(), FrameError> {
        let (width, height) = (frame.width(), frame.height());
        let packed = PackedYuvBuffer::new(width, height, frame.format())?;
        let luma_capacity = frame.luma().len().max(plane_len(width, height)?);
        let (u_capacity, v_capacity) = match frame.chroma() {
            ChromaPlanes::Planar { u, v } => (u.len(), v.len()),
            ChromaPlanes::Interleaved(uv) => (uv.len(), 0),
        };
        self.y = Vec::with_capacity(luma_capacity);
        self.u = Vec::with_capacity(u_capacity);
        self.v = Vec::with_capacity(v_capacity);
        self.packed = packed;
        self.dims = Some((width, height));
        self.allocations += 1;
        tracing::debug!(
            width,
            height,
            packed_len = packed_len(width, height)?,
            "extractor scratch reallocated"
        );
        Ok(())
    }
}

/// Checks that every row but the last is complete and the last holds at
/// least `last_row` bytes.
fn require_rows(
    plane: &'static str,
    source: &PixelPlane<'_>,
    rows: usize,
    last_row: usize,
) -> Result<(), FrameError> {
    let expected = (rows - 1)
        .checked_mul(source.row_stride())
        .and_then(|n| n.checked_add(last_row))
        .ok_or(FrameError::SizeOverflow)?;
    if source.len() < expected {
        return Err(FrameError::PlaneTooShort {
            plane,
            expected,
            actual: source.len(),
        });
    }
    Ok(())
}

fn copy_raw(dst: &mut Vec<u8>, src: &[u8]) {
    dst.clear();
    dst.extend_from_slice(src);
}

fn copy_rows(src: &[u8], stride: usize, width: usize, rows: usize, dst: &mut [u8]) {
    if stride == width {
        let len = width * rows;
        dst[..len].copy_from_slice(&src[..len]);
        return;
    }
    for (row, out) in dst.chunks_exact_mut(width).take(rows).enumerate() {
        let start = row * stride;
        out.copy_from_slice(&src[start..start + width]);
    }
}

/// Copies an interleaved chroma plane. Rows are clamped to the bytes the
/// source actually holds; a short final row is zero-filled past that point.
fn copy_interleaved(src: &[u8], stride: usize, width: usize, rows: usize, dst: &mut [u8]) {
    if stride == width {
        let len = src.len().min(width * rows);
        dst[..len].copy_from_slice(&src[..len]);
        if len < dst.len() {
            tracing::debug!(available = len, expected = dst.len(), "short chroma plane");
            dst[len..].fill(0);
        }
        return;
    }
    for (row, out) in dst.chunks_exact_mut(width).take(rows).enumerate() {
        let start = row * stride;
        let len = src.len().saturating_sub(start).min(width);
        out[..len].copy_from_slice(&src[start..start + len]);
        if len < width {
            tracing::debug!(row, available = len, width, "short chroma row clamped");
            out[len..].fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChromaOrder, PixelPlane};

    fn padded(width: usize, rows: usize, stride: usize, seed: u8) -> Vec<u8> {
        let mut out = vec![0xEE; stride * rows];
        for row in 0..rows {
            for col in 0..width {
                out[row * stride + col] = seed.wrapping_add((row * width + col) as u8);
            }
        }
        out
    }

    #[test]
    fn padded_luma_matches_unpadded() {
        let (w, h) = (6usize, 4usize);
        let tight_y = padded(w, h, w, 10);
        let loose_y = padded(w, h, w + 10, 10);
        let u = padded(w / 2, h / 2, w / 2, 100);
        let v = padded(w / 2, h / 2, w / 2, 200);

        let tight = YuvFrame::new(
            w as u32,
            h as u32,
            YuvFormat::I420,
            &[
                PixelPlane::packed(&tight_y, w),
                PixelPlane::packed(&u, w / 2),
                PixelPlane::packed(&v, w / 2),
            ],
        )
        .unwrap();
        let loose = YuvFrame::new(
            w as u32,
            h as u32,
            YuvFormat::I420,
            &[
                PixelPlane::new(&loose_y, w + 10, 1),
                PixelPlane::packed(&u, w / 2),
                PixelPlane::packed(&v, w / 2),
            ],
        )
        .unwrap();

        let mut a = PlaneExtractor::new();
        let mut b = PlaneExtractor::new();
        let first = a.extract(&tight).unwrap().clone();
        let second = b.extract(&loose).unwrap().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn double_stride_keeps_sub_rectangle() {
        let y: Vec<u8> = (0..32).collect();
        let u: Vec<u8> = (100..108).collect();
        let v: Vec<u8> = (200..208).collect();
        let frame = YuvFrame::new(
            4,
            4,
            YuvFormat::I420,
            &[
                PixelPlane::new(&y, 8, 1),
                PixelPlane::new(&u, 4, 1),
                PixelPlane::new(&v, 4, 1),
            ],
        )
        .unwrap();

        let mut extractor = PlaneExtractor::new();
        let packed = extractor.extract(&frame).unwrap();
        assert_eq!(packed.format(), YuvFormat::I420);
        assert_eq!(
            packed.y(),
            &[0, 1, 2, 3, 8, 9, 10, 11, 16, 17, 18, 19, 24, 25, 26, 27]
        );
        assert_eq!(packed.u().unwrap(), &[100, 101, 104, 105]);
        assert_eq!(packed.v().unwrap(), &[200, 201, 204, 205]);
    }

    #[test]
    fn short_final_chroma_row_is_truncated() {
        let (w, h, stride) = (4usize, 4usize, 6usize);
        let y = vec![16u8; w * h];
        // Two chroma rows; the last one is one byte short of `width`.
        let mut vu = vec![0u8; stride + w - 1];
        for (i, byte) in vu.iter_mut().enumerate() {
            *byte = 50 + i as u8;
        }
        let frame = YuvFrame::new(
            w as u32,
            h as u32,
            YuvFormat::Nv21,
            &[PixelPlane::packed(&y, w), PixelPlane::new(&vu, stride, 2)],
        )
        .unwrap();

        let mut extractor = PlaneExtractor::new();
        let packed = extractor.extract(&frame).unwrap();
        assert_eq!(packed.format(), YuvFormat::Nv21);
        assert_eq!(packed.uv().unwrap(), &[50, 51, 52, 53, 56, 57, 58, 0]);
    }

    #[test]
    fn camera2_overlapping_views_pack_as_nv21() {
        let (w, h, stride) = (4usize, 4usize, 4usize);
        let y = vec![0u8; w * h];
        // Interleaved VU memory; the U view starts one byte in.
        let memory = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let frame = YuvFrame::from_yuv420_888(
            w as u32,
            h as u32,
            PixelPlane::packed(&y, w),
            PixelPlane::new(&memory[1..], stride, 2),
            PixelPlane::new(&memory[..7], stride, 2),
            ChromaOrder::VFirst,
        )
        .unwrap();

        let mut extractor = PlaneExtractor::new();
        let packed = extractor.extract(&frame).unwrap();
        assert_eq!(packed.format(), YuvFormat::Nv21);
        assert_eq!(packed.uv().unwrap(), &[1, 2, 3, 4, 5, 6, 7, 0]);
    }

    #[test]
    fn scratch_reused_for_equal_dimensions() {
        let mut extractor = PlaneExtractor::new();
        let small = vec![0u8; 4 * 4 * 3 / 2];
        let large = vec![0u8; 8 * 4 * 3 / 2];
        for _ in 0..3 {
            let frame = YuvFrame::from_packed(&small, 4, 4, YuvFormat::Nv21).unwrap();
            extractor.extract(&frame).unwrap();
        }
        assert_eq!(extractor.allocations(), 1);

        let frame = YuvFrame::from_packed(&large, 8, 4, YuvFormat::Nv21).unwrap();
        let packed = extractor.extract(&frame).unwrap();
        assert_eq!(packed.as_bytes().len(), 48);
        assert_eq!(extractor.allocations(), 2);
    }

    #[test]
    fn malformed_frame_leaves_output_untouched() {
        let good: Vec<u8> = (0..24).collect();
        let mut extractor = PlaneExtractor::new();
        let frame = YuvFrame::from_packed(&good, 4, 4, YuvFormat::I420).unwrap();
        let before = extractor.extract(&frame).unwrap().clone();

        let y = vec![9u8; 10];
        let u = vec![9u8; 4];
        let v = vec![9u8; 4];
        let short = YuvFrame::new(
            4,
            4,
            YuvFormat::I420,
            &[
                PixelPlane::packed(&y, 4),
                PixelPlane::packed(&u, 2),
                PixelPlane::packed(&v, 2),
            ],
        )
        .unwrap();
        let err = extractor.extract(&short).unwrap_err();
        assert_eq!(
            err,
            FrameError::PlaneTooShort {
                plane: "y",
                expected: 16,
                actual: 10,
            }
        );
        assert_eq!(extractor.packed(), &before);
    }

    #[test]
    fn pack_without_stage_fails() {
        let mut extractor = PlaneExtractor::new();
        assert_eq!(extractor.pack().unwrap_err(), FrameError::NothingStaged);
    }
}
