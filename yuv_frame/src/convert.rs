use crate::{packed_len, plane_len, FrameError, PackedYuvBuffer, YuvFormat};

pub fn i420_to_nv21(src: &[u8], width: u32, height: u32, dst: &mut [u8]) -> Result<(), FrameError> {
    interleave(src, width, height, dst, ChromaPair::VFirst)
}

pub fn i420_to_nv12(src: &[u8], width: u32, height: u32, dst: &mut [u8]) -> Result<(), FrameError> {
    interleave(src, width, height, dst, ChromaPair::UFirst)
}

pub fn nv21_to_i420(src: &[u8], width: u32, height: u32, dst: &mut [u8]) -> Result<(), FrameError> {
    deinterleave(src, width, height, dst, ChromaPair::VFirst)
}

pub fn nv12_to_i420(src: &[u8], width: u32, height: u32, dst: &mut [u8]) -> Result<(), FrameError> {
    deinterleave(src, width, height, dst, ChromaPair::UFirst)
}

/// Swaps every chroma pair in place, turning NV12 into NV21 and back.
pub fn swap_chroma_in_place(buffer: &mut [u8], width: u32, height: u32) -> Result<(), FrameError> {
    let y_len = check_len(buffer.len(), width, height)?;
    for pair in buffer[y_len..].chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
    Ok(())
}

/// Writes `buffer` as NV21 bytes into `dst`, resizing `dst` only when its
/// length differs from the frame size.
pub fn to_nv21(buffer: &PackedYuvBuffer, dst: &mut Vec<u8>) -> Result<(), FrameError> {
    let (width, height) = (buffer.width(), buffer.height());
    let len = packed_len(width, height)?;
    if dst.len() != len {
        dst.resize(len, 0);
    }
    let src = buffer.as_bytes();
    match buffer.format() {
        YuvFormat::Nv21 => {
            check_len(src.len(), width, height)?;
            dst.copy_from_slice(src);
            Ok(())
        }
        YuvFormat::Nv12 => {
            check_len(src.len(), width, height)?;
            dst.copy_from_slice(src);
            swap_chroma_in_place(dst, width, height)
        }
        YuvFormat::I420 => i420_to_nv21(src, width, height, dst),
    }
}

#[derive(Clone, Copy)]
enum ChromaPair {
    UFirst,
    VFirst,
}

fn check_len(actual: usize, width: u32, height: u32) -> Result<usize, FrameError> {
    let expected = packed_len(width, height)?;
    if actual != expected {
        return Err(FrameError::BufferSizeMismatch { expected, actual });
    }
    plane_len(width, height)
}

fn interleave(
    src: &[u8],
    width: u32,
    height: u32,
    dst: &mut [u8],
    order: ChromaPair,
) -> Result<(), FrameError> {
    let y_len = check_len(src.len(), width, height)?;
    check_len(dst.len(), width, height)?;
    let c_len = y_len / 4;
    dst[..y_len].copy_from_slice(&src[..y_len]);
    let u = &src[y_len..y_len + c_len];
    let v = &src[y_len + c_len..];
    let (first, second) = match order {
        ChromaPair::UFirst => (u, v),
        ChromaPair::VFirst => (v, u),
    };
    for ((pair, &a), &b) in dst[y_len..].chunks_exact_mut(2).zip(first).zip(second) {
        pair[0] = a;
        pair[1] = b;
    }
    Ok(())
}

fn deinterleave(
    src: &[u8],
    width: u32,
    height: u32,
    dst: &mut [u8],
    order: ChromaPair,
) -> Result<(), FrameError> {
    let y_len = check_len(src.len(), width, height)?;
    check_len(dst.len(), width, height)?;
    let c_len = y_len / 4;
    dst[..y_len].copy_from_slice(&src[..y_len]);
    let (u, v) = dst[y_len..].split_at_mut(c_len);
    let (first, second) = match order {
        ChromaPair::UFirst => (u, v),
        ChromaPair::VFirst => (v, u),
    };
    for ((pair, a), b) in src[y_len..]
        .chunks_exact(2)
        .zip(first.iter_mut())
        .zip(second.iter_mut())
    {
        *a = pair[0];
        *b = pair[1];
    }
    Ok(())
}
