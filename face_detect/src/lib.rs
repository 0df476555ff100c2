#![forbid(unsafe_code)]

use thiserror::Error;
use yuv_frame::Rotation;

pub mod bright;
pub mod overlay;
pub mod worker;

pub use bright::BrightRegionDetector;
pub use overlay::FaceOverlay;
pub use worker::{Detection, DetectionHandle, DetectionWorker, FaceResults, WorkerStats};

/// One detected face in upright frame coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Face {
    /// `[x, y, w, h]`
    pub rect: [f32; 4],
    /// Five `(x, y)` points: eyes, nose tip, mouth corners.
    pub landmarks: [f32; 10],
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectError {
    #[error("nv21 buffer of {len} bytes does not hold a {width}x{height} frame")]
    InvalidFrame { width: u32, height: u32, len: usize },
    #[error("detector failed: {0}")]
    Detector(String),
}

/// Detector collaborator. Frames always arrive as NV21; `orientation` is the
/// rotation that makes the frame upright on screen.
pub trait FaceDetector: Send {
    fn detect(
        &mut self,
        nv21: &[u8],
        width: u32,
        height: u32,
        orientation: Rotation,
    ) -> Result<Vec<Face>, DetectError>;
}

impl<F> FaceDetector for F
where
    F: FnMut(&[u8], u32, u32, Rotation) -> Result<Vec<Face>, DetectError> + Send,
{
    fn detect(
        &mut self,
        nv21: &[u8],
        width: u32,
        height: u32,
        orientation: Rotation,
    ) -> Result<Vec<Face>, DetectError> {
        self(nv21, width, height, orientation)
    }
}

/// Size of `width x height` once turned upright by `rotation`.
pub fn upright_size(width: u32, height: u32, rotation: Rotation) -> (u32, u32) {
    if rotation.swaps_axes() {
        (height, width)
    } else {
        (width, height)
    }
}

/// Moves a point from frame coordinates to upright coordinates. Turns are
/// counter-clockwise, matching how the preview quad is rotated.
pub fn rotate_point(point: [f32; 2], width: u32, height: u32, rotation: Rotation) -> [f32; 2] {
    let [x, y] = point;
    let (w, h) = (width as f32, height as f32);
    match rotation {
        Rotation::Deg0 => [x, y],
        Rotation::Deg90 => [y, w - x],
        Rotation::Deg180 => [w - x, h - y],
        Rotation::Deg270 => [h - y, x],
    }
}

/// [`rotate_point`] for an `[x, y, w, h]` rectangle.
pub fn rotate_rect(rect: [f32; 4], width: u32, height: u32, rotation: Rotation) -> [f32; 4] {
    let [x, y, w, h] = rect;
    let a = rotate_point([x, y], width, height, rotation);
    let b = rotate_point([x + w, y + h], width, height, rotation);
    let left = a[0].min(b[0]);
    let top = a[1].min(b[1]);
    [left, top, (a[0] - b[0]).abs(), (a[1] - b[1]).abs()]
}

pub(crate) fn check_nv21(nv21: &[u8], width: u32, height: u32) -> Result<(), DetectError> {
    let invalid = DetectError::InvalidFrame {
        width,
        height,
        len: nv21.len(),
    };
    let expected = yuv_frame::packed_len(width, height).map_err(|_| invalid.clone())?;
    if nv21.len() != expected {
        return Err(invalid);
    }
    Ok(())
}
