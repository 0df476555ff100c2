use yuv_frame::Rotation;

use crate::{check_nv21, rotate_rect, upright_size, DetectError, Face, FaceDetector};

#[derive(Clone, Copy, Debug)]
pub struct BrightRegionDetector {
    /// Luma at or above this counts as part of the region.
    pub threshold: u8,
    /// Sample every `step`-th pixel in each direction.
    pub step: u32,
    /// Fewer sampled hits than this means no face.
    pub min_hits: u32,
}

impl Default for BrightRegionDetector {
    fn default() -> Self {
        Self {
            threshold: 230,
            step: 2,
            min_hits: 4,
        }
    }
}

impl FaceDetector for BrightRegionDetector {
    fn detect(
        &mut self,
        nv21: &[u8],
        width: u32,
        height: u32,
        orientation: Rotation,
    ) -> Result<Vec<Face>, DetectError> {
        check_nv21(nv21, width, height)?;
        let step = self.step.max(1) as usize;
        let (w, h) = (width as usize, height as usize);

        let mut hits = 0u32;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (usize::MAX, usize::MAX, 0, 0);
        for y in (0..h).step_by(step) {
            let row = &nv21[y * w..(y + 1) * w];
            for x in (0..w).step_by(step) {
                if row[x] >= self.threshold {
                    hits += 1;
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
            }
        }
        if hits < self.min_hits {
            return Ok(Vec::new());
        }

        let frame_rect = [
            min_x as f32,
            min_y as f32,
            (max_x + step).min(w) as f32 - min_x as f32,
            (max_y + step).min(h) as f32 - min_y as f32,
        ];
        let rect = rotate_rect(frame_rect, width, height, orientation);
        let (uw, uh) = upright_size(width, height, orientation);
        tracing::trace!(hits, ?rect, upright_w = uw, upright_h = uh, "bright region found");
        Ok(vec![Face {
            rect,
            landmarks: landmarks_for(rect),
        }])
    }
}

/// Conventional face proportions inside `rect`.
fn landmarks_for(rect: [f32; 4]) -> [f32; 10] {
    let [x, y, w, h] = rect;
    let at = |fx: f32, fy: f32| [x + w * fx, y + h * fy];
    let points = [
        at(0.3, 0.4),
        at(0.7, 0.4),
        at(0.5, 0.6),
        at(0.35, 0.8),
        at(0.65, 0.8),
    ];
    let mut out = [0.0; 10];
    for (slot, [px, py]) in out.chunks_exact_mut(2).zip(points) {
        slot[0] = px;
        slot[1] = py;
    }
    out
}
