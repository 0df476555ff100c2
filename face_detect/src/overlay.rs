use crate::worker::Detection;
use crate::Face;

pub struct FaceOverlay;

impl FaceOverlay {
    /// View-space `[x, y, w, h]` for `face`. `preview` is the upright size the
    /// detector worked in. Mirrored previews flip the box horizontally.
    pub fn map(face: &Face, preview: (u32, u32), view: (u32, u32), mirrored: bool) -> [f32; 4] {
        let (pw, ph) = preview;
        let (vw, vh) = view;
        if pw == 0 || ph == 0 {
            return [0.0; 4];
        }
        let sx = vw as f32 / pw as f32;
        let sy = vh as f32 / ph as f32;
        let [x, y, w, h] = face.rect;
        let width = w * sx;
        let left = if mirrored {
            let right = vw as f32 - x * sx;
            right - width
        } else {
            x * sx
        };
        [left, y * sy, width, h * sy]
    }

    /// Every face of `detection`, ready for the renderer's overlay.
    pub fn rects(detection: &Detection, view: (u32, u32), mirrored: bool) -> Vec<[f32; 4]> {
        let preview = (detection.width, detection.height);
        detection
            .faces
            .iter()
            .map(|face| Self::map(face, preview, view, mirrored))
            .collect()
    }
}
