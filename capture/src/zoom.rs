/// Number of zoom steps between no zoom and the maximum digital zoom.
pub const MAX_ZOOM: u32 = 200;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CropRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl CropRect {
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width as i32,
            bottom: height as i32,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoomStep {
    In,
    Out,
    To(u32),
}

pub struct ZoomController {
    active: CropRect,
    step_w: f32,
    step_h: f32,
    level: u32,
}

impl ZoomController {
    /// `max_digital_zoom` below 1.0 is treated as "no zoom available".
    pub fn new(active: CropRect, max_digital_zoom: f32) -> Self {
        let max = if max_digital_zoom.is_finite() {
            max_digital_zoom.max(1.0)
        } else {
            1.0
        };
        let w = active.width() as f32;
        let h = active.height() as f32;
        Self {
            active,
            step_w: (w - w / max) / MAX_ZOOM as f32 / 2.0,
            step_h: (h - h / max) / MAX_ZOOM as f32 / 2.0,
            level: 0,
        }
    }

    /// Applies one zoom request and returns the resulting level.
    pub fn apply(&mut self, step: ZoomStep) -> u32 {
        self.level = match step {
            ZoomStep::In => self.level.saturating_add(1),
            ZoomStep::Out => self.level.saturating_sub(1),
            ZoomStep::To(level) => level,
        }
        .min(MAX_ZOOM);
        self.level
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn crop_region(&self) -> CropRect {
        let inset_w = (self.step_w * self.level as f32) as i32;
        let inset_h = (self.step_h * self.level as f32) as i32;
        CropRect {
            left: self.active.left + inset_w,
            top: self.active.top + inset_h,
            right: self.active.right - inset_w,
            bottom: self.active.bottom - inset_h,
        }
    }

    /// Magnification of the current crop relative to the active array.
    pub fn zoom_factor(&self) -> f32 {
        let crop = self.crop_region();
        if crop.width() <= 0 {
            return 1.0;
        }
        self.active.width() as f32 / crop.width() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_spans_active_array_at_zero() {
        let zoom = ZoomController::new(CropRect::from_size(4000, 3000), 4.0);
        assert_eq!(zoom.crop_region(), CropRect::from_size(4000, 3000));
        assert_eq!(zoom.zoom_factor(), 1.0);
    }

    #[test]
    fn crop_reaches_max_digital_zoom() {
        let mut zoom = ZoomController::new(CropRect::from_size(4000, 3000), 4.0);
        assert_eq!(zoom.apply(ZoomStep::To(MAX_ZOOM + 50)), MAX_ZOOM);
        let crop = zoom.crop_region();
        assert_eq!(
            crop,
            CropRect {
                left: 1500,
                top: 1125,
                right: 2500,
                bottom: 1875,
            }
        );
        assert_eq!(zoom.zoom_factor(), 4.0);
    }

    #[test]
    fn steps_clamp_at_both_ends() {
        let mut zoom = ZoomController::new(CropRect::from_size(640, 480), 2.0);
        assert_eq!(zoom.apply(ZoomStep::Out), 0);
        assert_eq!(zoom.apply(ZoomStep::In), 1);
        zoom.apply(ZoomStep::To(MAX_ZOOM));
        assert_eq!(zoom.apply(ZoomStep::In), MAX_ZOOM);
    }

    #[test]
    fn no_digital_zoom_keeps_full_crop() {
        let mut zoom = ZoomController::new(CropRect::from_size(640, 480), 0.5);
        zoom.apply(ZoomStep::To(MAX_ZOOM));
        assert_eq!(zoom.crop_region(), CropRect::from_size(640, 480));
    }
}
