use yuv_frame::YuvFormat;

use crate::image::PlanesMut;

/// BT.601 limited-range colour bars as `[y, u, v]`.
const BARS: [[u8; 3]; 8] = [
    [235, 128, 128],
    [210, 16, 146],
    [170, 166, 16],
    [145, 54, 34],
    [106, 202, 222],
    [81, 90, 240],
    [41, 240, 110],
    [16, 128, 128],
];
const SQUARE: [u8; 3] = [235, 128, 128];
const SCROLL_PER_FRAME: u64 = 2;

/// Scrolling colour bars with a bright square bouncing across them.
pub struct SyntheticSensor {
    width: u32,
    height: u32,
    zoom: f32,
}

impl SyntheticSensor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            zoom: 1.0,
        }
    }

    pub fn set_zoom(&mut self, factor: f32) {
        self.zoom = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Square position `[x, y, side]` in sensor pixels for `frame`, before zoom.
    pub fn square_at(&self, frame: u64) -> [u32; 3] {
        let side = (self.height / 6).max(2) & !1;
        let span_x = u64::from(self.width.saturating_sub(side).max(1));
        let span_y = u64::from(self.height.saturating_sub(side).max(1));
        let bounce = |t: u64, span: u64| {
            let t = t % (span * 2);
            if t < span {
                t
            } else {
                span * 2 - t
            }
        };
        [
            bounce(frame * 3, span_x) as u32,
            bounce(frame * 2, span_y) as u32,
            side,
        ]
    }

    fn sample(&self, frame: u64, x: u32, y: u32) -> [u8; 3] {
        let (cx, cy) = (self.width as f32 / 2.0, self.height as f32 / 2.0);
        let sx = (cx + (x as f32 - cx) / self.zoom) as u32;
        let sy = (cy + (y as f32 - cy) / self.zoom) as u32;

        let [qx, qy, side] = self.square_at(frame);
        if sx >= qx && sx < qx + side && sy >= qy && sy < qy + side {
            return SQUARE;
        }
        let bar_width = u64::from((self.width / BARS.len() as u32).max(1));
        let shifted = u64::from(sx) + frame * SCROLL_PER_FRAME;
        BARS[((shifted / bar_width) % BARS.len() as u64) as usize]
    }

    /// Fills `planes` with the pattern for `frame`. Padding bytes are left alone.
    pub fn render(&self, frame: u64, planes: PlanesMut<'_>) {
        let (w, h) = (self.width as usize, self.height as usize);
        let (cw, ch) = (w / 2, h / 2);
        match planes {
            PlanesMut::Packed { format, data } => {
                let (luma, chroma) = data.split_at_mut(w * h);
                self.fill_luma(frame, luma, w);
                match format {
                    YuvFormat::I420 => {
                        let (u, v) = chroma.split_at_mut(cw * ch);
                        self.fill_planar_chroma(frame, u, v, cw);
                    }
                    YuvFormat::Nv12 => self.fill_interleaved_chroma(frame, chroma, w, false),
                    YuvFormat::Nv21 => self.fill_interleaved_chroma(frame, chroma, w, true),
                }
            }
            PlanesMut::Planar {
                y,
                y_stride,
                u,
                v,
                c_stride,
            } => {
                self.fill_luma(frame, y, y_stride);
                self.fill_planar_chroma(frame, u, v, c_stride);
            }
            PlanesMut::SemiPlanarVu {
                y,
                y_stride,
                vu,
                vu_stride,
            } => {
                self.fill_luma(frame, y, y_stride);
                self.fill_interleaved_chroma(frame, vu, vu_stride, true);
            }
        }
    }

    fn fill_luma(&self, frame: u64, plane: &mut [u8], stride: usize) {
        let w = self.width as usize;
        for (row, line) in plane.chunks_mut(stride).take(self.height as usize).enumerate() {
            for (col, px) in line.iter_mut().take(w).enumerate() {
                *px = self.sample(frame, col as u32, row as u32)[0];
            }
        }
    }

    fn fill_planar_chroma(&self, frame: u64, u: &mut [u8], v: &mut [u8], stride: usize) {
        let (cw, ch) = (self.width as usize / 2, self.height as usize / 2);
        for row in 0..ch {
            for col in 0..cw {
                let [_, cb, cr] = self.sample(frame, col as u32 * 2, row as u32 * 2);
                let index = row * stride + col;
                if let (Some(u), Some(v)) = (u.get_mut(index), v.get_mut(index)) {
                    *u = cb;
                    *v = cr;
                }
            }
        }
    }

    /// Interleaved chroma; the final pair may be cut short by the plane end.
    fn fill_interleaved_chroma(&self, frame: u64, plane: &mut [u8], stride: usize, v_first: bool) {
        let (cw, ch) = (self.width as usize / 2, self.height as usize / 2);
        for row in 0..ch {
            for col in 0..cw {
                let [_, cb, cr] = self.sample(frame, col as u32 * 2, row as u32 * 2);
                let (first, second) = if v_first { (cr, cb) } else { (cb, cr) };
                let index = row * stride + col * 2;
                if let Some(px) = plane.get_mut(index) {
                    *px = first;
                }
                if let Some(px) = plane.get_mut(index + 1) {
                    *px = second;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_nv21_carries_bars_and_square() {
        let sensor = SyntheticSensor::new(16, 12);
        let mut data = vec![0u8; 16 * 12 * 3 / 2];
        sensor.render(
            0,
            PlanesMut::Packed {
                format: YuvFormat::Nv21,
                data: &mut data,
            },
        );
        // Square starts at the origin, two pixels wide.
        assert_eq!(data[0], SQUARE[0]);
        // Bars are two pixels wide at this size; column 4 is the third bar.
        assert_eq!(data[4 + 16 * 4], BARS[2][0]);
        let vu = &data[16 * 12..];
        let row = 2 * 16;
        assert_eq!((vu[row + 4], vu[row + 5]), (BARS[2][2], BARS[2][1]));
    }

    #[test]
    fn padding_is_left_untouched() {
        let sensor = SyntheticSensor::new(4, 4);
        let mut y = vec![7u8; 8 * 4];
        let mut u = vec![7u8; 4 * 2];
        let mut v = vec![7u8; 4 * 2];
        sensor.render(
            1,
            PlanesMut::Planar {
                y: &mut y,
                y_stride: 8,
                u: &mut u,
                v: &mut v,
                c_stride: 4,
            },
        );
        assert!(y.chunks(8).all(|row| row[4..] == [7, 7, 7, 7]));
        assert!(u.chunks(4).all(|row| row[2..] == [7, 7]));
    }

    #[test]
    fn zoom_magnifies_around_centre() {
        let mut sensor = SyntheticSensor::new(64, 48);
        let before = sensor.sample(0, 0, 24);
        sensor.set_zoom(4.0);
        assert_eq!(sensor.zoom(), 4.0);
        let after = sensor.sample(0, 0, 24);
        assert_eq!(after, sensor.sample(0, 1, 24));
        assert_ne!(before, after);
        sensor.set_zoom(f32::NAN);
        assert_eq!(sensor.zoom(), 1.0);
    }
}
