use yuv_frame::Rotation;

pub type Mat4 = [[f32; 4]; 4];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScaleMode {
    /// Stretch the frame over the whole view.
    #[default]
    FitXy,
    /// Keep the displayed aspect ratio and letterbox the rest.
    FitCenter,
}

impl ScaleMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fit_xy" | "fitxy" | "stretch" => Some(ScaleMode::FitXy),
            "fit_center" | "fitcenter" | "letterbox" => Some(ScaleMode::FitCenter),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScaleMode::FitXy => "fit_xy",
            ScaleMode::FitCenter => "fit_center",
        }
    }
}

/// Per-frame placement of the preview quad in clip space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderGeometry {
    pub view: [u32; 2],
    pub frame: [u32; 2],
    pub rotation: Rotation,
    pub mirrored: bool,
    pub scale_mode: ScaleMode,
}

impl RenderGeometry {
    /// Column-major transform: fit scale, then the vertical flip from texture
    /// rows to clip space, then the display rotation (counter-clockwise in
    /// clip space). Mirroring flips x last, so it is horizontal on screen for
    /// every rotation.
    pub fn matrix(&self) -> Mat4 {
        let [sx, sy] = self.fit_scale();
        let flipped = mul(&scale(1.0, -1.0), &scale(sx, sy));
        let m = mul(&rotation(self.rotation), &flipped);
        if self.mirrored {
            mul(&scale(-1.0, 1.0), &m)
        } else {
            m
        }
    }

    /// Scale applied before rotation, so axes are swapped back for quarter
    /// turns.
    fn fit_scale(&self) -> [f32; 2] {
        match self.scale_mode {
            ScaleMode::FitXy => [1.0, 1.0],
            ScaleMode::FitCenter => {
                let [vw, vh] = self.view;
                let [mut fw, mut fh] = self.frame;
                if vw == 0 || vh == 0 || fw == 0 || fh == 0 {
                    return [1.0, 1.0];
                }
                if self.rotation.swaps_axes() {
                    std::mem::swap(&mut fw, &mut fh);
                }
                let view_aspect = vw as f32 / vh as f32;
                let frame_aspect = fw as f32 / fh as f32;
                let (out_x, out_y) = if frame_aspect > view_aspect {
                    (1.0, view_aspect / frame_aspect)
                } else {
                    (frame_aspect / view_aspect, 1.0)
                };
                if self.rotation.swaps_axes() {
                    [out_y, out_x]
                } else {
                    [out_x, out_y]
                }
            }
        }
    }
}

pub fn identity() -> Mat4 {
    scale(1.0, 1.0)
}

fn scale(x: f32, y: f32) -> Mat4 {
    [
        [x, 0.0, 0.0, 0.0],
        [0.0, y, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

fn rotation(rotation: Rotation) -> Mat4 {
    // Exact values for quarter turns; sin/cos would leave 1e-8 residue.
    let (c, s) = match rotation {
        Rotation::Deg0 => (1.0, 0.0),
        Rotation::Deg90 => (0.0, 1.0),
        Rotation::Deg180 => (-1.0, 0.0),
        Rotation::Deg270 => (0.0, -1.0),
    };
    [
        [c, s, 0.0, 0.0],
        [-s, c, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// `a * b` for column-major matrices.
fn mul(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [[0.0f32; 4]; 4];
    for (col, out_col) in out.iter_mut().enumerate() {
        for (row, value) in out_col.iter_mut().enumerate() {
            *value = (0..4).map(|k| a[k][row] * b[col][k]).sum();
        }
    }
    out
}

pub fn transform_point(m: &Mat4, point: [f32; 2]) -> [f32; 2] {
    let [x, y] = point;
    [
        m[0][0] * x + m[1][0] * y + m[3][0],
        m[0][1] * x + m[1][1] * y + m[3][1],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(rotation: Rotation, mirrored: bool, scale_mode: ScaleMode) -> RenderGeometry {
        RenderGeometry {
            view: [100, 100],
            frame: [100, 100],
            rotation,
            mirrored,
            scale_mode,
        }
    }

    #[test]
    fn square_fit_xy_is_only_the_vertical_flip() {
        let m = geometry(Rotation::Deg0, false, ScaleMode::FitXy).matrix();
        assert_eq!(m, scale(1.0, -1.0));
    }

    #[test]
    fn mirroring_negates_x() {
        let m = geometry(Rotation::Deg0, true, ScaleMode::FitXy).matrix();
        assert_eq!(transform_point(&m, [1.0, 0.0]), [-1.0, 0.0]);
        assert_eq!(transform_point(&m, [0.0, 1.0]), [0.0, -1.0]);
    }

    #[test]
    fn mirroring_is_horizontal_for_every_rotation() {
        for rotation in [
            Rotation::Deg0,
            Rotation::Deg90,
            Rotation::Deg180,
            Rotation::Deg270,
        ] {
            let plain = geometry(rotation, false, ScaleMode::FitXy).matrix();
            let mirrored = geometry(rotation, true, ScaleMode::FitXy).matrix();
            for point in [[0.5, 0.25], [-0.75, 0.5], [1.0, -1.0]] {
                let [x, y] = transform_point(&plain, point);
                assert_eq!(transform_point(&mirrored, point), [-x, y], "{rotation:?}");
            }
        }
    }

    #[test]
    fn quarter_turn_maps_x_to_y() {
        let m = geometry(Rotation::Deg90, false, ScaleMode::FitXy).matrix();
        assert_eq!(transform_point(&m, [1.0, 0.0]), [0.0, 1.0]);
        // The flipped y axis lands on +x after the turn.
        assert_eq!(transform_point(&m, [0.0, 1.0]), [1.0, 0.0]);
    }

    #[test]
    fn fit_center_letterboxes_wide_frames() {
        let geometry = RenderGeometry {
            view: [100, 100],
            frame: [200, 100],
            rotation: Rotation::Deg0,
            mirrored: false,
            scale_mode: ScaleMode::FitCenter,
        };
        let m = geometry.matrix();
        assert_eq!(transform_point(&m, [1.0, 1.0]), [1.0, -0.5]);
    }

    #[test]
    fn fit_center_uses_rotated_aspect() {
        // 640x480 rotated a quarter turn displays as 480x640 in a 480x640 view.
        let geometry = RenderGeometry {
            view: [480, 640],
            frame: [640, 480],
            rotation: Rotation::Deg90,
            mirrored: false,
            scale_mode: ScaleMode::FitCenter,
        };
        let m = geometry.matrix();
        let [x, y] = transform_point(&m, [1.0, 1.0]);
        assert!((x.abs() - 1.0).abs() < 1e-6);
        assert!((y.abs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn identity_is_neutral_under_mul() {
        let m = geometry(Rotation::Deg270, true, ScaleMode::FitXy).matrix();
        assert_eq!(mul(&identity(), &m), m);
        assert_eq!(mul(&m, &identity()), m);
    }
}
