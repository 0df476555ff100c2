use yuv_frame::{Rotation, YuvFormat};

use crate::backend::{Backend, SyntheticCamera};
use crate::image::ImageLayout;
use crate::orientation::display_orientation_legacy;
use crate::{CameraConfig, CaptureApi, Facing};

/// Callback buffers registered with the legacy camera.
pub const LEGACY_CALLBACK_BUFFERS: usize = 2;

pub struct Legacy;

impl Backend for Legacy {
    const API: CaptureApi = CaptureApi::Legacy;
    const THREAD_NAME: &'static str = "preview-legacy";

    fn image_layout(_config: &CameraConfig) -> ImageLayout {
        ImageLayout::Packed(YuvFormat::Nv21)
    }

    fn buffer_count(_config: &CameraConfig) -> usize {
        LEGACY_CALLBACK_BUFFERS
    }

    fn display_rotation(sensor_orientation: u32, display: Rotation, facing: Facing) -> Rotation {
        display_orientation_legacy(sensor_orientation, display, facing)
    }
}

pub type LegacyCamera = SyntheticCamera<Legacy>;
