use yuv_frame::Rotation;

use crate::backend::{Backend, SyntheticCamera};
use crate::image::ImageLayout;
use crate::orientation::display_rotation_camera2;
use crate::{CameraConfig, CaptureApi, Facing};

pub struct Camera2;

impl Backend for Camera2 {
    const API: CaptureApi = CaptureApi::Camera2;
    const THREAD_NAME: &'static str = "preview-camera2";

    fn image_layout(config: &CameraConfig) -> ImageLayout {
        ImageLayout::Yuv420 {
            row_padding: config.row_padding,
            chroma_pixel_stride: config.chroma_pixel_stride,
        }
    }

    fn buffer_count(config: &CameraConfig) -> usize {
        config.buffer_count
    }

    fn display_rotation(sensor_orientation: u32, display: Rotation, _facing: Facing) -> Rotation {
        display_rotation_camera2(sensor_orientation, display)
    }
}

pub type Camera2Camera = SyntheticCamera<Camera2>;
