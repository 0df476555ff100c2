#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use yuv_frame::{check_dimensions, FrameError, Rotation};

mod backend;
mod camera2;
pub mod handler;
pub mod image;
mod legacy;
pub mod orientation;
pub mod sensor;
pub mod zoom;

pub use backend::{Backend, SyntheticCamera};
pub use camera2::{Camera2, Camera2Camera};
pub use handler::{FrameHandler, HandlerStats, Nv21Sink};
pub use image::{CaptureImage, ImageGuard, ImageLayout, ImagePool, PooledImage};
pub use legacy::{Legacy, LegacyCamera, LEGACY_CALLBACK_BUFFERS};
pub use zoom::{CropRect, ZoomController, ZoomStep, MAX_ZOOM};

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera is not open")]
    NotOpen,
    #[error("no preview frame available")]
    NoFrame,
    #[error("invalid camera configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("failed to spawn capture thread: {0}")]
    Thread(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Facing {
    #[default]
    Back,
    Front,
}

impl Facing {
    pub fn as_str(self) -> &'static str {
        match self {
            Facing::Back => "back",
            Facing::Front => "front",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "back" | "rear" => Some(Facing::Back),
            "front" => Some(Facing::Front),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Facing::Back => Facing::Front,
            Facing::Front => Facing::Back,
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which platform camera API a device models.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureApi {
    /// Packed NV21 preview callbacks.
    Legacy,
    /// `YUV_420_888` images from an image reader.
    #[default]
    Camera2,
}

impl CaptureApi {
    pub fn as_str(self) -> &'static str {
        match self {
            CaptureApi::Legacy => "legacy",
            CaptureApi::Camera2 => "camera2",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "legacy" | "camera1" => Some(CaptureApi::Legacy),
            "camera2" => Some(CaptureApi::Camera2),
            _ => None,
        }
    }
}

impl fmt::Display for CaptureApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    pub api: CaptureApi,
    pub facing: Facing,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Extra bytes per luma row in camera2 images.
    pub row_padding: usize,
    /// Chroma pixel stride of camera2 images: 1 (planar) or 2 (interleaved).
    pub chroma_pixel_stride: usize,
    /// Images the camera2 reader may hold at once.
    pub buffer_count: usize,
    pub back_sensor_orientation: u32,
    pub front_sensor_orientation: u32,
    pub max_digital_zoom: f32,
    pub display_rotation: Rotation,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            api: CaptureApi::default(),
            facing: Facing::default(),
            width: 640,
            height: 480,
            fps: 30,
            row_padding: 0,
            chroma_pixel_stride: 2,
            buffer_count: 3,
            back_sensor_orientation: 90,
            front_sensor_orientation: 270,
            max_digital_zoom: 4.0,
            display_rotation: Rotation::Deg0,
        }
    }
}

impl CameraConfig {
    pub fn sensor_orientation(&self, facing: Facing) -> u32 {
        match facing {
            Facing::Back => self.back_sensor_orientation,
            Facing::Front => self.front_sensor_orientation,
        }
    }

    pub fn validate(&self) -> Result<(), CameraError> {
        check_dimensions(self.width, self.height)?;
        if self.fps == 0 {
            return Err(CameraError::InvalidConfig("fps must be positive".into()));
        }
        if !matches!(self.chroma_pixel_stride, 1 | 2) {
            return Err(CameraError::InvalidConfig(format!(
                "chroma pixel stride {} (expected 1 or 2)",
                self.chroma_pixel_stride
            )));
        }
        if self.buffer_count == 0 {
            return Err(CameraError::InvalidConfig(
                "buffer count must be at least 1".into(),
            ));
        }
        if self.row_padding % 2 != 0 {
            return Err(CameraError::InvalidConfig(format!(
                "row padding {} must be even",
                self.row_padding
            )));
        }
        for orientation in [self.back_sensor_orientation, self.front_sensor_orientation] {
            if orientation % 90 != 0 || orientation >= 360 {
                return Err(CameraError::InvalidConfig(format!(
                    "sensor orientation {orientation} is not a quarter turn"
                )));
            }
        }
        Ok(())
    }
}

/// A still taken from the preview stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Picture {
    pub width: u32,
    pub height: u32,
    pub nv21: Vec<u8>,
    /// Degrees the picture should be rotated to read upright.
    pub orientation: u32,
    pub sequence: u64,
}

/// A camera the preview can drive. Frames flow out through the
/// [`FrameHandler`] the device was built with.
pub trait CameraDevice: Send {
    fn api(&self) -> CaptureApi;
    fn open(&mut self) -> Result<(), CameraError>;
    /// Stops the preview and frees the image buffers. Safe to call twice.
    fn release(&mut self);
    fn start_preview(&mut self) -> Result<(), CameraError>;
    fn stop_preview(&mut self);
    fn is_open(&self) -> bool;
    fn is_previewing(&self) -> bool;
    fn preview_size(&self) -> (u32, u32);
    fn facing(&self) -> Facing;
    fn sensor_orientation(&self) -> u32;
    /// Rotation applied to preview frames for the current display rotation.
    fn display_rotation(&self) -> Rotation;
    fn set_display_rotation(&mut self, rotation: Rotation);
    /// Raw device orientation in degrees, or
    /// [`orientation::ORIENTATION_UNKNOWN`].
    fn set_device_orientation(&mut self, degrees: i32);
    fn set_zoom(&mut self, step: ZoomStep) -> Result<u32, CameraError>;
    fn switch_camera(&mut self) -> Result<Facing, CameraError>;
    fn take_picture(&mut self) -> Result<Picture, CameraError>;
}

/// Builds the backend named by `config.api`.
pub fn open_camera(
    config: CameraConfig,
    handler: Arc<Mutex<FrameHandler>>,
) -> Box<dyn CameraDevice> {
    match config.api {
        CaptureApi::Legacy => Box::new(LegacyCamera::new(config, handler)),
        CaptureApi::Camera2 => Box::new(Camera2Camera::new(config, handler)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for api in [CaptureApi::Legacy, CaptureApi::Camera2] {
            assert_eq!(CaptureApi::parse(api.as_str()), Some(api));
        }
        assert_eq!(Facing::parse(" Rear "), Some(Facing::Back));
        assert_eq!(Facing::Back.toggled(), Facing::Front);
        assert_eq!(CaptureApi::parse("camera3"), None);
    }

    #[test]
    fn default_config_is_valid() {
        CameraConfig::default().validate().unwrap();
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let bad = [
            CameraConfig {
                width: 641,
                ..CameraConfig::default()
            },
            CameraConfig {
                fps: 0,
                ..CameraConfig::default()
            },
            CameraConfig {
                chroma_pixel_stride: 3,
                ..CameraConfig::default()
            },
            CameraConfig {
                front_sensor_orientation: 45,
                ..CameraConfig::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    #[test]
    fn factory_picks_backend() {
        let slot = Arc::new(frame_exchange::FrameSlot::new());
        let handler = Arc::new(Mutex::new(FrameHandler::new(slot)));
        let legacy = open_camera(
            CameraConfig {
                api: CaptureApi::Legacy,
                ..CameraConfig::default()
            },
            Arc::clone(&handler),
        );
        assert_eq!(legacy.api(), CaptureApi::Legacy);
        let camera2 = open_camera(CameraConfig::default(), handler);
        assert_eq!(camera2.api(), CaptureApi::Camera2);
        assert!(!camera2.is_open());
    }
}
