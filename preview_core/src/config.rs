use std::fs;
use std::path::{Path, PathBuf};

use capture::{CameraConfig, CaptureApi, Facing};
use serde::Deserialize;
use thiserror::Error;
use yuv_frame::Rotation;

use crate::logging;

const MAX_FPS: u32 = 240;
const HIGH_FPS: u32 = 120;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreviewConfig {
    pub camera: CameraSection,
    pub render: RenderSection,
    pub detector: DetectorSection,
    pub log: LogSection,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraSection {
    pub api: String,
    pub facing: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub row_padding: usize,
    pub chroma_pixel_stride: usize,
    pub buffer_count: usize,
    pub back_sensor_orientation: u32,
    pub front_sensor_orientation: u32,
    pub max_digital_zoom: f32,
    /// Display rotation in degrees.
    pub display_rotation: u32,
}

impl Default for CameraSection {
    fn default() -> Self {
        let camera = CameraConfig::default();
        Self {
            api: camera.api.as_str().to_string(),
            facing: camera.facing.as_str().to_string(),
            width: camera.width,
            height: camera.height,
            fps: camera.fps,
            row_padding: camera.row_padding,
            chroma_pixel_stride: camera.chroma_pixel_stride,
            buffer_count: camera.buffer_count,
            back_sensor_orientation: camera.back_sensor_orientation,
            front_sensor_orientation: camera.front_sensor_orientation,
            max_digital_zoom: camera.max_digital_zoom,
            display_rotation: camera.display_rotation.degrees(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderSection {
    pub scale_mode: String,
    pub clear_color: [f32; 4],
    pub window_size: [u32; 2],
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            scale_mode: "fit_center".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            window_size: [960, 720],
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorSection {
    pub enabled: bool,
    pub threshold: u8,
    pub step: u32,
}

impl Default for DetectorSection {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 230,
            step: 2,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogSection {
    /// `tracing` filter directive; `RUST_LOG` overrides it.
    pub filter: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: logging::DEFAULT_FILTER.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigValidation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl PreviewConfig {
    pub fn parse_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_toml(&text)
    }

    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::default();
        let camera = &self.camera;
        let api = CaptureApi::parse(&camera.api);
        if api.is_none() {
            validation
                .errors
                .push(format!("unknown camera api '{}'", camera.api));
        }
        if Facing::parse(&camera.facing).is_none() {
            validation
                .errors
                .push(format!("unknown camera facing '{}'", camera.facing));
        }
        if yuv_frame::check_dimensions(camera.width, camera.height).is_err() {
            validation.errors.push(format!(
                "camera size {}x{} must be non-zero and even",
                camera.width, camera.height
            ));
        }
        if camera.fps == 0 || camera.fps > MAX_FPS {
            validation
                .errors
                .push(format!("camera fps must be within 1..={MAX_FPS}"));
        } else if camera.fps > HIGH_FPS {
            validation
                .warnings
                .push(format!("camera fps {} is unusually high", camera.fps));
        }
        if !matches!(camera.chroma_pixel_stride, 1 | 2) {
            validation
                .errors
                .push("chroma_pixel_stride must be 1 or 2".to_string());
        }
        if camera.row_padding % 2 != 0 {
            validation
                .errors
                .push("row_padding must be even".to_string());
        }
        if camera.buffer_count == 0 {
            validation
                .errors
                .push("buffer_count must be at least 1".to_string());
        }
        for (name, degrees) in [
            ("back_sensor_orientation", camera.back_sensor_orientation),
            ("front_sensor_orientation", camera.front_sensor_orientation),
            ("display_rotation", camera.display_rotation),
        ] {
            if degrees % 90 != 0 || degrees >= 360 {
                validation
                    .errors
                    .push(format!("{name} must be 0, 90, 180 or 270"));
            }
        }
        if !camera.max_digital_zoom.is_finite() || camera.max_digital_zoom < 1.0 {
            validation
                .errors
                .push("max_digital_zoom must be finite and >= 1".to_string());
        }
        if api == Some(CaptureApi::Legacy)
            && (camera.row_padding != 0 || camera.chroma_pixel_stride != 2)
        {
            validation.warnings.push(
                "row_padding and chroma_pixel_stride are ignored by the legacy api".to_string(),
            );
        }

        let render = &self.render;
        if render
            .clear_color
            .iter()
            .any(|c| !c.is_finite() || !(0.0..=1.0).contains(c))
        {
            validation
                .errors
                .push("clear_color components must be within 0..=1".to_string());
        }
        if render.window_size.contains(&0) {
            validation
                .errors
                .push("window_size must be non-zero".to_string());
        }

        if self.detector.step == 0 {
            validation
                .errors
                .push("detector step must be at least 1".to_string());
        }

        if !logging::is_valid_filter(&self.log.filter) {
            validation
                .warnings
                .push(format!("log filter '{}' is invalid", self.log.filter));
        }
        validation
    }

    /// Camera settings for the capture backends. Fails with every error
    /// [`validate`](Self::validate) reports.
    pub fn camera_config(&self) -> Result<CameraConfig, ConfigError> {
        let validation = self.validate();
        if !validation.is_ok() {
            return Err(ConfigError::Invalid(validation.errors));
        }
        let camera = &self.camera;
        Ok(CameraConfig {
            api: CaptureApi::parse(&camera.api).unwrap_or_default(),
            facing: Facing::parse(&camera.facing).unwrap_or_default(),
            width: camera.width,
            height: camera.height,
            fps: camera.fps,
            row_padding: camera.row_padding,
            chroma_pixel_stride: camera.chroma_pixel_stride,
            buffer_count: camera.buffer_count,
            back_sensor_orientation: camera.back_sensor_orientation,
            front_sensor_orientation: camera.front_sensor_orientation,
            max_digital_zoom: camera.max_digital_zoom,
            display_rotation: Rotation::nearest(camera.display_rotation as i32),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = PreviewConfig::parse_toml("").unwrap();
        assert_eq!(config, PreviewConfig::default());
        assert!(config.validate().is_ok());
        let camera = config.camera_config().unwrap();
        assert_eq!(camera, CameraConfig::default());
    }

    #[test]
    fn sections_override_fields() {
        let config = PreviewConfig::parse_toml(
            r#"
            [camera]
            api = "legacy"
            facing = "front"
            width = 1280
            height = 720
            display_rotation = 270

            [render]
            scale_mode = "fit_xy"

            [log]
            filter = "debug"
            "#,
        )
        .unwrap();
        let camera = config.camera_config().unwrap();
        assert_eq!(camera.api, CaptureApi::Legacy);
        assert_eq!(camera.facing, Facing::Front);
        assert_eq!((camera.width, camera.height), (1280, 720));
        assert_eq!(camera.display_rotation, Rotation::Deg270);
        assert_eq!(camera.fps, 30);
        assert_eq!(config.render.scale_mode, "fit_xy");
        assert_eq!(config.log.filter, "debug");
        assert!(config.detector.enabled);
    }

    #[test]
    fn validation_collects_errors_and_warnings() {
        let config = PreviewConfig::parse_toml(
            r#"
            [camera]
            api = "camera3"
            width = 641
            fps = 180
            chroma_pixel_stride = 4
            display_rotation = 45

            [render]
            clear_color = [0.0, 0.0, 2.0, 1.0]

            [detector]
            step = 0
            "#,
        )
        .unwrap();
        let validation = config.validate();
        assert_eq!(validation.errors.len(), 6, "{:?}", validation.errors);
        assert_eq!(validation.warnings.len(), 1, "{:?}", validation.warnings);
        match config.camera_config() {
            Err(ConfigError::Invalid(errors)) => assert_eq!(errors, validation.errors),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn legacy_ignores_camera2_layout() {
        let config = PreviewConfig::parse_toml(
            r#"
            [camera]
            api = "legacy"
            row_padding = 32
            "#,
        )
        .unwrap();
        let validation = config.validate();
        assert!(validation.is_ok());
        assert_eq!(validation.warnings.len(), 1);
    }

    #[test]
    fn type_errors_are_parse_errors() {
        let err = PreviewConfig::parse_toml("[camera]\nwidth = \"wide\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = PreviewConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }
}
