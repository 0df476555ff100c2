use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use yuv_frame::{to_nv21, Rotation};

use crate::image::{ImageLayout, ImagePool};
use crate::orientation::{jpeg_orientation, ORIENTATION_UNKNOWN};
use crate::sensor::SyntheticSensor;
use crate::zoom::{CropRect, ZoomController, ZoomStep};
use crate::{CameraConfig, CameraDevice, CameraError, CaptureApi, Facing, FrameHandler, Picture};

pub trait Backend: Send + 'static {
    const API: CaptureApi;
    const THREAD_NAME: &'static str;

    fn image_layout(config: &CameraConfig) -> ImageLayout;
    fn buffer_count(config: &CameraConfig) -> usize;
    fn display_rotation(sensor_orientation: u32, display: Rotation, facing: Facing) -> Rotation;
}

struct PreviewThread {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

pub struct SyntheticCamera<B: Backend> {
    config: CameraConfig,
    facing: Facing,
    display: Rotation,
    device_orientation: i32,
    handler: Arc<Mutex<FrameHandler>>,
    sensor: Arc<Mutex<SyntheticSensor>>,
    zoom: ZoomController,
    pool: Option<ImagePool>,
    preview: Option<PreviewThread>,
    _backend: PhantomData<B>,
}

impl<B: Backend> SyntheticCamera<B> {
    pub fn new(config: CameraConfig, handler: Arc<Mutex<FrameHandler>>) -> Self {
        let sensor = SyntheticSensor::new(config.width, config.height);
        let zoom = ZoomController::new(
            CropRect::from_size(config.width, config.height),
            config.max_digital_zoom,
        );
        Self {
            facing: config.facing,
            display: config.display_rotation,
            device_orientation: ORIENTATION_UNKNOWN,
            handler,
            sensor: Arc::new(Mutex::new(sensor)),
            zoom,
            pool: None,
            preview: None,
            config,
            _backend: PhantomData,
        }
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn zoom_level(&self) -> u32 {
        self.zoom.level()
    }

    pub fn crop_region(&self) -> CropRect {
        self.zoom.crop_region()
    }

    fn apply_orientation(&self) {
        let rotation = self.display_rotation();
        self.handler
            .lock()
            .set_orientation(rotation, self.facing == Facing::Front);
    }
}

impl<B: Backend> CameraDevice for SyntheticCamera<B> {
    fn api(&self) -> CaptureApi {
        B::API
    }

    fn open(&mut self) -> Result<(), CameraError> {
        if self.pool.is_some() {
            return Ok(());
        }
        self.config.validate()?;
        let pool = ImagePool::new(
            self.config.width,
            self.config.height,
            B::image_layout(&self.config),
            B::buffer_count(&self.config),
        )?;
        info!(
            api = %B::API,
            facing = %self.facing,
            width = self.config.width,
            height = self.config.height,
            buffers = pool.capacity(),
            "camera opened"
        );
        self.pool = Some(pool);
        Ok(())
    }

    fn release(&mut self) {
        self.stop_preview();
        if self.pool.take().is_some() {
            self.zoom.apply(ZoomStep::To(0));
            self.sensor.lock().set_zoom(1.0);
            info!(api = %B::API, "camera released");
        }
    }

    fn start_preview(&mut self) -> Result<(), CameraError> {
        let pool = self.pool.clone().ok_or(CameraError::NotOpen)?;
        if self.preview.is_some() {
            return Ok(());
        }
        self.apply_orientation();

        let running = Arc::new(AtomicBool::new(true));
        let interval = Duration::from_secs_f64(1.0 / f64::from(self.config.fps));
        let thread = thread::Builder::new()
            .name(B::THREAD_NAME.to_string())
            .spawn({
                let running = Arc::clone(&running);
                let sensor = Arc::clone(&self.sensor);
                let handler = Arc::clone(&self.handler);
                move || capture_loop(&running, &pool, &sensor, &handler, interval)
            })?;
        self.preview = Some(PreviewThread { running, thread });
        info!(
            api = %B::API,
            fps = self.config.fps,
            rotation = self.display_rotation().degrees(),
            "preview started"
        );
        Ok(())
    }

    fn stop_preview(&mut self) {
        let Some(preview) = self.preview.take() else {
            return;
        };
        preview.running.store(false, Ordering::Release);
        if preview.thread.join().is_err() {
            warn!(api = %B::API, "capture thread panicked");
        }
        info!(api = %B::API, "preview stopped");
    }

    fn is_open(&self) -> bool {
        self.pool.is_some()
    }

    fn is_previewing(&self) -> bool {
        self.preview.is_some()
    }

    fn preview_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn facing(&self) -> Facing {
        self.facing
    }

    fn sensor_orientation(&self) -> u32 {
        self.config.sensor_orientation(self.facing)
    }

    fn display_rotation(&self) -> Rotation {
        B::display_rotation(self.sensor_orientation(), self.display, self.facing)
    }

    fn set_display_rotation(&mut self, rotation: Rotation) {
        self.display = rotation;
        if self.preview.is_some() {
            self.apply_orientation();
        }
    }

    fn set_device_orientation(&mut self, degrees: i32) {
        self.device_orientation = degrees;
    }

    fn set_zoom(&mut self, step: ZoomStep) -> Result<u32, CameraError> {
        if self.pool.is_none() {
            return Err(CameraError::NotOpen);
        }
        let level = self.zoom.apply(step);
        let factor = self.zoom.zoom_factor();
        self.sensor.lock().set_zoom(factor);
        debug!(level, factor, "zoom changed");
        Ok(level)
    }

    fn switch_camera(&mut self) -> Result<Facing, CameraError> {
        let was_previewing = self.preview.is_some();
        self.stop_preview();
        self.facing = self.facing.toggled();
        info!(facing = %self.facing, "camera switched");
        if was_previewing {
            self.start_preview()?;
        }
        Ok(self.facing)
    }

    fn take_picture(&mut self) -> Result<Picture, CameraError> {
        if self.pool.is_none() {
            return Err(CameraError::NotOpen);
        }
        let slot = Arc::clone(self.handler.lock().slot());
        let (meta, nv21) = slot
            .consume(|view| {
                let mut nv21 = Vec::new();
                to_nv21(view.buffer(), &mut nv21).map(|()| (view.meta(), nv21))
            })
            .ok_or(CameraError::NoFrame)??;
        let orientation =
            jpeg_orientation(self.sensor_orientation(), self.device_orientation, self.facing);
        info!(
            sequence = meta.sequence,
            width = meta.width,
            height = meta.height,
            orientation,
            "picture taken"
        );
        Ok(Picture {
            width: meta.width,
            height: meta.height,
            nv21,
            orientation,
            sequence: meta.sequence,
        })
    }
}

impl<B: Backend> Drop for SyntheticCamera<B> {
    fn drop(&mut self) {
        self.release();
    }
}

fn capture_loop(
    running: &AtomicBool,
    pool: &ImagePool,
    sensor: &Mutex<SyntheticSensor>,
    handler: &Mutex<FrameHandler>,
    interval: Duration,
) {
    let start = Instant::now();
    let mut frame = 0u64;
    while running.load(Ordering::Acquire) {
        let tick = Instant::now();
        let timestamp_ns = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        match pool.acquire(timestamp_ns) {
            Some(mut image) => {
                if let Some(planes) = image.planes_mut() {
                    sensor.lock().render(frame, planes);
                }
                // Drops are logged by the handler.
                let _ = handler.lock().on_image_available(image);
            }
            None => debug!(frame, "image pool exhausted, frame skipped"),
        }
        frame += 1;
        if let Some(rest) = interval.checked_sub(tick.elapsed()) {
            thread::sleep(rest);
        }
    }
}

#[cfg(test)]
mod tests {
    use frame_exchange::FrameSlot;
    use yuv_frame::YuvFormat;

    use super::*;
    use crate::{Camera2Camera, LegacyCamera};

    fn handler() -> (Arc<FrameSlot>, Arc<Mutex<FrameHandler>>) {
        let slot = Arc::new(FrameSlot::new());
        let handler = Arc::new(Mutex::new(FrameHandler::new(Arc::clone(&slot))));
        (slot, handler)
    }

    fn fast_config() -> CameraConfig {
        CameraConfig {
            width: 64,
            height: 48,
            fps: 500,
            row_padding: 16,
            ..CameraConfig::default()
        }
    }

    fn wait_for_frames(slot: &FrameSlot, count: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while slot.stats().published < count {
            assert!(Instant::now() < deadline, "no frames published");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn calls_before_open_fail() {
        let (_, handler) = handler();
        let mut camera = Camera2Camera::new(fast_config(), handler);
        assert!(matches!(camera.start_preview(), Err(CameraError::NotOpen)));
        assert!(matches!(camera.take_picture(), Err(CameraError::NotOpen)));
        assert!(matches!(camera.set_zoom(ZoomStep::In), Err(CameraError::NotOpen)));
    }

    #[test]
    fn camera2_preview_publishes_nv21_frames() {
        let (slot, handler) = handler();
        let mut camera = Camera2Camera::new(fast_config(), Arc::clone(&handler));
        camera.open().unwrap();
        assert!(matches!(camera.take_picture(), Err(CameraError::NoFrame)));
        camera.start_preview().unwrap();
        wait_for_frames(&slot, 3);

        let picture = camera.take_picture().unwrap();
        assert_eq!((picture.width, picture.height), (64, 48));
        assert_eq!(picture.nv21.len(), 64 * 48 * 3 / 2);
        // Device orientation never reported.
        assert_eq!(picture.orientation, 0);

        let meta = slot.latest_meta().unwrap();
        assert_eq!(meta.format, YuvFormat::Nv21);
        assert_eq!(meta.rotation, Rotation::Deg90);
        assert!(!meta.mirrored);

        camera.release();
        assert!(!camera.is_open());
        assert!(!camera.is_previewing());
        assert_eq!(handler.lock().stats().dropped, 0);
    }

    #[test]
    fn planar_camera2_images_become_i420() {
        let (slot, handler) = handler();
        let config = CameraConfig {
            chroma_pixel_stride: 1,
            ..fast_config()
        };
        let mut camera = Camera2Camera::new(config, handler);
        camera.open().unwrap();
        camera.start_preview().unwrap();
        wait_for_frames(&slot, 1);
        camera.stop_preview();
        assert_eq!(slot.latest_meta().unwrap().format, YuvFormat::I420);
    }

    #[test]
    fn legacy_switch_restarts_preview_mirrored() {
        let (slot, handler) = handler();
        let config = CameraConfig {
            api: CaptureApi::Legacy,
            ..fast_config()
        };
        let mut camera = LegacyCamera::new(config, handler);
        camera.open().unwrap();
        camera.start_preview().unwrap();
        assert_eq!(camera.switch_camera().unwrap(), Facing::Front);
        assert!(camera.is_previewing());
        assert_eq!(camera.sensor_orientation(), 270);

        let seen = slot.stats().published;
        wait_for_frames(&slot, seen + 2);
        let meta = slot.latest_meta().unwrap();
        assert!(meta.mirrored);
        assert_eq!(meta.rotation, Rotation::Deg90);

        camera.set_device_orientation(90);
        assert_eq!(camera.take_picture().unwrap().orientation, 180);
    }

    #[test]
    fn zoom_drives_crop_and_resets_on_release() {
        let (_, handler) = handler();
        let mut camera = Camera2Camera::new(fast_config(), handler);
        camera.open().unwrap();
        assert_eq!(camera.set_zoom(ZoomStep::To(crate::MAX_ZOOM)).unwrap(), 200);
        assert_eq!(camera.crop_region().width(), 16);
        camera.release();
        assert_eq!(camera.zoom_level(), 0);
    }
}
