#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use capture::{open_camera, CameraDevice, Facing, FrameHandler, Nv21Sink, ZoomStep};
use clap::{Parser, ValueEnum};
use face_detect::{
    BrightRegionDetector, DetectionHandle, DetectionWorker, FaceOverlay, FaceResults,
};
use frame_exchange::{FrameReader, FrameSlot};
use preview_core::config::PreviewConfig;
use preview_core::{logging, observability};
use render_wgpu::{DrawOutcome, ScaleMode, YuvRenderer};
use tracing::{debug, error, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowBuilder};
use yuv_frame::Rotation;

const EXIT_CONFIG: i32 = 10;
const EXIT_WINDOW: i32 = 11;
const EXIT_RENDER: i32 = 12;
const EXIT_CAMERA: i32 = 13;
const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "preview", version, about = "Camera YUV preview")]
struct Cli {
    /// TOML config file; defaults apply when omitted.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    api: Option<ApiArg>,

    #[arg(long, value_enum)]
    facing: Option<FacingArg>,

    /// Preview size, e.g. 1280x720.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    size: Option<(u32, u32)>,

    #[arg(long)]
    fps: Option<u32>,

    #[arg(long, value_enum)]
    scale_mode: Option<ScaleArg>,

    #[arg(long)]
    no_detector: bool,

    /// `tracing` filter directive, e.g. "info,capture=debug".
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check_config: bool,
}

#[derive(ValueEnum, Clone, Copy)]
enum ApiArg {
    Legacy,
    Camera2,
}

#[derive(ValueEnum, Clone, Copy)]
enum FacingArg {
    Back,
    Front,
}

#[derive(ValueEnum, Clone, Copy)]
enum ScaleArg {
    FitXy,
    FitCenter,
}

impl Cli {
    fn apply(&self, config: &mut PreviewConfig) {
        if let Some(api) = self.api {
            config.camera.api = match api {
                ApiArg::Legacy => "legacy",
                ApiArg::Camera2 => "camera2",
            }
            .to_string();
        }
        if let Some(facing) = self.facing {
            config.camera.facing = match facing {
                FacingArg::Back => Facing::Back,
                FacingArg::Front => Facing::Front,
            }
            .as_str()
            .to_string();
        }
        if let Some((width, height)) = self.size {
            config.camera.width = width;
            config.camera.height = height;
        }
        if let Some(fps) = self.fps {
            config.camera.fps = fps;
        }
        if let Some(scale) = self.scale_mode {
            config.render.scale_mode = match scale {
                ScaleArg::FitXy => ScaleMode::FitXy,
                ScaleArg::FitCenter => ScaleMode::FitCenter,
            }
            .as_str()
            .to_string();
        }
        if self.no_detector {
            config.detector.enabled = false;
        }
        if let Some(filter) = &self.log {
            config.log.filter = filter.clone();
        }
    }
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{value}'"))?;
    let width = w.trim().parse::<u32>().map_err(|err| err.to_string())?;
    let height = h.trim().parse::<u32>().map_err(|err| err.to_string())?;
    Ok((width, height))
}

fn create_window(title: &str, size: [u32; 2]) -> Result<(EventLoop<()>, Window), String> {
    let event_loop =
        EventLoop::new().map_err(|err| format!("event loop initialization failed: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(title)
        .with_inner_size(PhysicalSize::new(size[0], size[1]))
        .build(&event_loop)
        .map_err(|err| format!("window creation failed: {err}"))?;
    Ok((event_loop, window))
}

/// Part of the view the preview image covers, as `[x, y, w, h]`.
fn content_rect(view: (u32, u32), upright: (u32, u32), scale_mode: ScaleMode) -> [f32; 4] {
    let (vw, vh) = (view.0 as f32, view.1 as f32);
    let (fw, fh) = (upright.0 as f32, upright.1 as f32);
    if scale_mode == ScaleMode::FitXy || fw <= 0.0 || fh <= 0.0 || vh <= 0.0 {
        return [0.0, 0.0, vw, vh];
    }
    let scale = (vw / fw).min(vh / fh);
    let (w, h) = (fw * scale, fh * scale);
    [(vw - w) / 2.0, (vh - h) / 2.0, w, h]
}

fn overlay_rects(
    results: &FaceResults,
    view: (u32, u32),
    scale_mode: ScaleMode,
    mirrored: bool,
) -> Vec<[f32; 4]> {
    let Some(detection) = results.latest() else {
        return Vec::new();
    };
    let [x0, y0, w, h] = content_rect(view, (detection.width, detection.height), scale_mode);
    FaceOverlay::rects(&detection, (w as u32, h as u32), mirrored)
        .into_iter()
        .map(|[x, y, rw, rh]| [x + x0, y + y0, rw, rh])
        .collect()
}

/// Feeds published frames to the detection worker.
struct DetectorSink(DetectionHandle);

impl Nv21Sink for DetectorSink {
    fn is_busy(&self) -> bool {
        self.0.is_busy()
    }

    fn accept(&mut self, nv21: &[u8], width: u32, height: u32, rotation: Rotation) {
        self.0.submit(nv21, width, height, rotation);
    }
}

fn next_rotation(rotation: Rotation) -> Rotation {
    Rotation::nearest(rotation.degrees() as i32 + 90)
}

fn main() {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => match PreviewConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(EXIT_CONFIG);
            }
        },
        None => PreviewConfig::default(),
    };
    cli.apply(&mut config);

    logging::init(&config.log.filter);
    observability::install_panic_hook();

    let validation = config.validate();
    for warning in &validation.warnings {
        warn!("config: {warning}");
    }
    for message in &validation.errors {
        error!("config: {message}");
    }
    let Some(scale_mode) = ScaleMode::parse(&config.render.scale_mode) else {
        error!(scale_mode = %config.render.scale_mode, "config: unknown scale mode");
        std::process::exit(EXIT_CONFIG);
    };
    let camera_config = match config.camera_config() {
        Ok(camera_config) => camera_config,
        Err(_) => std::process::exit(EXIT_CONFIG),
    };
    if cli.check_config {
        info!("config ok");
        return;
    }

    let (event_loop, window) = match create_window("Camera preview", config.render.window_size) {
        Ok(result) => result,
        Err(err) => {
            error!("{err}");
            std::process::exit(EXIT_WINDOW);
        }
    };
    let window: &'static Window = Box::leak(Box::new(window));

    let mut renderer = match YuvRenderer::new(window, scale_mode) {
        Ok(renderer) => renderer,
        Err(err) => {
            error!("renderer init failed: {err}");
            std::process::exit(EXIT_RENDER);
        }
    };
    let [r, g, b, a] = config.render.clear_color.map(f64::from);
    renderer.set_clear_color_rgba(r, g, b, a);
    let main_window_id = window.id();

    let slot = Arc::new(FrameSlot::new());
    let handler = Arc::new(parking_lot::Mutex::new(FrameHandler::new(Arc::clone(&slot))));

    let mut detector = None;
    if config.detector.enabled {
        let bright = BrightRegionDetector {
            threshold: config.detector.threshold,
            step: config.detector.step,
            ..BrightRegionDetector::default()
        };
        match DetectionWorker::spawn(bright) {
            Ok(worker) => {
                handler
                    .lock()
                    .set_nv21_sink(Some(Box::new(DetectorSink(worker.handle()))));
                detector = Some(worker);
            }
            Err(err) => warn!("face detection disabled: {err}"),
        }
    }

    let mut camera: Box<dyn CameraDevice> = open_camera(camera_config, Arc::clone(&handler));
    if let Err(err) = camera.open().and_then(|()| camera.start_preview()) {
        error!("camera start failed: {err}");
        std::process::exit(EXIT_CAMERA);
    }

    let mut reader = FrameReader::new();
    let mut scale_mode = scale_mode;
    let mut display = Rotation::nearest(config.camera.display_rotation as i32);
    let mut last_stats = Instant::now();
    let mut last_detector_error: Option<String> = None;

    if let Err(err) = event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        match event {
            Event::WindowEvent { event, window_id } if window_id == main_window_id => match event {
                WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::Resized(size) => renderer.resize(size),
                WindowEvent::ScaleFactorChanged { .. } => {
                    renderer.resize(window.inner_size());
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    let PhysicalKey::Code(code) = event.physical_key else {
                        return;
                    };
                    if event.state != ElementState::Pressed || event.repeat {
                        return;
                    }
                    match code {
                        KeyCode::Escape => elwt.exit(),
                        KeyCode::Space => match camera.take_picture() {
                            Ok(picture) => info!(
                                width = picture.width,
                                height = picture.height,
                                bytes = picture.nv21.len(),
                                orientation = picture.orientation,
                                "picture captured"
                            ),
                            Err(err) => warn!("take picture failed: {err}"),
                        },
                        KeyCode::KeyC => {
                            if let Err(err) = camera.switch_camera() {
                                observability::record_error(
                                    "camera",
                                    format!("camera switch failed: {err}"),
                                );
                            }
                        }
                        KeyCode::Equal | KeyCode::NumpadAdd => {
                            if let Err(err) = camera.set_zoom(ZoomStep::In) {
                                warn!("zoom failed: {err}");
                            }
                        }
                        KeyCode::Minus | KeyCode::NumpadSubtract => {
                            if let Err(err) = camera.set_zoom(ZoomStep::Out) {
                                warn!("zoom failed: {err}");
                            }
                        }
                        KeyCode::KeyR => {
                            display = next_rotation(display);
                            camera.set_display_rotation(display);
                            let degrees = display.degrees();
                            info!(degrees, "display rotated");
                        }
                        KeyCode::KeyM => {
                            scale_mode = match scale_mode {
                                ScaleMode::FitXy => ScaleMode::FitCenter,
                                ScaleMode::FitCenter => ScaleMode::FitXy,
                            };
                            renderer.set_scale_mode(scale_mode);
                            info!(scale_mode = scale_mode.as_str(), "scale mode changed");
                        }
                        _ => {}
                    }
                }
                WindowEvent::RedrawRequested => {
                    if let Some(worker) = &detector {
                        let results = worker.results();
                        let size = renderer.size();
                        let mirrored = camera.facing() == Facing::Front;
                        let rects =
                            overlay_rects(&results, (size.width, size.height), scale_mode, mirrored);
                        renderer.set_overlay_rects(&rects);
                        let latest_error = results.last_error();
                        if latest_error.is_some() && latest_error != last_detector_error {
                            if let Some(message) = &latest_error {
                                observability::record_error("detector", message.clone());
                            }
                            last_detector_error = latest_error;
                        }
                    }
                    match renderer.draw(reader.poll(&slot)) {
                        Ok(DrawOutcome::Skipped(err)) => debug!("frame skipped: {err}"),
                        Ok(_) => {}
                        Err(err) => {
                            observability::record_error("render", format!("render failed: {err}"));
                            elwt.exit();
                        }
                    }
                    if last_stats.elapsed() >= STATS_INTERVAL {
                        last_stats = Instant::now();
                        let exchange = slot.stats();
                        let capture = handler.lock().stats();
                        info!(
                            published = exchange.published,
                            consumed = exchange.consumed,
                            overwritten = exchange.overwritten,
                            dropped = capture.dropped,
                            detector_skipped = capture.sink_skipped,
                            "preview stats"
                        );
                        if let Some(worker) = &detector {
                            let stats = worker.stats();
                            info!(
                                submitted = stats.submitted,
                                skipped = stats.dropped,
                                completed = stats.completed,
                                failed = stats.failed,
                                "detector stats"
                            );
                        }
                    }
                }
                _ => {}
            },
            Event::AboutToWait => renderer.request_redraw(),
            Event::LoopExiting => {
                camera.release();
                if let Some(mut worker) = detector.take() {
                    worker.shutdown();
                }
                renderer.release();
                if let Some(sticky) = observability::sticky_error() {
                    warn!(
                        stage = sticky.stage,
                        errors = sticky.count,
                        last_error = %sticky.message,
                        "exiting with error"
                    );
                }
            }
            _ => {}
        }
    }) {
        error!("event loop exited with error: {err}");
        std::process::exit(EXIT_WINDOW);
    }
}

#[cfg(test)]
mod tests {
    use face_detect::{rotate_rect, upright_size, Face};
    use render_wgpu::geometry::transform_point;
    use render_wgpu::RenderGeometry;

    use super::*;

    #[test]
    fn size_argument_parses() {
        assert_eq!(parse_size("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_size("640X480"), Ok((640, 480)));
        assert!(parse_size("640").is_err());
        assert!(parse_size("ax480").is_err());
    }

    #[test]
    fn cli_overrides_config() {
        let cli = Cli::parse_from([
            "preview",
            "--api",
            "legacy",
            "--facing",
            "front",
            "--size",
            "320x240",
            "--scale-mode",
            "fit-xy",
            "--no-detector",
        ]);
        let mut config = PreviewConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.camera.api, "legacy");
        assert_eq!(config.camera.facing, "front");
        assert_eq!((config.camera.width, config.camera.height), (320, 240));
        assert_eq!(config.render.scale_mode, "fit_xy");
        assert!(!config.detector.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn content_rect_letterboxes() {
        assert_eq!(
            content_rect((200, 100), (100, 100), ScaleMode::FitCenter),
            [50.0, 0.0, 100.0, 100.0]
        );
        assert_eq!(
            content_rect((200, 100), (100, 100), ScaleMode::FitXy),
            [0.0, 0.0, 200.0, 100.0]
        );
    }

    #[test]
    fn no_detection_means_no_overlay() {
        let results = FaceResults::default();
        assert!(overlay_rects(&results, (200, 100), ScaleMode::FitCenter, false).is_empty());
    }

    #[test]
    fn overlay_tracks_the_drawn_image_for_every_orientation() {
        let (width, height) = (640u32, 480u32);
        let [px, py] = [100.0f32, 50.0];
        for rotation in [
            Rotation::Deg0,
            Rotation::Deg90,
            Rotation::Deg180,
            Rotation::Deg270,
        ] {
            for mirrored in [false, true] {
                let m = RenderGeometry {
                    view: [width, height],
                    frame: [width, height],
                    rotation,
                    mirrored,
                    scale_mode: ScaleMode::FitXy,
                }
                .matrix();
                // The quad spans clip space with texture row 0 at y = -1.
                let quad = [
                    2.0 * px / width as f32 - 1.0,
                    2.0 * py / height as f32 - 1.0,
                ];
                let [cx, cy] = transform_point(&m, quad);
                let drawn = [(cx + 1.0) / 2.0, (1.0 - cy) / 2.0];

                let upright = upright_size(width, height, rotation);
                let face = Face {
                    rect: rotate_rect([px, py, 0.0, 0.0], width, height, rotation),
                    landmarks: [0.0; 10],
                };
                let [x, y, _, _] = FaceOverlay::map(&face, upright, upright, mirrored);
                let overlay = [x / upright.0 as f32, y / upright.1 as f32];

                for (a, b) in drawn.iter().zip(overlay) {
                    assert!(
                        (a - b).abs() < 1e-4,
                        "{rotation:?} mirrored={mirrored}: drawn {drawn:?} overlay {overlay:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn rotation_cycles() {
        assert_eq!(next_rotation(Rotation::Deg270), Rotation::Deg0);
        assert_eq!(next_rotation(Rotation::Deg90), Rotation::Deg180);
    }
}
