use std::sync::Arc;

use frame_exchange::FrameSlot;
use tracing::{debug, warn};
use yuv_frame::{to_nv21, FrameError, FrameMeta, PlaneExtractor, Rotation};

use crate::image::{CaptureImage, ImageGuard};

/// Consumer of NV21 copies of published frames, such as a face detector.
pub trait Nv21Sink: Send {
    /// While this is `true` the frame is neither converted nor offered.
    fn is_busy(&self) -> bool;

    fn accept(&mut self, nv21: &[u8], width: u32, height: u32, rotation: Rotation);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandlerStats {
    pub delivered: u64,
    pub published: u64,
    pub dropped: u64,
    /// Published frames the sink was too busy to take.
    pub sink_skipped: u64,
}

pub struct FrameHandler {
    extractor: PlaneExtractor,
    slot: Arc<FrameSlot>,
    rotation: Rotation,
    mirrored: bool,
    nv21: Vec<u8>,
    sink: Option<Box<dyn Nv21Sink>>,
    stats: HandlerStats,
}

impl FrameHandler {
    pub fn new(slot: Arc<FrameSlot>) -> Self {
        Self {
            extractor: PlaneExtractor::new(),
            slot,
            rotation: Rotation::Deg0,
            mirrored: false,
            nv21: Vec::new(),
            sink: None,
            stats: HandlerStats::default(),
        }
    }

    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    pub fn set_orientation(&mut self, rotation: Rotation, mirrored: bool) {
        self.rotation = rotation;
        self.mirrored = mirrored;
    }

    pub fn set_nv21_sink(&mut self, sink: Option<Box<dyn Nv21Sink>>) {
        self.sink = sink;
    }

    pub fn stats(&self) -> HandlerStats {
        self.stats
    }

    /// Copies the image out, hands it back to the producer, then publishes.
    /// The image is released on every path; a frame that fails validation is
    /// dropped and the slot keeps its previous contents.
    pub fn on_image_available<I: CaptureImage>(&mut self, image: I) -> Result<FrameMeta, FrameError> {
        self.stats.delivered += 1;
        let result = self.handle(ImageGuard::new(image));
        match &result {
            Ok(_) => self.stats.published += 1,
            Err(err) => {
                self.stats.dropped += 1;
                warn!(error = %err, dropped = self.stats.dropped, "camera frame dropped");
            }
        }
        result
    }

    fn handle<I: CaptureImage>(&mut self, mut guard: ImageGuard<I>) -> Result<FrameMeta, FrameError> {
        let timestamp_ns = guard.image().timestamp_ns();
        let staged = guard
            .image()
            .frame()
            .and_then(|frame| self.extractor.stage(&frame));
        guard.release();
        staged?;

        let packed = self.extractor.pack()?;
        let meta = self
            .slot
            .publish(packed, self.rotation, self.mirrored, timestamp_ns)?;
        if let Some(sink) = self.sink.as_mut() {
            if sink.is_busy() {
                self.stats.sink_skipped += 1;
            } else {
                to_nv21(packed, &mut self.nv21)?;
                sink.accept(&self.nv21, meta.width, meta.height, meta.rotation);
            }
        }
        debug!(
            sequence = meta.sequence,
            width = meta.width,
            height = meta.height,
            format = %meta.format,
            "frame published"
        );
        Ok(meta)
    }
}
