#![forbid(unsafe_code)]
//! Latest-wins handoff of packed frames from the capture thread to the renderer.

use parking_lot::Mutex;
use yuv_frame::{check_dimensions, FrameError, FrameMeta, PackedYuvBuffer, Rotation, YuvFormat};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExchangeStats {
    pub published: u64,
    /// Frames delivered to a reader at least once.
    pub consumed: u64,
    /// Frames replaced before any reader saw them.
    pub overwritten: u64,
}

struct SlotState {
    meta: Option<FrameMeta>,
    buffer: PackedYuvBuffer,
    generation: u64,
    unread: bool,
    stats: ExchangeStats,
}

/// Single-slot mailbox. The lock is held only while bytes are copied in or
/// out; readers that need the data longer copy it through a [`FrameReader`].
pub struct FrameSlot {
    state: Mutex<SlotState>,
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                meta: None,
                buffer: PackedYuvBuffer::empty(),
                generation: 0,
                unread: false,
                stats: ExchangeStats::default(),
            }),
        }
    }

    /// Overwrites the slot with `packed`. Storage is reused while the frame
    /// dimensions stay the same.
    pub fn publish(
        &self,
        packed: &PackedYuvBuffer,
        rotation: Rotation,
        mirrored: bool,
        timestamp_ns: u64,
    ) -> Result<FrameMeta, FrameError> {
        check_dimensions(packed.width(), packed.height())?;
        let mut state = self.state.lock();
        let reallocated = state.buffer.copy_from(packed)?;
        if state.unread {
            state.stats.overwritten += 1;
        }
        state.generation += 1;
        state.unread = true;
        state.stats.published += 1;
        let meta = FrameMeta {
            width: packed.width(),
            height: packed.height(),
            format: packed.format(),
            rotation,
            mirrored,
            sequence: state.generation,
            timestamp_ns,
        };
        state.meta = Some(meta);
        drop(state);
        if reallocated {
            tracing::debug!(
                width = meta.width,
                height = meta.height,
                format = %meta.format,
                "frame slot resized"
            );
        }
        Ok(meta)
    }

    /// Runs `f` over the current frame while the slot is locked. The view
    /// must not escape `f`; `None` before the first publish.
    pub fn consume<R>(&self, f: impl FnOnce(FrameView<'_>) -> R) -> Option<R> {
        let mut state = self.state.lock();
        let meta = state.meta?;
        if state.unread {
            state.unread = false;
            state.stats.consumed += 1;
        }
        Some(f(FrameView {
            meta,
            buffer: &state.buffer,
        }))
    }

    pub fn latest_meta(&self) -> Option<FrameMeta> {
        self.state.lock().meta
    }

    pub fn stats(&self) -> ExchangeStats {
        self.state.lock().stats
    }

    /// Drops the stored frame; readers keep their last copy.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.meta = None;
        state.buffer = PackedYuvBuffer::empty();
        state.unread = false;
    }
}

/// Borrowed frame contents with metadata that always matches the bytes.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    meta: FrameMeta,
    buffer: &'a PackedYuvBuffer,
}

impl<'a> FrameView<'a> {
    pub fn meta(&self) -> FrameMeta {
        self.meta
    }

    pub fn buffer(&self) -> &'a PackedYuvBuffer {
        self.buffer
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn format(&self) -> YuvFormat {
        self.meta.format
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.buffer.as_bytes()
    }
}

/// Render-side copy of the slot. Copies out only when a newer frame has been
/// published, then serves views of its private buffer with the lock released.
#[derive(Default)]
pub struct FrameReader {
    buffer: PackedYuvBuffer,
    meta: Option<FrameMeta>,
    generation: u64,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the newest frame, or the last one copied when nothing new
    /// arrived. `None` until the first frame is seen.
    pub fn poll(&mut self, slot: &FrameSlot) -> Option<FrameView<'_>> {
        {
            let mut state = slot.state.lock();
            if state.generation != self.generation {
                if let Some(meta) = state.meta {
                    match self.buffer.copy_from(&state.buffer) {
                        Ok(_) => {
                            self.meta = Some(meta);
                            self.generation = state.generation;
                            if state.unread {
                                state.unread = false;
                                state.stats.consumed += 1;
                            }
                        }
                        Err(error) => {
                            tracing::warn!(%error, "frame copy-out failed; keeping previous frame");
                        }
                    }
                }
            }
        }
        let meta = self.meta?;
        Some(FrameView {
            meta,
            buffer: &self.buffer,
        })
    }

    /// Sequence number of the frame currently held.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
