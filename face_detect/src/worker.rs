use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, warn};
use yuv_frame::Rotation;

use crate::{upright_size, Face, FaceDetector};

/// Latest detector output and the frame it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub faces: Vec<Face>,
    /// Upright size of the frame the faces were found in.
    pub width: u32,
    pub height: u32,
    pub orientation: Rotation,
    pub sequence: u64,
}

/// Latest-wins result cell shared with the render thread.
#[derive(Default)]
pub struct FaceResults {
    latest: Mutex<Option<Detection>>,
    last_error: Mutex<Option<String>>,
}

impl FaceResults {
    pub fn latest(&self) -> Option<Detection> {
        self.latest.lock().clone()
    }

    /// Most recent detector failure, kept until the next one.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn store(&self, detection: Detection) {
        *self.latest.lock() = Some(detection);
    }

    fn record_error(&self, message: String) {
        *self.last_error.lock() = Some(message);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub submitted: u64,
    pub dropped: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

struct Job {
    nv21: Vec<u8>,
    width: u32,
    height: u32,
    orientation: Rotation,
    sequence: u64,
}

struct Shared {
    sender: Mutex<Option<SyncSender<Job>>>,
    busy: AtomicBool,
    spare: Mutex<Vec<Vec<u8>>>,
    counters: Counters,
    results: Arc<FaceResults>,
}

/// Cheap submitter that can live inside the capture callback.
#[derive(Clone)]
pub struct DetectionHandle {
    shared: Arc<Shared>,
}

impl DetectionHandle {
    /// Queues a copy of `nv21` for detection. Returns `false` when the frame
    /// was dropped because the detector is busy or stopped.
    pub fn submit(&self, nv21: &[u8], width: u32, height: u32, orientation: Rotation) -> bool {
        let shared = &self.shared;
        if shared.busy.swap(true, Ordering::AcqRel) {
            shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let sender = shared.sender.lock();
        let Some(sender) = sender.as_ref() else {
            shared.busy.store(false, Ordering::Release);
            shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let mut buffer = shared.spare.lock().pop().unwrap_or_default();
        buffer.clear();
        buffer.extend_from_slice(nv21);
        let sequence = shared.counters.submitted.fetch_add(1, Ordering::Relaxed) + 1;
        let job = Job {
            nv21: buffer,
            width,
            height,
            orientation,
            sequence,
        };
        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job) | TrySendError::Disconnected(job)) => {
                shared.spare.lock().push(job.nv21);
                shared.busy.store(false, Ordering::Release);
                shared.counters.submitted.fetch_sub(1, Ordering::Relaxed);
                shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// `true` while a frame is in flight or the worker has stopped, i.e.
    /// when [`submit`](Self::submit) would drop the next frame.
    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::Acquire) || self.shared.sender.lock().is_none()
    }

    pub fn results(&self) -> &Arc<FaceResults> {
        &self.shared.results
    }
}

/// Owns the detector thread. At most one frame waits for it; frames that
/// arrive while it is busy are dropped at the submitter.
pub struct DetectionWorker {
    handle: DetectionHandle,
    thread: Option<JoinHandle<()>>,
}

impl DetectionWorker {
    pub fn spawn(detector: impl FaceDetector + 'static) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::sync_channel(1);
        let shared = Arc::new(Shared {
            sender: Mutex::new(Some(sender)),
            busy: AtomicBool::new(false),
            spare: Mutex::new(Vec::new()),
            counters: Counters::default(),
            results: Arc::new(FaceResults::default()),
        });
        let thread = thread::Builder::new().name("face-detect".to_string()).spawn({
            let shared = Arc::clone(&shared);
            move || run(detector, &receiver, &shared)
        })?;
        Ok(Self {
            handle: DetectionHandle { shared },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> DetectionHandle {
        self.handle.clone()
    }

    pub fn results(&self) -> Arc<FaceResults> {
        Arc::clone(&self.handle.shared.results)
    }

    pub fn stats(&self) -> WorkerStats {
        let counters = &self.handle.shared.counters;
        WorkerStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Acquire),
            failed: counters.failed.load(Ordering::Acquire),
        }
    }

    /// Stops accepting frames and waits for the job in progress.
    pub fn shutdown(&mut self) {
        self.handle.shared.sender.lock().take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("face detection thread panicked");
            }
        }
    }
}

impl Drop for DetectionWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(mut detector: impl FaceDetector, receiver: &Receiver<Job>, shared: &Shared) {
    while let Ok(job) = receiver.recv() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            detector.detect(&job.nv21, job.width, job.height, job.orientation)
        }));
        let succeeded = match outcome {
            Ok(Ok(faces)) => {
                let (width, height) = upright_size(job.width, job.height, job.orientation);
                debug!(sequence = job.sequence, faces = faces.len(), "detection finished");
                shared.results.store(Detection {
                    faces,
                    width,
                    height,
                    orientation: job.orientation,
                    sequence: job.sequence,
                });
                true
            }
            Ok(Err(err)) => {
                warn!(sequence = job.sequence, error = %err, "detection failed");
                shared.results.record_error(err.to_string());
                false
            }
            Err(payload) => {
                let message = format!("face detector panicked: {}", panic_message(&*payload));
                error!(sequence = job.sequence, "{message}");
                shared.results.record_error(message);
                false
            }
        };
        shared.spare.lock().push(job.nv21);
        shared.busy.store(false, Ordering::Release);
        // Counted after the busy flag clears so a caller that sees the count
        // can submit again.
        let counter = if succeeded {
            &shared.counters.completed
        } else {
            &shared.counters.failed
        };
        counter.fetch_add(1, Ordering::Release);
    }
    debug!("face detection thread exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
