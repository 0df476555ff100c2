use std::any::Any;
use std::panic;
use std::sync::Once;

use parking_lot::{const_mutex, Mutex};

/// The most recent serious failure, kept for display until cleared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StickyError {
    /// Pipeline stage that failed, e.g. `"camera"`, `"render"`, `"panic"`.
    pub stage: &'static str,
    pub message: String,
    /// Failures recorded since the last clear, this one included.
    pub count: u64,
}

static STICKY: Mutex<Option<StickyError>> = const_mutex(None);

pub fn record_error(stage: &'static str, message: impl Into<String>) {
    let message = message.into();
    tracing::error!(stage, sticky = true, "{message}");
    let mut sticky = STICKY.lock();
    let count = sticky.as_ref().map_or(0, |previous| previous.count) + 1;
    *sticky = Some(StickyError {
        stage,
        message,
        count,
    });
}

pub fn sticky_error() -> Option<StickyError> {
    STICKY.lock().clone()
}

/// Clears the sticky error and returns what it held.
pub fn take_sticky_error() -> Option<StickyError> {
    STICKY.lock().take()
}

/// Records panics from any thread as `"panic"` errors before the default
/// hook prints them. Installing twice is a no-op.
pub fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let thread = std::thread::current();
            let location = info
                .location()
                .map(|loc| format!("{}:{}", loc.file(), loc.line()))
                .unwrap_or_else(|| "<unknown>".to_string());
            record_error(
                "panic",
                format!(
                    "thread '{}' panicked at {location}: {}",
                    thread.name().unwrap_or("<unnamed>"),
                    payload_text(info.payload())
                ),
            );
            default_hook(info);
        }));
    });
}

fn payload_text(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sticky_error_counts_until_taken() {
        record_error("camera", "camera closed");
        record_error("render", String::from("surface lost"));
        let sticky = sticky_error().unwrap();
        assert_eq!(sticky.stage, "render");
        assert_eq!(sticky.message, "surface lost");
        assert!(sticky.count >= 2);

        assert_eq!(take_sticky_error(), Some(sticky));
        assert_eq!(sticky_error(), None);
        record_error("detector", "model exploded");
        assert_eq!(sticky_error().unwrap().count, 1);
        take_sticky_error();
    }

    #[test]
    fn panic_payloads_become_text() {
        let static_str: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        let other: Box<dyn Any + Send> = Box::new(7u32);
        assert_eq!(payload_text(&*static_str), "boom");
        assert_eq!(payload_text(&*owned), "owned boom");
        assert_eq!(payload_text(&*other), "non-string panic payload");
    }
}
