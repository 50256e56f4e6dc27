use std::any::Any;

/// Extracts a printable message from a panic payload caught with
/// [`catch_unwind`](std::panic::catch_unwind).
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
