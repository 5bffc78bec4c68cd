//! Small helpers shared by the server and the dispatcher.
//!
//! **Used by**: server::api (panic capture, uptime), core::dispatcher (panic capture)

use std::any::Any;
use std::time::Duration;

/// Extract a readable message from a caught panic payload.
///
/// `panic!("...")` with a literal yields `&str`, formatted panics yield `String`.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Format a duration as `HH:MM:SS`. Hours are not wrapped at 24.
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
