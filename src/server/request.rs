//! Request body helpers for handlers.
//!
//! Failures come back as ready-to-send envelopes so a handler can return them
//! directly: `let input = match json_body(req) { Ok(v) => v, Err(body) => return Ok(body) };`

use log::warn;
use rouille::Request;
use serde::de::DeserializeOwned;
use std::io::Read;

use super::envelope::{StandardError, standard_error};

/// Read the body as UTF-8. `None` when absent, empty, already consumed or unreadable.
pub fn read_body(request: &Request) -> Option<String> {
    let mut data = request.data()?;
    let mut body = String::new();
    if let Err(e) = data.read_to_string(&mut body) {
        warn!("Failed to read request body: {}", e);
        return None;
    }
    if body.trim().is_empty() { None } else { Some(body) }
}

/// Deserialize the JSON body. Content-Type is not checked.
///
/// Missing body: `INVALID_REQUEST` / "Request body cannot be null".
/// Malformed body: `INVALID_REQUEST` with the parser message as details.
pub fn json_body<T: DeserializeOwned>(request: &Request) -> Result<T, String> {
    let Some(body) = read_body(request) else {
        return Err(standard_error(
            StandardError::InvalidRequest,
            Some("Request body cannot be null"),
        ));
    };

    serde_json::from_str(&body).map_err(|e| {
        warn!("Failed to deserialize request body: {}", e);
        standard_error(StandardError::InvalidRequest, Some(&e.to_string()))
    })
}
