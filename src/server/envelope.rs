//! Response envelope codec.
//!
//! Every response body the server writes has the same shape:
//!
//! ```json
//! {"success":true,"data":{...},"error":null,"timestamp":"2026-01-01T00:00:00.000000Z"}
//! {"success":false,"data":null,"error":{"code":"ROUTE_NOT_FOUND","message":"...","details":null},"timestamp":"..."}
//! ```
//!
//! Builders return the serialized string directly, since handlers hand the
//! final body back to the connection layer. Serialization never fails from
//! the caller's point of view: if `data` cannot be encoded, a hand-built
//! `SERIALIZATION_ERROR` envelope is returned instead.

use chrono::{SecondsFormat, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error code used when a route lookup misses
pub const ROUTE_NOT_FOUND: &str = "ROUTE_NOT_FOUND";

/// Error code of the hand-built fallback envelope
pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";

/// Error part of an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

/// Uniform response wrapper.
///
/// `data` is set only when `success` is true, `error` only when it is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<ApiError>,
    pub timestamp: String,
}

impl Envelope {
    /// Success envelope stamped with the current time
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: timestamp(),
        }
    }

    /// Error envelope stamped with the current time
    pub fn err(code: &str, message: &str, details: Option<&str>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.to_string(),
                details: details.map(str::to_string),
            }),
            timestamp: timestamp(),
        }
    }

    /// Parse a serialized envelope (client side, tests).
    pub fn parse(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }

    /// Error code, if this is an error envelope
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }

    /// Serialize, falling back to the hand-built error body on failure.
    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize response: {}", e);
                serialization_fallback()
            }
        }
    }
}

/// Standard errors with stable machine-readable codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardError {
    PlayerNotFound,
    SubsystemNotFound,
    InvalidRequest,
    MissingParameter,
    CommandFailed,
    InternalError,
    NotInPlayMode,
    Unknown,
}

impl StandardError {
    pub fn code(&self) -> &'static str {
        match self {
            StandardError::PlayerNotFound => "PLAYER_NOT_FOUND",
            StandardError::SubsystemNotFound => "SUBSYSTEM_NOT_FOUND",
            StandardError::InvalidRequest => "INVALID_REQUEST",
            StandardError::MissingParameter => "MISSING_PARAMETER",
            StandardError::CommandFailed => "COMMAND_FAILED",
            StandardError::InternalError => "INTERNAL_ERROR",
            StandardError::NotInPlayMode => "NOT_IN_PLAY_MODE",
            StandardError::Unknown => "UNKNOWN_ERROR",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            StandardError::PlayerNotFound => "Player controller not found in scene",
            StandardError::SubsystemNotFound => "Required subsystem not found in scene",
            StandardError::InvalidRequest => "Request body is invalid or malformed",
            StandardError::MissingParameter => "Required parameter is missing",
            StandardError::CommandFailed => "Command execution failed",
            StandardError::InternalError => "An internal server error occurred",
            StandardError::NotInPlayMode => "Host is not in play mode",
            StandardError::Unknown => "An unknown error occurred",
        }
    }
}

/// Current UTC time, RFC 3339 with microseconds and `Z` suffix
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Serialized success envelope wrapping `data`.
pub fn success<T: Serialize + ?Sized>(data: &T) -> String {
    match serde_json::to_value(data) {
        Ok(value) => Envelope::ok(value).to_json(),
        Err(e) => {
            error!("Failed to serialize response data: {}", e);
            serialization_fallback()
        }
    }
}

/// Serialized error envelope.
pub fn error(code: &str, message: &str, details: Option<&str>) -> String {
    Envelope::err(code, message, details).to_json()
}

/// Serialized standard error; `details` is attached without touching code or message.
pub fn standard_error(kind: StandardError, details: Option<&str>) -> String {
    error(kind.code(), kind.message(), details)
}

// Built by hand so it cannot fail a second time
fn serialization_fallback() -> String {
    format!(
        r#"{{"success":false,"data":null,"error":{{"code":"{}","message":"Failed to serialize response","details":null}},"timestamp":"{}"}}"#,
        SERIALIZATION_ERROR,
        timestamp()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_success_shape() {
        let body = success(&json!({"status": "healthy", "port": 8091}));
        let raw: Value = serde_json::from_str(&body).unwrap();

        assert_eq!(raw["success"], true);
        assert_eq!(raw["data"]["status"], "healthy");
        assert_eq!(raw["data"]["port"], 8091);
        // error is present and explicitly null
        assert!(raw.as_object().unwrap().contains_key("error"));
        assert!(raw["error"].is_null());
    }

    #[test]
    fn test_success_plain_string() {
        let env = Envelope::parse(&success("hello")).unwrap();
        assert!(env.success);
        assert_eq!(env.data, Some(json!("hello")));
        assert_eq!(env.error, None);
    }

    #[test]
    fn test_error_shape() {
        let body = error("ROUTE_NOT_FOUND", "No handler found for GET /x", None);
        let raw: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(raw["success"], false);
        assert!(raw["data"].is_null());
        assert_eq!(raw["error"]["code"], "ROUTE_NOT_FOUND");
        assert_eq!(raw["error"]["message"], "No handler found for GET /x");
        assert!(raw["error"]["details"].is_null());
    }

    #[test]
    fn test_standard_error_keeps_code_and_message() {
        let cases = [
            (StandardError::PlayerNotFound, "PLAYER_NOT_FOUND"),
            (StandardError::SubsystemNotFound, "SUBSYSTEM_NOT_FOUND"),
            (StandardError::InvalidRequest, "INVALID_REQUEST"),
            (StandardError::MissingParameter, "MISSING_PARAMETER"),
            (StandardError::CommandFailed, "COMMAND_FAILED"),
            (StandardError::InternalError, "INTERNAL_ERROR"),
            (StandardError::NotInPlayMode, "NOT_IN_PLAY_MODE"),
            (StandardError::Unknown, "UNKNOWN_ERROR"),
        ];

        for (kind, code) in cases {
            let env = Envelope::parse(&standard_error(kind, Some("extra"))).unwrap();
            let err = env.error.unwrap();
            assert_eq!(err.code, code);
            assert_eq!(err.message, kind.message());
            assert_eq!(err.details.as_deref(), Some("extra"));
        }
    }

    #[test]
    fn test_unserializable_data_falls_back() {
        // Non-string map keys cannot be represented in JSON
        let mut bad: HashMap<(i32, i32), i32> = HashMap::new();
        bad.insert((1, 2), 3);

        let body = success(&bad);
        let env = Envelope::parse(&body).expect("fallback must be valid JSON");
        assert!(!env.success);
        assert_eq!(env.error_code(), Some(SERIALIZATION_ERROR));
        assert!(env.data.is_none());
    }

    #[test]
    fn test_timestamp_is_utc_rfc3339() {
        let ts = timestamp();
        assert!(ts.ends_with('Z'));
        let parsed = chrono::DateTime::parse_from_rfc3339(&ts).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
    }
}
