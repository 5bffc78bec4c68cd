//! Server lifecycle and configuration errors.
//!
//! Request-level failures never surface as `ServerError`; they are turned
//! into response envelopes at the connection boundary. This type only covers
//! what the embedding application has to react to: a refused second
//! instance, a failed bind, or a bad configuration.

use thiserror::Error;

/// Errors reported by server construction, startup and configuration.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A live `ApiServer` already exists in this process
    #[error("an API server instance already exists in this process")]
    InstanceExists,

    /// Listener could not be bound
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for server operations
pub type ServerResult<T> = Result<T, ServerError>;
