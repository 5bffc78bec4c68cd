//! OpenClaw - local HTTP control server for interactive hosts
//!
//! Re-exports all modules for use by binary targets.

// Dispatcher and host collaborator
pub mod core;

// HTTP server, envelopes, routing
pub mod server;

// App modules
pub mod cli;
pub mod config;
pub mod demo;
pub mod error;
pub mod utils;

// Re-export commonly used types
pub use config::ServerConfig;
pub use self::core::{Dispatcher, HostContext, MainContext, downcast_host};
pub use error::{ServerError, ServerResult};
pub use server::{ApiServer, ApiService, EndpointRegistry, Envelope, ServerState, StandardError};
