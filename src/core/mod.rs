//! Host-facing core: the main-context dispatcher and the host collaborator trait.
//!
//! Independent of HTTP; the server module builds on top of it.

pub mod dispatcher;
pub mod host;

// Re-exports for convenience
pub use dispatcher::{DEFAULT_CALL_TIMEOUT, Dispatcher, Job, MainContext};
pub use host::{HostContext, downcast_host};
