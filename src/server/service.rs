//! Service registration protocol.
//!
//! A feature module implements [`ApiService`] and is handed to
//! `ApiServer::register_service`, which records it and lets it add its routes.
//! The module only ever sees the [`EndpointRegistry`] capability, never the
//! server itself.

use super::registry::EndpointRegistry;

/// A feature module contributing routes.
pub trait ApiService: Send + Sync {
    /// Name used for bookkeeping and logs
    fn name(&self) -> &str;

    /// Register all routes of this service. Called once per registration.
    fn register_endpoints(&self, registry: &mut dyn EndpointRegistry);
}
