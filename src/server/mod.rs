//! Local HTTP control server.
//!
//! # Purpose
//!
//! Lets external agents and scripts observe and drive a running host over a
//! loopback JSON API. Feature modules plug in as [`ApiService`]s; every
//! response is a uniform [`Envelope`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐     Dispatcher queue      ┌──────────────────────┐
//! │   Worker threads        │  ─── FnOnce(&mut Host) ─▶ │   Host tick thread   │
//! │   (rouille HTTP)        │                           │   (MainContext)      │
//! │                         │                           │                      │
//! │  GET /api/status        │  ─▶ call_and_wait ─────▶  │  drain(&mut host)    │
//! │                         │  ◀── envelope body ─────  │  runs queued jobs    │
//! └─────────────────────────┘                           └──────────────────────┘
//!          │
//!          │  Arc<RouteTable>, frozen while running
//!          ▼
//!    GET/POST lookup, handler, envelope
//! ```
//!
//! - **rouille** - sync HTTP server, one listener thread plus per-request workers
//! - **Dispatcher** - the only path from a worker to host state
//! - **RouteTable** - mutated only while stopped, lookups are lock-free
//!
//! # Endpoints
//!
//! | Method | Path          | Description                                  |
//! |--------|---------------|----------------------------------------------|
//! | GET    | `/api/health` | Liveness, version, bound port, uptime        |
//! | GET    | `/api/status` | Host state read inside the execution context |
//!
//! Unknown routes answer HTTP 200 with `ROUTE_NOT_FOUND`; failing handlers
//! answer HTTP 500 with `INTERNAL_ERROR`.

mod api;
pub mod envelope;
mod instance;
pub mod registry;
pub mod request;
mod service;

pub use api::{ApiServer, HealthResponse, SERVER_VERSION, ServerState, StatusResponse};
pub use envelope::{ApiError, Envelope, StandardError};
pub use instance::{init, is_initialized, shutdown, with_instance};
pub use registry::{EndpointRegistry, Handler, HttpMethod, RouteTable, handler};
pub use request::{json_body, read_body};
pub use service::ApiService;

/// Serializes unit tests that create the process-wide server.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
