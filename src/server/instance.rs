//! Process-wide server slot.
//!
//! Hosts that prefer not to own the [`ApiServer`] value call [`init`] once at
//! startup and [`shutdown`] on exit. Everything in between goes through
//! [`with_instance`].

use log::{info, warn};
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex, MutexGuard};

use super::api::ApiServer;
use super::service::ApiService;
use crate::config::ServerConfig;
use crate::core::Dispatcher;
use crate::error::{ServerError, ServerResult};

static INSTANCE: Lazy<Mutex<Option<ApiServer>>> = Lazy::new(|| Mutex::new(None));

fn slot() -> MutexGuard<'static, Option<ApiServer>> {
    INSTANCE.lock().unwrap_or_else(|e| e.into_inner())
}

/// Create the server, register `services`, and start it when `auto_start` is set.
///
/// A failed start keeps the instance in the slot, `Stopped`; call [`shutdown`]
/// to discard it.
pub fn init(
    config: ServerConfig,
    dispatcher: Dispatcher,
    services: Vec<Arc<dyn ApiService>>,
) -> ServerResult<()> {
    let mut slot = slot();
    if slot.is_some() {
        warn!("API server already initialized");
        return Err(ServerError::InstanceExists);
    }

    let mut server = ApiServer::new(config, dispatcher)?;
    for service in services {
        server.register_service(service);
    }

    let started = if server.config().auto_start {
        server.start()
    } else {
        info!("Auto-start disabled, server created in Stopped state");
        Ok(())
    };
    *slot = Some(server);
    started
}

/// Stop and drop the instance. Returns false if there was none.
pub fn shutdown() -> bool {
    let server = slot().take();
    match server {
        Some(server) => {
            // Dropped outside the lock; Drop stops the listener
            drop(server);
            true
        }
        None => false,
    }
}

/// Run `f` against the instance, if one exists.
///
/// Holds the slot lock for the duration; calling [`init`] or [`shutdown`]
/// from inside `f` deadlocks.
pub fn with_instance<R>(f: impl FnOnce(&mut ApiServer) -> R) -> Option<R> {
    slot().as_mut().map(f)
}

pub fn is_initialized() -> bool {
    slot().is_some()
}
