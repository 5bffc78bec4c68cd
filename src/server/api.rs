//! REST API server implementation using rouille.
//!
//! # Purpose
//!
//! Owns the listener lifecycle, routes requests through the frozen route
//! table and turns every outcome into a response envelope. Handlers that need
//! host state go through the [`Dispatcher`] instead of touching it from the
//! worker thread.
//!
//! # Key types
//!
//! - [`ApiServer`] - lifecycle (`start`/`stop`), registration, introspection
//! - [`ServerState`] - `Stopped -> Starting -> Running -> Stopping -> Stopped`
//! - [`HealthResponse`], [`StatusResponse`] - payloads of the system routes
//!
//! # Threads
//!
//! - listener thread (`openclaw-listener`) polls the rouille server and hands
//!   each request to rouille's executor: a thread per connection, or a fixed
//!   pool when `worker_threads > 0`
//! - handlers run on those worker threads
//! - `stop()` signals the listener thread over a channel and joins it with a
//!   bounded wait; in-flight workers are left to finish on their own
//!
//! Only one `ApiServer` may be alive per process; a second `new()` fails with
//! [`ServerError::InstanceExists`].

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use log::{debug, error, info, warn};
use rouille::{Request, Response};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use super::envelope::{self, ROUTE_NOT_FOUND, StandardError};
use super::registry::{EndpointRegistry, Handler, HttpMethod, RouteTable, handler};
use super::service::ApiService;
use crate::config::ServerConfig;
use crate::core::{Dispatcher, HostContext};
use crate::error::{ServerError, ServerResult};
use crate::utils::{format_uptime, panic_message};

/// Reported as `serverVersion` by `/api/health`
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long one listener poll waits before re-checking the stop signal
const POLL_INTERVAL: Duration = Duration::from_millis(50);

static INSTANCE_LIVE: AtomicBool = AtomicBool::new(false);

/// Server lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// `/api/health` payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub server_version: String,
    pub port: u16,
    pub uptime: String,
}

/// `/api/status` payload, captured inside the execution context
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub is_playing: bool,
    pub scene_name: String,
    pub game_time: f32,
    pub player_exists: bool,
    pub current_level: Option<String>,
    pub world_axis_up: &'static str,
    pub world_axis_forward: &'static str,
    pub world_axis_right: &'static str,
}

impl StatusResponse {
    pub fn from_host(host: &dyn HostContext) -> Self {
        Self {
            is_playing: host.is_playing(),
            scene_name: host.scene_name(),
            game_time: host.elapsed_secs(),
            player_exists: host.player_exists(),
            current_level: host.current_level(),
            world_axis_up: "y",
            world_axis_forward: "z",
            world_axis_right: "x",
        }
    }
}

/// Bound port and start instant, shared with the health handler
#[derive(Debug, Clone, Copy)]
struct RunInfo {
    port: u16,
    started: Instant,
}

struct Listener {
    handle: thread::JoinHandle<()>,
    stop_tx: Sender<()>,
}

/// HTTP control server
pub struct ApiServer {
    config: ServerConfig,
    dispatcher: Dispatcher,
    routes: Arc<RouteTable>,
    services: Vec<Arc<dyn ApiService>>,
    state: ServerState,
    run_info: Arc<RwLock<Option<RunInfo>>>,
    started_at: Option<DateTime<Utc>>,
    listener: Option<Listener>,
}

impl ApiServer {
    /// Create the process-wide server and register the system routes.
    ///
    /// Fails with [`ServerError::InstanceExists`] while another instance is alive.
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> ServerResult<Self> {
        config.validate()?;

        if INSTANCE_LIVE.swap(true, Ordering::AcqRel) {
            error!("Refusing to create a second API server instance");
            return Err(ServerError::InstanceExists);
        }

        let routes = RouteTable::new().with_logging(config.log_requests);
        let mut server = Self {
            config,
            dispatcher,
            routes: Arc::new(routes),
            services: Vec::new(),
            state: ServerState::Stopped,
            run_info: Arc::new(RwLock::new(None)),
            started_at: None,
            listener: None,
        };
        server.register_system_endpoints();
        Ok(server)
    }

    fn register_system_endpoints(&mut self) {
        // Health needs no host state, it runs on the worker thread
        let run_info = Arc::clone(&self.run_info);
        let configured_port = self.config.port;
        self.register_get(
            "/api/health",
            handler(move |_req| Ok(health_body(&run_info, configured_port))),
        );

        let dispatcher = self.dispatcher.clone();
        let timeout = self.config.main_thread_timeout();
        self.register_get(
            "/api/status",
            handler(move |_req| {
                Ok(dispatcher.call_and_wait(
                    |host| Ok(envelope::success(&StatusResponse::from_host(host))),
                    timeout,
                ))
            }),
        );
    }

    // ========== Lifecycle ==========

    /// Bind the listener and spawn the listener thread.
    ///
    /// No-op with a warning unless `Stopped`. A bind failure leaves the
    /// server `Stopped` and is not retried.
    pub fn start(&mut self) -> ServerResult<()> {
        if self.state != ServerState::Stopped {
            warn!("Server is already running or starting");
            return Ok(());
        }

        self.state = ServerState::Starting;
        let started = Instant::now();
        let addr = match self.config.bind_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.state = ServerState::Stopped;
                error!("Failed to start server: {}", e);
                return Err(e);
            }
        };

        let routes = Arc::clone(&self.routes);
        let log_requests = self.config.log_requests;
        let cors = self.config.cors;
        let server = match rouille::Server::new(addr, move |request| {
            process_request(&routes, request, log_requests, cors)
        }) {
            Ok(server) => server,
            Err(e) => {
                self.state = ServerState::Stopped;
                error!("Failed to start server on {}: {}", addr, e);
                return Err(ServerError::Bind {
                    addr: addr.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        let server = match self.config.worker_threads {
            0 => server,
            n => server.pool_size(n),
        };
        let bound = server.server_addr();

        // Published before the first poll so health never sees a half-started server
        self.set_run_info(Some(RunInfo {
            port: bound.port(),
            started,
        }));

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("openclaw-listener".to_string())
            .spawn(move || {
                debug!("Listener thread started");
                run_listener(&stop_rx, || server.poll_timeout(POLL_INTERVAL));
                // Dropping the server closes the listening socket
                drop(server);
                debug!("Listener thread stopped");
            });
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                // Closure (and the bound server) dropped with the failed spawn
                self.set_run_info(None);
                self.state = ServerState::Stopped;
                error!("Failed to spawn listener thread: {}", e);
                return Err(ServerError::Io(e));
            }
        };

        self.started_at = Some(Utc::now());
        self.listener = Some(Listener { handle, stop_tx });
        self.state = ServerState::Running;

        info!("API server started on http://{}", bound);
        Ok(())
    }

    /// Close the listener and join its thread with a bounded wait.
    ///
    /// Best effort: a join timeout is logged and the state still ends `Stopped`.
    pub fn stop(&mut self) {
        if self.state == ServerState::Stopped {
            return;
        }

        self.state = ServerState::Stopping;
        info!("Stopping server...");

        if let Some(Listener { handle, stop_tx }) = self.listener.take() {
            let _ = stop_tx.send(());
            drop(stop_tx);
            // On timeout the thread is detached; it exits at its next poll and closes the socket then
            join_with_deadline(handle, self.config.shutdown_timeout());
        }

        self.set_run_info(None);
        self.started_at = None;
        self.state = ServerState::Stopped;
        info!("Server stopped");
    }

    fn set_run_info(&self, info: Option<RunInfo>) {
        *self.run_info.write().unwrap_or_else(|e| e.into_inner()) = info;
    }

    // ========== Services ==========

    /// Record a service and let it register its routes.
    ///
    /// Refused while the server is not `Stopped`, since the route table is frozen then.
    pub fn register_service(&mut self, service: Arc<dyn ApiService>) -> bool {
        if self.state != ServerState::Stopped {
            warn!(
                "Cannot register service {} while the server is {:?}",
                service.name(),
                self.state
            );
            return false;
        }

        service.register_endpoints(self);
        info!("Registered service: {}", service.name());
        self.services.push(service);
        true
    }

    /// Remove a service from bookkeeping. Its routes stay live.
    pub fn unregister_service(&mut self, name: &str) -> bool {
        match self.services.iter().position(|s| s.name() == name) {
            Some(idx) => {
                self.services.remove(idx);
                debug!("Unregistered service {} (its routes remain registered)", name);
                true
            }
            None => false,
        }
    }

    fn register(&mut self, method: HttpMethod, path: &str, handler: Handler) -> bool {
        if self.state != ServerState::Stopped {
            if self.routes.contains(method, path) {
                warn!("{} endpoint already registered: {}", method, path);
            } else {
                warn!(
                    "Cannot register {} {} while the server is {:?}; stop it first",
                    method, path, self.state
                );
            }
            return false;
        }
        Arc::make_mut(&mut self.routes).insert(method, path, handler)
    }

    // ========== Introspection ==========

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ServerState::Running
    }

    /// Bound port while running, configured port otherwise
    pub fn port(&self) -> u16 {
        self.run_info
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .map(|info| info.port)
            .unwrap_or(self.config.port)
    }

    /// Time since the last successful start
    pub fn uptime(&self) -> Option<Duration> {
        self.run_info
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .map(|info| info.started.elapsed())
    }

    /// Wall-clock start time of the current run
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// All registered routes, sorted by method then path
    pub fn endpoints(&self) -> Vec<(HttpMethod, String)> {
        self.routes.endpoints()
    }

    /// Names of registered services, in registration order
    pub fn services(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl EndpointRegistry for ApiServer {
    fn register_get(&mut self, path: &str, handler: Handler) -> bool {
        self.register(HttpMethod::Get, path, handler)
    }

    fn register_post(&mut self, path: &str, handler: Handler) -> bool {
        self.register(HttpMethod::Post, path, handler)
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop();
        INSTANCE_LIVE.store(false, Ordering::Release);
    }
}

/// Poll until the stop signal arrives or its sender is dropped.
///
/// A panicking poll is logged and the loop keeps going.
fn run_listener(stop_rx: &Receiver<()>, mut poll: impl FnMut()) {
    while let Err(TryRecvError::Empty) = stop_rx.try_recv() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| poll())) {
            error!("Listener error: {}", panic_message(payload.as_ref()));
        }
    }
}

/// Join `handle` if it finishes within `timeout`. Returns false when it did not.
fn join_with_deadline(handle: thread::JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }

    if !handle.is_finished() {
        warn!("Listener thread did not stop gracefully");
        return false;
    }
    if handle.join().is_err() {
        warn!("Listener thread panicked during shutdown");
    }
    true
}

/// Handle one request: route, run the handler, wrap the outcome.
///
/// Misses are `ROUTE_NOT_FOUND` with status 200. Handler errors and panics
/// become `INTERNAL_ERROR` with status 500.
pub(crate) fn process_request(
    routes: &RouteTable,
    request: &Request,
    log_requests: bool,
    cors: bool,
) -> Response {
    if log_requests {
        info!("{} {}", request.method(), request.raw_url());
    }

    let (status, body) = match panic::catch_unwind(AssertUnwindSafe(|| route_request(routes, request))) {
        Ok(Ok(body)) => (200, body),
        Ok(Err(e)) => {
            error!("Error processing request: {:#}", e);
            (500, envelope::standard_error(StandardError::InternalError, Some(&e.to_string())))
        }
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            error!("Handler panicked: {}", msg);
            (500, envelope::standard_error(StandardError::InternalError, Some(&msg)))
        }
    };

    let response = Response::from_data("application/json", body).with_status_code(status);
    if cors {
        response.with_additional_header("Access-Control-Allow-Origin", "*")
    } else {
        response
    }
}

fn route_request(routes: &RouteTable, request: &Request) -> anyhow::Result<String> {
    let method = request.method();
    let path = request.url();

    match routes.lookup(method, &path) {
        Some(handler) => handler(request),
        None => Ok(envelope::error(
            ROUTE_NOT_FOUND,
            &format!("No handler found for {} {}", method, path),
            None,
        )),
    }
}

fn health_body(run_info: &RwLock<Option<RunInfo>>, configured_port: u16) -> String {
    let info = *run_info.read().unwrap_or_else(|e| e.into_inner());
    let (port, uptime) = match info {
        Some(info) => (info.port, info.started.elapsed()),
        None => (configured_port, Duration::ZERO),
    };

    envelope::success(&HealthResponse {
        status: "healthy".to_string(),
        server_version: SERVER_VERSION.to_string(),
        port,
        uptime: format_uptime(uptime),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::envelope::Envelope;
    use crate::server::test_lock;
    use std::io::Read;
    use std::net::TcpListener;
    use std::sync::atomic::AtomicUsize;

    fn body_of(response: Response) -> String {
        let (mut reader, _) = response.data.into_reader_and_size();
        let mut body = String::new();
        reader.read_to_string(&mut body).unwrap();
        body
    }

    fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
        response
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_ref())
    }

    fn send(routes: &RouteTable, method: &str, path: &str) -> (u16, Envelope) {
        let request = Request::fake_http(method, path, vec![], vec![]);
        let response = process_request(routes, &request, false, false);
        let status = response.status_code;
        (status, Envelope::parse(&body_of(response)).unwrap())
    }

    fn ephemeral_config() -> ServerConfig {
        ServerConfig {
            port: 0,
            log_requests: false,
            ..Default::default()
        }
    }

    struct NamedService(&'static str, &'static str);

    impl ApiService for NamedService {
        fn name(&self) -> &str {
            self.0
        }
        fn register_endpoints(&self, registry: &mut dyn EndpointRegistry) {
            let body = self.1;
            registry.register_get(body, handler(move |_req| Ok(envelope::success(body))));
        }
    }

    #[test]
    fn test_routes_reach_only_their_handler() {
        let get_hits = Arc::new(AtomicUsize::new(0));
        let post_hits = Arc::new(AtomicUsize::new(0));

        let mut routes = RouteTable::new();
        let g = Arc::clone(&get_hits);
        routes.register_get("/api/item", handler(move |_req| {
            g.fetch_add(1, Ordering::SeqCst);
            Ok(envelope::success("get"))
        }));
        let p = Arc::clone(&post_hits);
        routes.register_post("/api/item", handler(move |_req| {
            p.fetch_add(1, Ordering::SeqCst);
            Ok(envelope::success("post"))
        }));

        let (status, env) = send(&routes, "GET", "/api/item");
        assert_eq!(status, 200);
        assert_eq!(env.data, Some(serde_json::json!("get")));
        assert_eq!((get_hits.load(Ordering::SeqCst), post_hits.load(Ordering::SeqCst)), (1, 0));

        let (_, env) = send(&routes, "POST", "/api/item");
        assert_eq!(env.data, Some(serde_json::json!("post")));
        assert_eq!((get_hits.load(Ordering::SeqCst), post_hits.load(Ordering::SeqCst)), (1, 1));
    }

    #[test]
    fn test_unknown_route_is_not_found_with_200() {
        let mut routes = RouteTable::new();
        routes.register_get("/api/health", handler(|_req| Ok(envelope::success("ok"))));

        for (method, path) in [("GET", "/api/missing"), ("POST", "/api/health"), ("PUT", "/api/health")] {
            let (status, env) = send(&routes, method, path);
            assert_eq!(status, 200);
            assert!(!env.success);
            assert_eq!(env.error_code(), Some(ROUTE_NOT_FOUND));
            let message = env.error.unwrap().message;
            assert!(message.contains(method) && message.contains(path), "{message}");
        }
    }

    #[test]
    fn test_query_string_is_not_part_of_path() {
        let mut routes = RouteTable::new();
        routes.register_get("/api/health", handler(|_req| Ok(envelope::success("ok"))));
        let (_, env) = send(&routes, "GET", "/api/health?verbose=1");
        assert!(env.success);
    }

    #[test]
    fn test_failing_handlers_are_internal_error_with_500() {
        let mut routes = RouteTable::new();
        routes.register_get("/api/err", handler(|_req| Err(anyhow::anyhow!("disk on fire"))));
        routes.register_get("/api/panic", handler(|_req| panic!("handler blew up")));

        let (status, env) = send(&routes, "GET", "/api/err");
        assert_eq!(status, 500);
        assert_eq!(env.error_code(), Some("INTERNAL_ERROR"));
        assert_eq!(env.error.unwrap().details.as_deref(), Some("disk on fire"));

        let (status, env) = send(&routes, "GET", "/api/panic");
        assert_eq!(status, 500);
        assert_eq!(env.error.unwrap().details.as_deref(), Some("handler blew up"));
    }

    #[test]
    fn test_response_headers() {
        let mut routes = RouteTable::new();
        routes.register_get("/api/x", handler(|_req| Ok(envelope::success("x"))));
        let request = Request::fake_http("GET", "/api/x", vec![], vec![]);

        let plain = process_request(&routes, &request, false, false);
        assert_eq!(header(&plain, "Content-Type"), Some("application/json"));
        assert!(header(&plain, "Access-Control-Allow-Origin").is_none());

        let with_cors = process_request(&routes, &request, false, true);
        assert_eq!(header(&with_cors, "Access-Control-Allow-Origin"), Some("*"));
    }

    #[test]
    fn test_health_without_run_reports_configured_port() {
        let env = Envelope::parse(&health_body(&RwLock::new(None), 8091)).unwrap();
        let data = env.data.unwrap();
        assert_eq!(data["status"], "healthy");
        assert_eq!(data["port"], 8091);
        assert_eq!(data["uptime"], "00:00:00");
        assert_eq!(data["serverVersion"], SERVER_VERSION);
    }

    #[test]
    fn test_second_instance_fails() {
        let _guard = test_lock();
        let first = ApiServer::new(ephemeral_config(), Dispatcher::new()).unwrap();
        assert!(matches!(
            ApiServer::new(ephemeral_config(), Dispatcher::new()),
            Err(ServerError::InstanceExists)
        ));
        drop(first);
        assert!(ApiServer::new(ephemeral_config(), Dispatcher::new()).is_ok());
    }

    #[test]
    fn test_invalid_config_does_not_claim_instance() {
        let _guard = test_lock();
        let bad = ServerConfig {
            host: "0.0.0.0".to_string(),
            ..ephemeral_config()
        };
        assert!(matches!(ApiServer::new(bad, Dispatcher::new()), Err(ServerError::Config(_))));
        assert!(ApiServer::new(ephemeral_config(), Dispatcher::new()).is_ok());
    }

    #[test]
    fn test_state_machine() {
        let _guard = test_lock();
        let mut server = ApiServer::new(ephemeral_config(), Dispatcher::new()).unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.uptime().is_none());

        server.start().unwrap();
        assert_eq!(server.state(), ServerState::Running);
        assert!(server.is_running());
        assert_ne!(server.port(), 0);
        assert!(server.started_at().is_some());

        // Second start is a no-op
        let port = server.port();
        server.start().unwrap();
        assert_eq!(server.port(), port);

        server.stop();
        assert_eq!(server.state(), ServerState::Stopped);
        assert_eq!(server.port(), 0);
        server.stop();
        assert_eq!(server.state(), ServerState::Stopped);

        // Restart after stop
        server.start().unwrap();
        assert!(server.is_running());
    }

    #[test]
    fn test_bind_failure_reverts_to_stopped() {
        let _guard = test_lock();
        let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let config = ServerConfig {
            port,
            ..ephemeral_config()
        };
        let mut server = ApiServer::new(config, Dispatcher::new()).unwrap();
        assert!(matches!(server.start(), Err(ServerError::Bind { .. })));
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[test]
    fn test_routes_frozen_while_running() {
        let _guard = test_lock();
        let mut server = ApiServer::new(ephemeral_config(), Dispatcher::new()).unwrap();
        server.start().unwrap();

        assert!(!server.register_get("/api/late", handler(|_req| Ok(String::new()))));
        assert!(!server.register_get("/api/health", handler(|_req| Ok(String::new()))));
        assert!(!server.register_service(Arc::new(NamedService("Late", "/api/late"))));

        server.stop();
        assert!(server.register_get("/api/late", handler(|_req| Ok(String::new()))));
        assert!(server.endpoints().contains(&(HttpMethod::Get, "/api/late".to_string())));
    }

    #[test]
    fn test_service_bookkeeping_keeps_routes() {
        let _guard = test_lock();
        let mut server = ApiServer::new(ephemeral_config(), Dispatcher::new()).unwrap();

        assert!(server.register_service(Arc::new(NamedService("Alpha", "/api/alpha"))));
        assert!(server.register_service(Arc::new(NamedService("Beta", "/api/beta"))));
        assert_eq!(server.services(), vec!["Alpha".to_string(), "Beta".to_string()]);

        assert!(server.unregister_service("Alpha"));
        assert!(!server.unregister_service("Alpha"));
        assert_eq!(server.services(), vec!["Beta".to_string()]);

        // Routes are not revoked
        let endpoints = server.endpoints();
        assert!(endpoints.contains(&(HttpMethod::Get, "/api/alpha".to_string())));
        assert!(endpoints.contains(&(HttpMethod::Get, "/api/health".to_string())));
        assert!(endpoints.contains(&(HttpMethod::Get, "/api/status".to_string())));
    }

    #[test]
    fn test_health_reports_bound_port_right_after_start() {
        let _guard = test_lock();
        let mut server = ApiServer::new(ephemeral_config(), Dispatcher::new()).unwrap();
        server.start().unwrap();

        let (status, env) = send(&server.routes, "GET", "/api/health");
        assert_eq!(status, 200);
        let data = env.data.unwrap();
        assert_ne!(data["port"], 0);
        assert_eq!(data["port"], server.port());
    }

    #[test]
    fn test_listener_survives_panicking_poll() {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let mut polls = 0;

        run_listener(&stop_rx, || {
            polls += 1;
            match polls {
                1 => panic!("accept failed"),
                3 => stop_tx.send(()).unwrap(),
                _ => {}
            }
        });
        assert_eq!(polls, 3);
    }

    #[test]
    fn test_listener_exits_when_sender_dropped() {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        drop(stop_tx);
        let mut polls = 0;
        run_listener(&stop_rx, || polls += 1);
        assert_eq!(polls, 0);
    }

    #[test]
    fn test_join_with_deadline() {
        let slow = thread::spawn(|| thread::sleep(Duration::from_millis(300)));
        let started = Instant::now();
        assert!(!join_with_deadline(slow, Duration::from_millis(1)));
        assert!(started.elapsed() < Duration::from_millis(250));

        let quick = thread::spawn(|| {});
        assert!(join_with_deadline(quick, Duration::from_secs(2)));
    }

    #[test]
    fn test_stop_with_join_timeout_still_ends_stopped() {
        let _guard = test_lock();
        let config = ServerConfig {
            shutdown_timeout_ms: 1,
            ..ephemeral_config()
        };
        let mut server = ApiServer::new(config, Dispatcher::new()).unwrap();
        server.start().unwrap();
        let port = server.port();

        server.stop();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.uptime().is_none());

        // Detached listener closes the socket at its next poll
        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
        let deadline = Instant::now() + Duration::from_secs(2);
        while std::net::TcpStream::connect(addr).is_ok() {
            assert!(Instant::now() < deadline, "listener still accepting");
            thread::sleep(Duration::from_millis(20));
        }

        // Restart after a detached stop
        server.start().unwrap();
        assert!(server.is_running());
    }
}
