//! Route table and the registration capability handed to services.
//!
//! Two independent maps, one per method. Registration is first-wins: a
//! duplicate path under the same method is rejected with a warning and the
//! original handler stays active. There is no removal.
//!
//! The table is plain data with no interior locking. The server mutates it
//! only while stopped and shares a frozen `Arc` snapshot with the listener,
//! so request-time lookups never take a lock.

use log::{info, warn};
use rouille::Request;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Route handler: receives the request, returns the final serialized body.
///
/// `Err` (or a panic) is reported to the caller as `INTERNAL_ERROR` with HTTP 500.
pub type Handler = Arc<dyn Fn(&Request) -> anyhow::Result<String> + Send + Sync>;

/// Wrap a closure into a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Request) -> anyhow::Result<String> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Methods that own a route table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    /// Map a request method; anything but GET/POST has no table.
    pub fn from_http(method: &str) -> Option<Self> {
        match method {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration capability exposed to services.
///
/// Both methods return `true` if the route was inserted.
pub trait EndpointRegistry {
    fn register_get(&mut self, path: &str, handler: Handler) -> bool;
    fn register_post(&mut self, path: &str, handler: Handler) -> bool;
}

/// Per-method route maps
#[derive(Clone, Default)]
pub struct RouteTable {
    get: HashMap<String, Handler>,
    post: HashMap<String, Handler>,
    log_registrations: bool,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every successful registration at info level
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.log_registrations = enabled;
        self
    }

    /// Insert if absent. Duplicates are rejected and the first handler kept.
    pub fn insert(&mut self, method: HttpMethod, path: &str, handler: Handler) -> bool {
        let routes = match method {
            HttpMethod::Get => &mut self.get,
            HttpMethod::Post => &mut self.post,
        };

        if routes.contains_key(path) {
            warn!("{} endpoint already registered: {}", method, path);
            return false;
        }

        routes.insert(path.to_string(), handler);
        if self.log_registrations {
            info!("Registered {} {}", method, path);
        }
        true
    }

    /// Find the handler for a raw request method and path.
    pub fn lookup(&self, method: &str, path: &str) -> Option<&Handler> {
        match HttpMethod::from_http(method)? {
            HttpMethod::Get => self.get.get(path),
            HttpMethod::Post => self.post.get(path),
        }
    }

    pub fn contains(&self, method: HttpMethod, path: &str) -> bool {
        match method {
            HttpMethod::Get => self.get.contains_key(path),
            HttpMethod::Post => self.post.contains_key(path),
        }
    }

    /// All routes, sorted by method then path
    pub fn endpoints(&self) -> Vec<(HttpMethod, String)> {
        let mut list: Vec<(HttpMethod, String)> = self
            .get
            .keys()
            .map(|p| (HttpMethod::Get, p.clone()))
            .chain(self.post.keys().map(|p| (HttpMethod::Post, p.clone())))
            .collect();
        list.sort();
        list
    }

    pub fn len(&self) -> usize {
        self.get.len() + self.post.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EndpointRegistry for RouteTable {
    fn register_get(&mut self, path: &str, handler: Handler) -> bool {
        self.insert(HttpMethod::Get, path, handler)
    }

    fn register_post(&mut self, path: &str, handler: Handler) -> bool {
        self.insert(HttpMethod::Post, path, handler)
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("get", &self.get.len())
            .field("post", &self.post.len())
            .finish()
    }
}
