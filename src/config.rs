//! Server configuration and config/data directory resolution.
//!
//! `ServerConfig` is a `#[serde(default)]` JSON document, so a partial file
//! only overrides what it names. Sources, lowest priority first:
//! defaults -> `openclaw.json` -> environment (`OPENCLAW_*`) -> command line.

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ServerError, ServerResult};

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "openclaw.json";

/// Default log file name inside the data directory
pub const LOG_FILE: &str = "openclaw.log";

/// Default listening port
pub const DEFAULT_PORT: u16 = 8091;

/// Server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,                // Loopback name; always bound as IPv4 127.0.0.1
    pub port: u16,                   // 0 = ephemeral
    pub auto_start: bool,            // init() starts listening right away
    pub log_requests: bool,          // Log each request and route registration
    pub main_thread_timeout_ms: u64, // Bound for call_and_wait in system handlers
    pub shutdown_timeout_ms: u64,    // Bound for joining the listener thread
    pub worker_threads: usize,       // 0 = thread per connection, N = fixed pool
    pub cors: bool,                  // Add Access-Control-Allow-Origin: *
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            auto_start: true,
            log_requests: true,
            main_thread_timeout_ms: 200,
            shutdown_timeout_ms: 2000,
            worker_threads: 0,
            cors: false,
        }
    }
}

impl ServerConfig {
    /// Load from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Write as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config: {}", path.display()))
    }

    /// Apply `OPENCLAW_HOST`, `OPENCLAW_PORT` and `OPENCLAW_TIMEOUT_MS`.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(host) = get("OPENCLAW_HOST") {
            self.host = host;
        }
        if let Some(port) = get("OPENCLAW_PORT") {
            match port.parse() {
                Ok(p) => self.port = p,
                Err(_) => warn!("Ignoring invalid OPENCLAW_PORT: {}", port),
            }
        }
        if let Some(ms) = get("OPENCLAW_TIMEOUT_MS") {
            match ms.parse() {
                Ok(v) => self.main_thread_timeout_ms = v,
                Err(_) => warn!("Ignoring invalid OPENCLAW_TIMEOUT_MS: {}", ms),
            }
        }
    }

    /// Reject non-loopback hosts and zero timeouts.
    pub fn validate(&self) -> ServerResult<()> {
        self.bind_addr()?;
        if self.main_thread_timeout_ms == 0 {
            return Err(ServerError::Config("main_thread_timeout_ms must be > 0".to_string()));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(ServerError::Config("shutdown_timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }

    /// The IPv4 loopback socket to listen on.
    ///
    /// `localhost` may resolve to `::1` first; the IPv4 address is picked so
    /// clients using either `localhost` or `127.0.0.1` reach the one listener.
    /// Hosts without an IPv4 loopback address are rejected.
    pub fn bind_addr(&self) -> ServerResult<SocketAddr> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ServerError::Config(format!("cannot resolve host '{}': {}", self.host, e)))?
            .collect();

        if addrs.iter().any(|a| !a.ip().is_loopback()) {
            return Err(ServerError::Config(format!(
                "host '{}' is not a loopback address",
                self.host
            )));
        }
        addrs.into_iter().find(SocketAddr::is_ipv4).ok_or_else(|| {
            ServerError::Config(format!(
                "host '{}' has no IPv4 loopback address, use 127.0.0.1",
                self.host
            ))
        })
    }

    pub fn main_thread_timeout(&self) -> Duration {
        Duration::from_millis(self.main_thread_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Directory holding `openclaw.json` and the default log file.
///
/// Resolution order: explicit directory (`--config-dir`, then
/// `OPENCLAW_CONFIG_DIR`), the working directory when it already holds an
/// openclaw file, the platform config directory, `.` as a last resort.
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var_os("OPENCLAW_CONFIG_DIR").map(PathBuf::from));
        Self { config_dir }
    }

    pub fn dir(&self) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        match std::env::current_dir() {
            Ok(cwd) if holds_openclaw_files(&cwd) => cwd,
            _ => dirs_next::config_dir()
                .map(|dir| dir.join("openclaw"))
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir().join(name)
    }

    /// Create the directory if missing and return it
    pub fn ensure_dir(&self) -> Result<PathBuf> {
        let dir = self.dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        Ok(dir)
    }
}

fn holds_openclaw_files(dir: &Path) -> bool {
    [CONFIG_FILE, LOG_FILE].iter().any(|f| dir.join(f).is_file())
}
