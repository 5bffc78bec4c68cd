use clap::Parser;
use std::path::PathBuf;

use crate::config::ServerConfig;

const VERSION_INFO: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\nTarget: ",
    env!("CARGO_PKG_NAME"),
    " (local HTTP control server)"
);

/// Demo host with a local HTTP control API
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Port to listen on (0 = ephemeral)
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Loopback host to bind (localhost or 127.0.0.1)
    #[arg(long = "host", value_name = "HOST")]
    pub host: Option<String>,

    /// Timeout for work executed on the host tick thread, in milliseconds
    #[arg(long = "timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Fixed worker pool size (0 = thread per connection)
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Add Access-Control-Allow-Origin: * to responses
    #[arg(long = "cors")]
    pub cors: bool,

    /// Do not log individual requests
    #[arg(short = 'q', long = "quiet-requests")]
    pub quiet_requests: bool,

    /// Host tick rate in frames per second
    #[arg(long = "fps", value_name = "FPS", default_value_t = 60.0)]
    pub fps: f32,

    /// Level loaded on startup
    #[arg(long = "level", value_name = "NAME", default_value = "Level1")]
    pub level: String,

    /// Exit after this many seconds (default: run until /api/game/exit)
    #[arg(short = 'd', long = "duration", value_name = "SECS")]
    pub duration: Option<f64>,

    /// Write the effective configuration back to openclaw.json
    #[arg(long = "save-config")]
    pub save_config: bool,

    /// Enable debug logging to file (default: openclaw.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

impl Args {
    /// Overlay command-line values on a loaded config (highest priority)
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(ms) = self.timeout_ms {
            config.main_thread_timeout_ms = ms;
        }
        if let Some(n) = self.workers {
            config.worker_threads = n;
        }
        if self.cors {
            config.cors = true;
        }
        if self.quiet_requests {
            config.log_requests = false;
        }
    }
}
