use openclaw::cli::Args;
use openclaw::config::{self, ServerConfig};
use openclaw::demo::{GameService, PlayerService, World};
use openclaw::server::{self, ApiService};
use openclaw::Dispatcher;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn init_logging(args: &Args, path_config: &config::PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| path_config.file(config::LOG_FILE));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("tiny_http", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging, respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("tiny_http", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// defaults -> openclaw.json -> OPENCLAW_* -> command line
fn load_config(args: &Args, path_config: &config::PathConfig) -> Result<ServerConfig> {
    let config_path = path_config.file(config::CONFIG_FILE);
    info!("Config path: {}", config_path.display());

    let mut cfg = ServerConfig::load(&config_path)?;
    cfg.apply_env();
    args.apply(&mut cfg);

    if args.save_config {
        cfg.save(&config_path)?;
        info!("Saved configuration to {}", config_path.display());
    }
    Ok(cfg)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = path_config.ensure_dir() {
        eprintln!("Warning: {:#}", e);
    }

    init_logging(&args, &path_config)?;
    info!("OpenClaw demo host starting...");
    debug!("Command-line args: {:?}", args);

    let cfg = load_config(&args, &path_config)?;

    // This thread becomes the execution context for all host-touching work
    let dispatcher = Dispatcher::global().clone();
    let mut main_ctx = dispatcher
        .main_context()
        .context("execution context already claimed")?;
    let mut world = World::new(&args.level);

    let timeout = cfg.main_thread_timeout();
    let services: Vec<Arc<dyn ApiService>> = vec![
        Arc::new(PlayerService::new(dispatcher.clone(), timeout)),
        Arc::new(GameService::new(dispatcher.clone(), timeout)),
    ];
    server::init(cfg, dispatcher.clone(), services)?;

    let url = server::with_instance(|s| {
        s.is_running()
            .then(|| format!("http://{}:{}", s.config().host, s.port()))
    });
    if let Some(url) = url.flatten() {
        println!("Listening on {}/api/health", url);
    }

    let fps = if args.fps > 0.0 { args.fps } else { 60.0 };
    let frame = Duration::from_secs_f32(1.0 / fps);
    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));

    let mut last = Instant::now();
    loop {
        let frame_start = Instant::now();
        let dt = frame_start.duration_since(last).as_secs_f32();
        last = frame_start;

        world.tick(dt);
        main_ctx.drain(&mut world);

        if world.exit_requested() {
            info!("Exit requested over the API");
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Run duration elapsed");
            break;
        }

        if let Some(rest) = frame.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    if !server::shutdown() {
        warn!("No server instance to shut down");
    }
    // Jobs still queued are discarded with the context
    drop(main_ctx);
    info!("OpenClaw demo host stopped");
    Ok(())
}
