use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stereolink::camera::{FrameSource, Resolution, SyntheticSource, V4l2StereoSource};
use stereolink::config::AppConfig;
use stereolink::lifecycle::Lifecycle;
use stereolink::relay::PoseRelay;
use stereolink::state::AppState;
use stereolink::web;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// Stereolink command line arguments
#[derive(Parser, Debug)]
#[command(name = "stereolink")]
#[command(version, about = "Stereo camera WebRTC streaming server for VR teleoperation rigs", long_about = None)]
struct CliArgs {
    /// Path to a TOML configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides config)
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Rig controller host (overrides config)
    #[arg(long, value_name = "HOST")]
    relay_host: Option<String>,

    /// Rig controller port (overrides config)
    #[arg(long, value_name = "PORT")]
    relay_port: Option<u16>,

    /// Use a synthetic frame source instead of the V4L2 cameras
    #[arg(long)]
    synthetic: bool,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting stereolink v{}", env!("CARGO_PKG_VERSION"));

    // Layered configuration: defaults, file, CLI overrides
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(address) = args.address {
        config.web.bind_address = address;
    }
    if let Some(port) = args.port {
        config.web.port = port;
    }
    if let Some(host) = args.relay_host {
        config.relay.host = host;
    }
    if let Some(port) = args.relay_port {
        config.relay.port = port;
    }

    let source: Arc<dyn FrameSource> = if args.synthetic {
        Arc::new(SyntheticSource::new(Resolution::new(
            config.camera.width,
            config.camera.height,
        )))
    } else {
        Arc::new(V4l2StereoSource::new(config.camera.clone()))
    };

    let relay = Arc::new(PoseRelay::new());
    let state = AppState::new(config, source, relay);
    let lifecycle = Lifecycle::new(state.clone());

    lifecycle.startup().await?;

    let addr: SocketAddr = format!("{}:{}", state.config.web.bind_address, state.config.web.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let router = web::create_router(state.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    lifecycle.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "stereolink=error,tower_http=error",
        LogLevel::Warn => "stereolink=warn,tower_http=warn",
        LogLevel::Info => "stereolink=info,tower_http=info",
        LogLevel::Verbose => "stereolink=debug,tower_http=info",
        LogLevel::Debug => "stereolink=debug,tower_http=debug",
        LogLevel::Trace => "stereolink=trace,tower_http=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
