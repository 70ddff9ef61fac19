//! Subliminal session player - main entry point
//!
//! Runs the playback controller behind an HTTP/SSE control surface.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subl_common::config::{resolve_config_path, CONFIG_ENV_VAR};
use subl_common::events::EventBus;
use subl_common::store::JsonFileStore;
use subl_player::api::{self, AppContext};
use subl_player::config::TomlConfig;
use subl_player::media::ClockBackend;
use subl_player::speech::{HttpSynthesizer, SpeechSynthesizer};
use subl_player::{EngineDeps, PlaybackController};

/// Event bus capacity for SSE subscribers
const EVENT_CAPACITY: usize = 256;

/// Command-line arguments for subl-player
#[derive(Parser, Debug)]
#[command(name = "subl-player")]
#[command(about = "Subliminal session playback engine")]
#[command(version)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "SUBL_PORT")]
    port: Option<u16>,

    /// Log level (overrides config file; RUST_LOG takes precedence)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR, "subl-player.toml");
    let config = TomlConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("subl_player={0},subl_common={0},tower_http=info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("No configuration file found; using defaults"),
    }

    let port = args.port.unwrap_or(config.port);
    let storage_dir = config.storage_directory();
    info!("Resume snapshots stored in {}", storage_dir.display());

    let timeout = config.synthesis_timeout();
    let backend = Arc::new(ClockBackend::new(timeout).context("Failed to create media backend")?);
    let synthesizer = Arc::new(
        HttpSynthesizer::new(config.synthesis.endpoint.clone(), timeout)
            .context("Failed to create synthesis client")?,
    );
    let system_synthesizer: Option<Arc<dyn SpeechSynthesizer>> = match &config.synthesis.system_endpoint {
        Some(endpoint) => Some(Arc::new(
            HttpSynthesizer::new(endpoint.clone(), timeout).context("Failed to create system synthesis client")?,
        )),
        None => {
            warn!("No system voice endpoint configured; system voices will be skipped");
            None
        }
    };
    info!("Speech synthesis endpoint: {}", synthesizer.endpoint());

    let controller = PlaybackController::spawn(EngineDeps {
        backend,
        synthesizer,
        system_synthesizer,
        store: Arc::new(JsonFileStore::new(storage_dir)),
        events: EventBus::new(EVENT_CAPACITY),
        timing: config.engine_timing(),
    });
    info!("Playback controller initialized");

    let app = api::create_router(AppContext {
        controller: controller.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    controller
        .shutdown()
        .await
        .context("Failed to stop playback controller")?;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
