//! lms-server - multi-tenant learning management backend
//!
//! Startup order:
//! 1. Parse CLI, load bootstrap TOML, initialize tracing
//! 2. Resolve root folder and create its layout
//! 3. Open (or create) the control database, purge expired sessions
//! 4. Serve HTTP until Ctrl+C / SIGTERM

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lms_common::config::{resolve_config_path, resolve_root_folder, RootLayout, TomlConfig};
use lms_common::events::EventBus;
use lms_server::db::sessions::purge_expired_sessions;
use lms_server::{build_router, AppState, EVENT_BUS_CAPACITY};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for lms-server
#[derive(Parser, Debug)]
#[command(name = "lms-server")]
#[command(about = "Multi-tenant learning management backend")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides TOML)
    #[arg(short, long, env = "LMS_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides TOML)
    #[arg(short, long, env = "LMS_BIND")]
    bind: Option<String>,

    /// Root folder holding control.db and tenant databases
    #[arg(short, long, env = "LMS_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Bootstrap TOML config file
    #[arg(short, long, env = "LMS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config_found = config_path.exists();
    let config = TomlConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    // RUST_LOG wins over the TOML level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting LMS server (lms-server) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if config_found {
        info!("Config: {}", config_path.display());
    } else {
        info!("Config: {} not found, using defaults", config_path.display());
    }

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    let layout = RootLayout::new(root_folder);
    layout
        .ensure_directories()
        .context("Failed to create root folder layout")?;
    info!("Root folder: {}", layout.root().display());

    let db = lms_common::db::init_control_database(&layout.control_db_path())
        .await
        .context("Failed to initialize control database")?;
    info!("✓ Control database ready");

    let purged = purge_expired_sessions(&db)
        .await
        .context("Failed to purge expired sessions")?;
    if purged > 0 {
        info!("Purged {} expired sessions", purged);
    }

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let state = AppState::new(db, layout, event_bus, config.auth.token_ttl_hours);
    let app = build_router(state);

    let bind = args.bind.unwrap_or(config.bind_address);
    let port = args.port.unwrap_or(config.port);
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("lms-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
