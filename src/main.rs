use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use team_portal::app::{app, AppState, Services};
use team_portal::config;
use team_portal::persistence::FileStore;
use team_portal::remote::RemoteClient;

#[derive(Parser)]
#[command(name = "team-portal")]
#[command(about = "Team portal shell - session guard, route restore and offline sync")]
#[command(version)]
struct Cli {
    #[arg(long, help = "Address to bind (overrides PORTAL_BIND)")]
    bind: Option<String>,

    #[arg(long, help = "Port to listen on (overrides PORTAL_PORT)")]
    port: Option<u16>,

    #[arg(long, help = "Directory for persisted session state (overrides PORTAL_DATA_DIR)")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up BACKEND_URL, BACKEND_JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = config::config().clone();
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    tracing::info!("Starting team portal in {:?} mode", config.environment);

    let state_file = config.storage.state_file();
    let store = FileStore::open(&state_file)
        .with_context(|| format!("failed to open state file {}", state_file.display()))?;
    let client = RemoteClient::new(&config.backend).context("failed to build backend client")?;

    let bind_addr = format!("{}:{}", config.server.bind, config.server.port);
    let state = AppState::start(config, Services::remote(Arc::new(store), client));

    // Resolve the stored session in the background; guards answer "loading" until it settles
    let manager = state.manager.clone();
    tokio::spawn(async move {
        manager.restore().await;
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Team portal listening on http://{}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
