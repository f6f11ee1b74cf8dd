//! Runs the gateway server.
//!
//! Usage:
//!
//! ```text
//! meshgate [--config <path>] [--bind <addr>]
//! ```
//!
//! Settings come from the TOML file named by `--config` (or
//! `MESHGATE_CONFIG`), then `MESHGATE_*` environment overrides, then the
//! command line. A `.env` file in the working directory is read first.

use clap::Parser;
use meshgate::config::GatewayConfig;
use meshgate::server::{Gateway, GatewayStack, in_memory_gateway, postgres_gateway};
use meshgate::telemetry::init_tracing;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "meshgate", version, about = "MCP gateway for provider APIs")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "MESHGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding `[server] bind`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = GatewayConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
        config.validate()?;
    }
    init_tracing(&config.log)?;
    match dotenv {
        Ok(path) => debug!(path = %path.display(), "loaded environment file"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!(error = %err, "environment file ignored"),
    }

    match config.storage.database_url.clone() {
        Some(url) => serve(postgres_gateway(&config, &url)?, &config).await,
        None => serve(in_memory_gateway(&config)?, &config).await,
    }
}

async fn serve<K: GatewayStack>(gateway: Gateway<K>, config: &GatewayConfig) -> Result<(), BoxError> {
    let addr = config.server.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;
    let (stop, shutdown) = watch::channel(false);
    let workers = gateway.spawn_consumers(&shutdown);
    info!(
        addr = %addr,
        mcp_path = %config.server.mcp_path,
        workers = workers.len(),
        "gateway listening"
    );

    axum::serve(listener, gateway.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("draining ingestion workers");
    if stop.send(true).is_err() {
        debug!("ingestion workers already stopped");
    }
    for worker in workers {
        if let Err(err) = worker.await {
            warn!(error = %err, "ingestion worker ended abnormally");
        }
    }
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
