//! REST API for planning and validating subscription escrow transitions.
//!
//! Usage:
//!   cargo run --bin api -- --config escrow.toml
//!
//! The service holds no chain connection: callers post the escrow state they
//! read and receive plans or verdicts back.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use prorated_sub_escrow::api::{AppState, build_router};
use prorated_sub_escrow::config::ServiceConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Subscription escrow API server
#[derive(Parser, Debug)]
#[command(name = "api")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the service configuration file
    #[arg(short, long, default_value = "escrow.toml")]
    config: PathBuf,

    /// Listen address, overrides `listen` from the config file
    #[arg(long)]
    listen: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let listen = args.listen.unwrap_or(config.listen);

    info!(
        script = %config.params.script_hash,
        period_ms = config.params.period_ms,
        marker_disposal = ?config.params.marker_disposal,
        "protocol parameters loaded"
    );

    let app = build_router(AppState::new(config.params));
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!(%listen, "listening");
    info!("endpoints: GET /params, POST /datum/decode, /datum/encode, /status, /plan, /validate");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
