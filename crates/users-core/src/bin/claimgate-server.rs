//! ClaimGate HTTP server

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use claimgate_infra_common::logging::{LoggingConfig, log_welcome, parse_log_level, setup_logging};
use claimgate_users_core::{UsersConfig, api::create_router, init};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "claimgate-server", version, about = "Claim-guarded user API")]
struct Args {
    /// Configuration file; `CLAIMGATE_*` environment variables are used when omitted
    #[arg(short, long, env = "CLAIMGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding `api_bind_address`
    #[arg(short, long)]
    bind: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = parse_log_level(&args.log_level)?;
    setup_logging(LoggingConfig::new(level).with_json(args.json_logs))?;
    log_welcome("claimgate-server", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => UsersConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => UsersConfig::from_env().context("loading configuration from environment")?,
    };
    let bind = args.bind.unwrap_or_else(|| config.api_bind_address.clone());
    let sweep_interval = config.cache_sweep_interval();

    let service = Arc::new(init(config).await?);
    let _sweeper = sweep_interval.and_then(|period| service.engine().cache().spawn_sweeper(period));

    let app = create_router(service);
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    info!(address = %listener.local_addr()?, "ClaimGate API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("ClaimGate API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
