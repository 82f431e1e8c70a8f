//! execbox Gateway
//!
//! Serves the WebSocket session endpoint and the one-shot HTTP endpoint.

use anyhow::Context;
use clap::Parser;
use execbox::config::{load_config, load_config_from_path, apply_env_overrides, validate_config};
use execbox::gateway;
use execbox::sandbox::Engine;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "execbox-gateway", version = execbox::VERSION, about = "execbox WebSocket gateway")]
struct Args {
    /// Config file (defaults to the standard config path)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Port
    #[arg(long, short)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let mut config = load_config_from_path(path)?;
            apply_env_overrides(&mut config);
            config
        }
        None => load_config()?,
    };
    if let Some(bind) = args.bind {
        config.gateway.bind = bind;
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }

    execbox::logging::init(&config.log);
    info!("Starting execbox gateway v{}", execbox::VERSION);

    let validation = validate_config(&config);
    for warning in &validation.warnings {
        warn!("Config: {}", warning);
    }
    if !validation.valid {
        for issue in &validation.errors {
            error!("Config: {}", issue);
        }
        anyhow::bail!("invalid configuration");
    }

    info!("Execution environment: {}", config.sandbox.execution_env);
    let engine = Engine::from_config(&config.sandbox)
        .await
        .context("failed to initialize sandbox runtime")?;

    gateway::serve(engine, &config.gateway, shutdown_signal()).await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
