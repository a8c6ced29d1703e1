//! Entry point for the premortem daemon. Parses args, loads config and runs until signalled.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use premortem::api_key::validate_api_key;
use premortem::{load_config, Collaborators, Daemon};

/// System monitoring and intelligent diagnostics
#[derive(Debug, Parser)]
#[command(
    name = "premortem",
    disable_version_flag = true,
    after_help = "Example:\n  premortem --config ./config.json"
)]
struct Cli {
    /// Path to configuration file (required)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Check the Anthropic API key before starting
    #[arg(long)]
    validate_key: bool,

    /// Show version information
    #[arg(short = 'v', long)]
    version: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("premortem v{}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some(path) = cli.config else {
        error!("Error: --config argument is required");
        let _ = Cli::command().print_help();
        return ExitCode::FAILURE;
    };

    match run(path, cli.validate_key).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to start daemon: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(path: PathBuf, check_key: bool) -> anyhow::Result<()> {
    info!("Loading configuration from {}", path.display());
    let config = load_config(&path)?;
    info!("Configuration loaded successfully");
    info!("Webhook URL: {}", config.webhook_url);
    info!("Polling interval: {}ms", config.polling_interval.as_millis());

    let deps = Collaborators::production();
    if check_key {
        validate_api_key(&deps.http, &config.anthropic_api_key)
            .await
            .context("API key check")?;
        info!("API key validated");
    }

    let daemon = Daemon::new(config, deps);
    daemon.start().await?;

    shutdown_signal().await;
    info!("Shutdown signal received");
    daemon.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
