use clap::{Parser, Subcommand};
use config::{Config, ConfigError};
use instrument::metrics_defs::ALL_METRICS;
use shared::statsd::{MetricsError, init_statsd};
use std::path::PathBuf;
use std::process;

mod config;
mod logging;

#[derive(Parser)]
#[command(name = "cir-proxy", about = "Serves survey instruments at a requested validator version")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the proxy. Settings come from the environment unless a config file is given.
    Run {
        #[arg(long)]
        config_file: Option<PathBuf>,
    },
}

#[derive(thiserror::Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Run(#[from] instrument::RunError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        CliCommand::Run { config_file } => run(config_file),
    };

    if let Err(e) = result {
        eprintln!("cir-proxy failed: {e}");
        process::exit(1);
    }
}

fn run(config_file: Option<PathBuf>) -> Result<(), StartupError> {
    let config = match config_file {
        Some(path) => Config::from_file(&path)?,
        None => Config::from_env()?,
    };

    let _sentry = logging::init(&config.logging);

    if let Some(metrics) = &config.metrics {
        init_statsd(metrics, "cir_proxy", ALL_METRICS)?;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(instrument::run(config.instrument, shutdown_signal()))?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
