//! brute-guard daemon
//!
//! Loads the configuration, serves the JSON-lines API and shuts down cleanly
//! on SIGINT or SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! brute-guard --config /etc/brute_guard/config.toml
//! RUST_LOG=brute_guard=debug brute-guard
//! brute-guard --check-config
//! ```

use anyhow::{Context, Result};
use brute_guard::app::App;
use brute_guard::config::{Config, DEFAULT_CONFIG_PATH};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Brute-force protection service
#[derive(Parser, Debug)]
#[command(name = "brute-guard")]
#[command(version)]
#[command(about = "Brute-force protection service for login endpoints", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, source) = load_config(cli.config.as_deref())?;
    init_logging(&config.logger.level);

    match &source {
        Some(path) => tracing::info!(path = %path.display(), "configuration loaded"),
        None => tracing::warn!(
            path = DEFAULT_CONFIG_PATH,
            "no configuration file found, using defaults"
        ),
    }
    for notice in &config.fallbacks {
        tracing::warn!("{notice}");
    }

    if cli.check_config {
        println!("configuration OK");
        return Ok(());
    }

    tracing::info!(service = %config.service_name, "starting");
    let app = App::build(config).await?;
    app.run(shutdown_signal()).await?;
    tracing::info!("stopped");
    Ok(())
}

/// Load `path`, or the default location if it exists.
fn load_config(path: Option<&Path>) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = path {
        let config = Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        return Ok((config, Some(path.to_path_buf())));
    }

    let default = Path::new(DEFAULT_CONFIG_PATH);
    if default.exists() {
        let config = Config::load(default)
            .with_context(|| format!("failed to load config from {DEFAULT_CONFIG_PATH}"))?;
        Ok((config, Some(default.to_path_buf())))
    } else {
        Ok((Config::default(), None))
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT (Ctrl+C)"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
