//! brute-guard-cli - interactive management client
//!
//! ```text
//! > add white 192.168.2.0/24
//! OK: 192.168.2.0/24 added (3f0c...)
//! > reset login alice
//! OK: login alice reset
//! > quit
//! ```

use anyhow::{Context, Result};
use brute_guard::cli::command::{self, Command};
use brute_guard::cli::ApiClient;
use brute_guard::config::{ClientConfig, DEFAULT_CLIENT_CONFIG_PATH};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Management client for the brute-guard service
#[derive(Parser, Debug)]
#[command(name = "brute-guard-cli")]
#[command(version)]
#[command(about = "Manage allow/deny lists and reset rate-limit buckets", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Server address, overrides the configuration (host:port)
    #[arg(short, long, value_name = "ADDR")]
    server: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.logger.level))
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let addr = cli.server.unwrap_or_else(|| config.server.address());
    let mut client = ApiClient::connect(&addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;
    tracing::debug!(%addr, "connected");

    println!("{}\n\n{}", config.service_name, command::help());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let cmd = match line.parse::<Command>() {
            Ok(cmd) => cmd,
            Err(e) => {
                println!("{}", command::error_line(e));
                continue;
            }
        };
        let request = match &cmd {
            Command::Quit => break,
            Command::Help => {
                println!("{}", command::help());
                continue;
            }
            other => match other.to_request() {
                Some(request) => request,
                None => continue,
            },
        };

        let response = client
            .call(&request)
            .await
            .context("request to server failed")?;
        match response.error_message() {
            None => println!("OK: {}", cmd.describe(&response)),
            Some(message) => println!("{}", command::error_line(message)),
        }
    }

    println!("\nbrute-guard CLI quit. Bye!");
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    if let Some(path) = path {
        return ClientConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()));
    }
    let default = Path::new(DEFAULT_CLIENT_CONFIG_PATH);
    if default.exists() {
        ClientConfig::load(default)
            .with_context(|| format!("failed to load config from {DEFAULT_CLIENT_CONFIG_PATH}"))
    } else {
        Ok(ClientConfig::default())
    }
}
