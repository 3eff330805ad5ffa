mod server;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use lisa_config::{config_dir, config_file_path, load_and_prepare, redact, validate, ServerConfig};
use lisa_logging::WorkerGuard;

use server::Server;

#[derive(Parser)]
#[command(name = "lisa-server")]
#[command(about = "Lisa assistant server")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $LISA_CONFIG_DIR/config.yaml or ~/.lisa/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server (default)
    Serve,
    /// Validate the configuration and exit
    Check,
    /// Query the health API of a running server
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = cli
        .config
        .unwrap_or_else(|| config_file_path(&config_dir()));
    let config = load_and_prepare(&path)
        .await
        .with_context(|| format!("Cannot start with config {}", path.display()))?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let _log_guard = init_logging(&config);
            info!(config = %redact(&serde_json::to_value(&config)?), "Effective configuration");
            Server::build(config).await?.run().await?;
        }
        Commands::Check => {
            let report = validate(&config);
            for warning in &report.warnings {
                println!("warning: {warning}");
            }
            println!("{} is valid", path.display());
        }
        Commands::Status => {
            let port = config
                .server
                .web_port
                .context("server.webPort is not configured; no health API to query")?;
            let url = format!("http://127.0.0.1:{port}/api/health");
            match reqwest::get(&url).await {
                Ok(resp) => {
                    let body: serde_json::Value = resp.json().await?;
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Err(_) => println!("Lisa is not running on port {port}"),
            }
        }
    }

    Ok(())
}

fn init_logging(config: &ServerConfig) -> WorkerGuard {
    let log_dir = config
        .logging
        .dir
        .clone()
        .unwrap_or_else(|| config_dir().join("logs"));
    let guard = lisa_logging::init_logger(&log_dir, config.log_level());
    // Validation ran before the subscriber existed; repeat its warnings.
    for warning in validate(config).warnings {
        warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    guard
}
