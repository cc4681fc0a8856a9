use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use firegate::config::{FiregateConfig, LogFormat, LoggingConfig};
use firegate::mcp::{self, HttpFirecrawlApi};

/// Rate-limited MCP server for the Firecrawl API.
#[derive(Debug, Parser)]
#[command(name = "firegate", version, about)]
struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `firegate=trace`. `RUST_LOG` takes precedence
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Firecrawl API base URL
    #[arg(long)]
    api_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config =
        FiregateConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    if let Some(url) = args.api_url {
        config.firecrawl.api_url = url;
    }
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging);

    info!("Starting Firegate MCP server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        api_url = %config.firecrawl.api_url,
        api_key_set = config.firecrawl.api_key.is_some(),
        algorithm = ?config.algorithm,
        "Configuration loaded"
    );

    let api = Arc::new(HttpFirecrawlApi::new(&config.firecrawl)?);
    let server = mcp::build_server(&config, api)?;

    // Serve until stdin closes or a shutdown signal arrives
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Firegate MCP server stopped");
    Ok(())
}

/// Log to stderr; stdout carries JSON-RPC.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match logging.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_ansi(false),
            )
            .init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
