use std::collections::BTreeMap;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cadence::config::{CadenceConfig, LogFormat};
use cadence::ratelimit::{category_for_endpoint, CleanupTask, RateLimitResult, RateLimiter, ANONYMOUS};

/// Sliding-window request throttling for the practice scheduling client.
#[derive(Debug, Parser)]
#[command(name = "cadence", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log filter directive; overrides RUST_LOG and the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read `<endpoint> [user_id]` lines from stdin and print one decision per line
    Replay,
    /// Print the effective category table
    Categories,
}

/// One replayed request as printed to stdout.
#[derive(Debug, Serialize)]
struct ReplayRecord<'a> {
    endpoint: &'a str,
    category: &'a str,
    identifier: &'a str,
    #[serde(flatten)]
    result: RateLimitResult,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CadenceConfig::load(cli.config.as_deref())?;

    init_tracing(
        cli.log_level.as_deref(),
        &config.logging.level,
        cli.log_format.unwrap_or(config.logging.format),
    )?;

    info!("Starting Cadence");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let limiter = Arc::new(RateLimiter::from_config(&config.limiter)?);
    info!(categories = limiter.categories().len(), "Rate limiter initialized");

    match cli.command {
        Command::Categories => {
            let table: BTreeMap<_, _> = limiter.categories().into_iter().collect();
            print!("{}", serde_yaml::to_string(&table)?);
        }
        Command::Replay => {
            let cleanup = CleanupTask::spawn(limiter.clone(), config.limiter.cleanup_interval());

            let outcome = tokio::select! {
                res = replay(limiter.clone()) => res,
                _ = shutdown_signal() => Ok(()),
            };

            if cleanup.is_finished() {
                warn!("Rate limit cleanup task exited before shutdown");
            }
            cleanup.shutdown().await;
            outcome?;
        }
    }

    info!("Cadence stopped");
    Ok(())
}

/// Install the global subscriber. Logs go to stderr; stdout carries decisions.
fn init_tracing(cli_level: Option<&str>, config_level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(config_level))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
    Ok(())
}

/// Feed stdin through the limiter until EOF.
async fn replay(limiter: Arc<RateLimiter>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut count = 0u64;

    while let Some(line) = lines.next_line().await? {
        let mut fields = line.split_whitespace();
        let Some(endpoint) = fields.next() else {
            continue;
        };
        let user_id = fields.next();

        let record = ReplayRecord {
            endpoint,
            category: category_for_endpoint(endpoint),
            identifier: user_id.unwrap_or(ANONYMOUS),
            result: limiter.check_endpoint(endpoint, user_id),
        };

        let mut out = serde_json::to_vec(&record)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        count += 1;
    }

    stdout.flush().await?;
    info!(requests = count, entries = limiter.entry_count(), "Replay finished");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
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
