//! Translate Dispatch
//!
//! Batch runner for chat-completions requests over a pool of API keys:
//! 1. Loads keys and retry settings from config
//! 2. Reads one JSON payload per line
//! 3. Dispatches them concurrently with per-key quotas and backoff
//! 4. Writes one JSON result per line to stdout

mod batch;
mod config;
mod error;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use dispatcher::RequestDispatcher;
use key_pool::KeyManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::HttpTransport;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "translate-dispatch",
    about = "Dispatch chat-completions requests over a pool of API keys"
)]
struct Cli {
    /// TOML configuration file (default: $CONFIG_PATH, then translate-dispatch.toml).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// JSONL file with one payload per line; `-` reads stdin.
    #[arg(long, value_name = "FILE", required_unless_present = "health_check")]
    input: Option<PathBuf>,

    /// Requests in flight at once (default: provider.concurrency).
    #[arg(long, value_name = "N", value_parser = parse_concurrency)]
    concurrency: Option<usize>,

    /// Write Prometheus metrics to this file after the batch.
    #[arg(long, value_name = "FILE")]
    metrics_out: Option<PathBuf>,

    /// Send one probe request instead of a batch (needs provider.model).
    #[arg(long, conflicts_with = "input")]
    health_check: bool,
}

fn parse_concurrency(raw: &str) -> std::result::Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("must be a positive integer, got: {raw}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only result lines
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    info!("starting translate-dispatch");

    // Install before any dispatch metric is emitted
    let prometheus_handle = metrics::install_recorder();

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let concurrency = cli.concurrency.unwrap_or(config.provider.concurrency);

    let key_manager = KeyManager::try_new(config.api_keys.clone(), config.dispatch.pool_settings())
        .context("failed to build key pool")?;
    let transport = HttpTransport::with_default_client(
        config.provider.api_url.clone(),
        Duration::from_secs(config.provider.timeout_secs),
    )
    .context("failed to build HTTP transport")?;
    let dispatcher = RequestDispatcher::new(
        Arc::new(key_manager),
        Arc::new(transport),
        config.dispatch.clone(),
    );
    let pool = dispatcher.key_manager();
    let settings = pool.settings();

    info!(
        api_url = %config.provider.api_url,
        keys = pool.len().await,
        max_retries = dispatcher.config().max_retries,
        max_requests_per_window = settings.max_requests_per_window,
        window_secs = settings.window.as_secs(),
        concurrency,
        "configuration loaded"
    );

    if cli.health_check {
        let model = config
            .provider
            .model
            .as_deref()
            .context("--health-check requires provider.model in config")?;
        let healthy = dispatcher.health_check(&batch::probe_payload(model)).await;
        let health = pool.health().await;
        info!(healthy, %health, "health check finished");
        if !healthy {
            anyhow::bail!("health check failed");
        }
        return Ok(());
    }

    let input_path = cli
        .input
        .as_deref()
        .context("--input is required unless --health-check is given")?;
    let input = batch::read_input(input_path).await?;
    let payloads = batch::parse_payloads(&input, config.provider.model.as_deref())?;
    info!(items = payloads.len(), "batch loaded");

    let results = dispatcher.handle_batch(&payloads, concurrency).await;
    batch::write_results(std::io::stdout().lock(), &results)?;

    let stats = pool.stats().await;
    metrics::record_pool_stats(&stats);
    info!(
        total_keys = stats.total_keys,
        active_keys = stats.active_keys,
        rate_limited_keys = stats.rate_limited_keys,
        error_keys = stats.error_keys,
        total_requests = stats.total_requests,
        successful_requests = stats.successful_requests,
        failed_requests = stats.failed_requests,
        success_rate = stats.success_rate,
        "final pool statistics"
    );

    let failed = results.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        warn!(failed, total = results.len(), "some requests did not complete");
    }

    if let Some(path) = cli.metrics_out.as_deref() {
        metrics::write_snapshot(&prometheus_handle, path)
            .with_context(|| format!("failed to write metrics to {}", path.display()))?;
        info!(path = %path.display(), "metrics written");
    }

    Ok(())
}
