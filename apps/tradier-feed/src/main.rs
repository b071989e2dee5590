//! Tradier Feed Binary
//!
//! Pulls historical bars or records the live market events stream.
//!
//! # Usage
//!
//! ```bash
//! FEED_MODE=history FEED_SYMBOLS=AAPL,MSFT cargo run --bin tradier-feed
//! FEED_MODE=stream FEED_SYMBOLS=SPY FEED_STOPTIME="2030-01-02 16:00:00" cargo run --bin tradier-feed
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `TRADIER_API_KEY`: Tradier API key
//! - `FEED_SYMBOLS`: Comma-separated symbols
//! - `FEED_STOPTIME`: Stream stop time, RFC 3339 or local `YYYY-MM-DD HH:MM:SS` (stream mode)
//!
//! ## Optional
//! - `FEED_MODE`: history | stream (default: history)
//! - `TRADIER_ENV`: brokerage | sandbox (default: brokerage)
//! - `TRADIER_REQUEST_DELAY_MS`: Minimum delay between history requests (default: 250)
//! - `TRADIER_RETRY_BACKOFF_MS`: First retry delay (default: 4000)
//! - `TRADIER_RETRY_STATUSES`: Statuses to retry (default: 403)
//! - `FEED_INTERVAL`, `FEED_START`, `FEED_END`: History parameters
//! - `FEED_FILTER`: Comma-separated stream payload types (default: all)
//! - `FEED_WINDOW_SECS`: Stream window width (default: 60)
//! - `FEED_OUTPUT`: Output file, appended (default: stdout)
//! - `FEED_METRICS_PORT`: Prometheus port (default: 0, disabled)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info); logs go to stderr

use std::sync::Arc;

use anyhow::Context;
use tradier_feed::application::ports::WindowSink;
use tradier_feed::application::services::{Dispatcher, StreamingClient};
use tradier_feed::infrastructure::config::{FeedConfig, FeedMode};
use tradier_feed::infrastructure::metrics::init_metrics;
use tradier_feed::infrastructure::sink::JsonLinesSink;
use tradier_feed::infrastructure::telemetry;
use tradier_feed::infrastructure::tradier::{
    SessionAuthenticator, TradierHttpClient, WebSocketConnector, history_requests,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let telemetry = telemetry::init();
    tracing::debug!(otlp = telemetry.exporting(), "Telemetry initialized");

    let config = FeedConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    init_metrics(config.metrics_port).context("failed to start metrics endpoint")?;

    let mut sink = match &config.output {
        Some(path) => JsonLinesSink::open(path)?,
        None => JsonLinesSink::stdout(),
    };
    let http = TradierHttpClient::new(&config.tradier())?;

    let result = match config.mode {
        FeedMode::History => run_history(&config, http, &mut sink).await,
        FeedMode::Stream => run_stream(&config, http, &mut sink).await,
    };

    sink.flush()?;
    tracing::info!(lines = sink.lines(), "Output written");
    drop(telemetry);
    result
}

async fn run_history(
    config: &FeedConfig,
    http: TradierHttpClient,
    sink: &mut JsonLinesSink,
) -> anyhow::Result<()> {
    let descriptors = history_requests(http.base_url(), &config.symbols, &config.history)?;

    let mut dispatcher = Dispatcher::new(http);
    dispatcher.extend(descriptors);
    let summary = dispatcher.drain(sink, config.http.request_delay).await;

    if summary.failed > 0 {
        tracing::warn!(
            failed = summary.failed,
            total = summary.total(),
            "Some history requests failed"
        );
    }
    Ok(())
}

async fn run_stream(
    config: &FeedConfig,
    http: TradierHttpClient,
    sink: &mut JsonLinesSink,
) -> anyhow::Result<()> {
    let stoptime = config
        .stoptime
        .context("FEED_STOPTIME is required in stream mode")?;

    let client = StreamingClient::new(
        config.stream.clone(),
        Arc::new(SessionAuthenticator::new(http)),
        Arc::new(WebSocketConnector::default()),
    );
    client.register_subscription(&config.symbols, &config.filter, config.subscription)?;

    let reason = client
        .connect(stoptime, |window: Vec<String>| sink.deliver(window))
        .await?;

    if reason.is_error() {
        anyhow::bail!("stream ended: {reason}");
    }
    tracing::info!(reason = %reason, "Stream finished");
    Ok(())
}

fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

fn log_config(config: &FeedConfig) {
    tracing::info!(
        mode = ?config.mode,
        environment = config.http.environment.as_str(),
        symbols = config.symbols.len(),
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        base_url = %config.tradier().base_url(),
        stream_url = %config.stream.url,
        "Tradier endpoints"
    );
}
