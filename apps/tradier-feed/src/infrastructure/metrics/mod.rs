//! Prometheus Metrics Module
//!
//! Exposes feed metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Requests**: History requests by outcome, retry attempts
//! - **Stream**: Messages received, windows flushed, connection state
//! - **Errors**: Stream errors by shutdown classification
//!
//! # Integration
//!
//! When a metrics port is configured, a scrape endpoint is served on it.
//! Without a recorder installed, the recording functions are no-ops.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

static INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Install the Prometheus recorder and serve it on `port`.
///
/// Port 0 disables metrics. Calling again after a successful install is a
/// no-op. Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the recorder or listener cannot be installed.
pub fn init_metrics(port: u16) -> Result<Option<SocketAddr>, BuildError> {
    if port == 0 {
        return Ok(None);
    }
    if let Some(addr) = INSTALLED.get() {
        return Ok(Some(*addr));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    register_metrics();
    let _ = INSTALLED.set(addr);
    tracing::info!(%addr, "Metrics endpoint listening");
    Ok(Some(addr))
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "tradier_feed_history_requests_total",
        "History requests by final outcome"
    );
    describe_counter!(
        "tradier_feed_history_retries_total",
        "History request retry attempts by cause"
    );

    describe_counter!(
        "tradier_feed_stream_messages_total",
        "Messages received from the market events stream"
    );
    describe_histogram!(
        "tradier_feed_stream_window_size",
        "Messages delivered per flushed window"
    );
    describe_gauge!(
        "tradier_feed_stream_connected",
        "1 while a streaming session is connected"
    );
    describe_counter!(
        "tradier_feed_stream_errors_total",
        "Stream errors by type"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record the final outcome of one history request.
pub fn record_request(success: bool) {
    counter!(
        "tradier_feed_history_requests_total",
        "outcome" => if success { "success" } else { "failure" }
    )
    .increment(1);
}

/// Record a history request retry.
pub fn record_retry(cause: &'static str) {
    counter!("tradier_feed_history_retries_total", "cause" => cause).increment(1);
}

/// Record a message received from the stream.
pub fn record_stream_message() {
    counter!("tradier_feed_stream_messages_total").increment(1);
}

/// Record a flushed window.
#[allow(clippy::cast_precision_loss)]
pub fn record_window(size: usize) {
    histogram!("tradier_feed_stream_window_size").record(size as f64);
}

/// Update the connection gauge.
pub fn set_stream_connected(connected: bool) {
    gauge!("tradier_feed_stream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record a stream error.
pub fn record_stream_error(error_type: &'static str) {
    counter!("tradier_feed_stream_errors_total", "error_type" => error_type).increment(1);
}
