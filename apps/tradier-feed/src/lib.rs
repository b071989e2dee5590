#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Tradier Feed - Market Data Client
//!
//! Pulls historical market data from Tradier's REST API without tripping its
//! rate limit, and records the live market events stream in fixed time
//! windows.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Request and session types with no I/O
//!   - `history`: Intervals, history parameters, request descriptors
//!   - `streaming`: Connection state, message windows, shutdown reasons
//!   - `subscription`: Symbols, filter and the subscription payload
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: HTTP transport, token source, stream connection, sinks
//!   - `services`: Dispatcher, streaming client, heartbeat
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `tradier`: REST client with retry, session auth, WebSocket connector
//!   - `sink`: JSON lines output
//!   - `config`: Environment configuration
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//! symbols ──► descriptors ──► Dispatcher ──(rate limit, retry)──► sink
//!
//! session token ──► WebSocket ──► window ──(every windowDuration)──► sink
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Request and session types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::history::{HistoryError, HistoryParams, Interval, RequestDescriptor};
pub use domain::streaming::{SessionToken, ShutdownReason, StreamState};
pub use domain::subscription::{Subscription, SubscriptionError, SubscriptionSettings};

// Ports
pub use application::ports::{
    AuthError, FetchError, HistoryTransport, InboundFrame, ResponseSink, SessionTokenSource,
    StreamConnection, StreamConnector, TransportError, WindowSink,
};

// Services
pub use application::services::{
    Dispatcher, DrainSummary, HeartbeatConfig, KeepaliveConfig, StreamError, StreamSettings,
    StreamingClient,
};

// Tradier adapters
pub use infrastructure::tradier::{
    Environment, RetryConfig, SessionAuthenticator, TradierConfig, TradierError,
    TradierHttpClient, WebSocketConnector,
};

// Configuration
pub use infrastructure::config::{ConfigError, FeedConfig, FeedMode};

// Output
pub use infrastructure::sink::{JsonLinesSink, SinkError};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
