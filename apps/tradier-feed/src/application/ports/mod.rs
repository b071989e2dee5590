//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `HistoryTransport`: executes one history request descriptor
//! - `SessionTokenSource`: obtains a streaming session token
//! - `StreamConnector` / `StreamConnection`: the streaming socket
//!
//! ## Sinks
//!
//! - `ResponseSink`: receives one result per dispatched descriptor
//! - `WindowSink`: receives each flushed message window

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::history::RequestDescriptor;
use crate::domain::streaming::SessionToken;

// =============================================================================
// Errors
// =============================================================================

/// Failure to fetch or decode one history request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Connection was reset, aborted or refused before a response arrived.
    #[error("connection reset: {0}")]
    ConnectionReset(String),

    /// Any other transport failure (DNS, TLS, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// Server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// Response body is not valid JSON.
    #[error("failed to decode response body: {0}")]
    Decode(String),

    /// Every retry attempt failed with a transient error.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Total attempts made, including the first.
        attempts: u32,
        /// Error from the final attempt.
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// HTTP status of the failure, looking through exhausted retries.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// Failure to obtain a streaming session token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The HTTP call itself failed.
    #[error("session request failed: {0}")]
    Transport(String),

    /// The server refused the request.
    #[error("session request rejected with HTTP {status}")]
    Rejected {
        /// HTTP status code.
        status: u16,
    },

    /// Response was not JSON or lacked `stream.sessionid`.
    #[error("malformed session response: {0}")]
    MalformedResponse(String),
}

/// Failure on the streaming socket.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection closed or dropped.
    #[error("connection closed")]
    Closed,

    /// Dial or read timed out.
    #[error("connection timed out")]
    Timeout,

    /// Frame could not be decoded or was rejected.
    #[error("invalid payload: {0}")]
    Payload(String),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

// =============================================================================
// History
// =============================================================================

/// Executes a history request and decodes the JSON body.
///
/// Implementations apply their own retry policy; the dispatcher only sees
/// the final outcome.
#[async_trait]
pub trait HistoryTransport: Send + Sync {
    /// Fetch one descriptor.
    async fn fetch(&self, descriptor: &RequestDescriptor) -> Result<Value, FetchError>;
}

/// Receives exactly one result per dispatched descriptor.
pub trait ResponseSink {
    /// Accept a decoded payload or the descriptor's final failure.
    fn accept(&mut self, descriptor: &RequestDescriptor, result: Result<Value, FetchError>);
}

impl<F> ResponseSink for F
where
    F: FnMut(&RequestDescriptor, Result<Value, FetchError>),
{
    fn accept(&mut self, descriptor: &RequestDescriptor, result: Result<Value, FetchError>) {
        self(descriptor, result);
    }
}

// =============================================================================
// Streaming
// =============================================================================

/// Obtains a fresh session token for each connection attempt.
#[async_trait]
pub trait SessionTokenSource: Send + Sync {
    /// Request a new token.
    async fn session_token(&self) -> Result<SessionToken, AuthError>;
}

/// Receives each flushed window of raw messages, possibly empty.
pub trait WindowSink {
    /// Deliver one window in arrival order.
    fn deliver(&mut self, window: Vec<String>);
}

impl<F> WindowSink for F
where
    F: FnMut(Vec<String>),
{
    fn deliver(&mut self, window: Vec<String>) {
        self(window);
    }
}

/// Frame read from the streaming socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Text payload, forwarded verbatim.
    Text(String),
    /// Binary payload.
    Binary(Vec<u8>),
    /// Reply to a keepalive ping.
    Pong,
    /// Server close frame.
    Close,
}

/// Opens streaming sockets.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Dial the endpoint; the returned connection is open.
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamConnection>, TransportError>;
}

/// An open streaming socket, exclusively owned by one session.
///
/// `next_frame` must be cancel-safe: the session polls it inside
/// `tokio::select!` alongside its timers.
#[async_trait]
pub trait StreamConnection: Send {
    /// Send a text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Send a keepalive ping.
    async fn send_ping(&mut self) -> Result<(), TransportError>;

    /// Wait for the next frame; `None` once the stream has ended.
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>>;

    /// Close the socket.
    async fn close(&mut self) -> Result<(), TransportError>;
}
