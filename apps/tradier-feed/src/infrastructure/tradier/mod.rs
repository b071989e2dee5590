//! Tradier API Adapters
//!
//! Implementations of the outbound ports against Tradier's REST and
//! streaming endpoints:
//! - `TradierHttpClient`: authenticated JSON client with retry, used as the
//!   dispatcher's `HistoryTransport`
//! - `SessionAuthenticator`: streaming session token source
//! - `WebSocketConnector`: `tokio-tungstenite` stream connector
//! - `endpoints`: history request descriptor construction

mod auth;
mod config;
pub mod endpoints;
mod error;
mod http_client;
mod retry;
mod websocket;

pub use auth::SessionAuthenticator;
pub use config::{Environment, TradierConfig};
pub use endpoints::{build_descriptor, history_requests};
pub use error::TradierError;
pub use http_client::TradierHttpClient;
pub use retry::{RetryBackoff, RetryConfig};
pub use websocket::{TungsteniteConnection, WebSocketConnector};
