//! Tradier adapter errors.

use crate::domain::history::HistoryError;

/// Errors raised while setting up or using the Tradier adapters.
///
/// Per-request failures are reported as
/// [`FetchError`](crate::application::ports::FetchError) instead.
#[derive(Debug, thiserror::Error)]
pub enum TradierError {
    /// No API key configured.
    #[error("Tradier API key is missing")]
    MissingApiKey,

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// A request URL could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// History parameters were rejected.
    #[error(transparent)]
    History(#[from] HistoryError),
}
