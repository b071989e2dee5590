//! History request construction.

use reqwest::Url;

use super::error::TradierError;
use crate::domain::history::{HistoryError, HistoryParams, RequestDescriptor};

/// Build the descriptor for one symbol.
///
/// # Errors
///
/// Returns an error if the symbol is blank or the URL cannot be formed.
pub fn build_descriptor(
    base_url: &str,
    symbol: &str,
    params: &HistoryParams,
) -> Result<RequestDescriptor, TradierError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(HistoryError::EmptySymbol.into());
    }

    let endpoint = format!("{base_url}{}", params.interval.path());
    let url = Url::parse_with_params(&endpoint, params.query_pairs(symbol))
        .map_err(|e| TradierError::InvalidRequest(format!("{endpoint}: {e}")))?;

    Ok(RequestDescriptor::new(url))
}

/// Build one descriptor per symbol, sharing `params`, in input order.
///
/// # Errors
///
/// Returns the first descriptor that cannot be built.
pub fn history_requests<S: AsRef<str>>(
    base_url: &str,
    symbols: impl IntoIterator<Item = S>,
    params: &HistoryParams,
) -> Result<Vec<RequestDescriptor>, TradierError> {
    symbols
        .into_iter()
        .map(|symbol| build_descriptor(base_url, symbol.as_ref(), params))
        .collect()
}
