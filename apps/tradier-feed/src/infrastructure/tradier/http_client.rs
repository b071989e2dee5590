//! HTTP client wrapper with retry logic.

use std::error::Error as StdError;
use std::io::ErrorKind;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;

use super::config::TradierConfig;
use super::error::TradierError;
use super::retry::{RetryBackoff, RetryConfig};
use crate::application::ports::{FetchError, HistoryTransport};
use crate::domain::history::RequestDescriptor;
use crate::infrastructure::metrics;

/// Authenticated JSON client for the Tradier REST API.
#[derive(Debug, Clone)]
pub struct TradierHttpClient {
    client: Client,
    base_url: String,
    retry: RetryConfig,
}

impl TradierHttpClient {
    /// Create a new HTTP client from config.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is blank or the client cannot be built.
    pub fn new(config: &TradierConfig) -> Result<Self, TradierError> {
        if config.api_key.trim().is_empty() {
            return Err(TradierError::MissingApiKey);
        }

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key.trim()))
            .map_err(|e| TradierError::ClientBuild(e.to_string()))?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| TradierError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            retry: config.retry.clone(),
        })
    }

    /// REST base URL, with trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET an absolute URL and decode the JSON body, retrying transient
    /// failures.
    ///
    /// # Errors
    ///
    /// Returns the first non-transient failure, or
    /// [`FetchError::RetriesExhausted`] once every retry has failed.
    pub async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let mut backoff = RetryBackoff::new(&self.retry);

        loop {
            let error = match self.get_once(url).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let Some(cause) = self.transient_cause(&error) else {
                return Err(error);
            };

            let Some(delay) = backoff.next_delay() else {
                return Err(FetchError::RetriesExhausted {
                    attempts: backoff.attempts(),
                    last: Box::new(error),
                });
            };

            tracing::warn!(
                url,
                error = %error,
                delay_ms = delay.as_millis(),
                attempt = backoff.attempts(),
                "Transient error, retrying"
            );
            metrics::record_retry(cause);
            tokio::time::sleep(delay).await;
        }
    }

    /// POST to a path under the base URL and decode the JSON body.
    ///
    /// Not retried.
    ///
    /// # Errors
    ///
    /// Returns a network, status or decode failure.
    pub async fn post_json(&self, path: &str) -> Result<Value, FetchError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(classify_transport_error)?;
        decode_response(response).await
    }

    async fn get_once(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_transport_error)?;
        decode_response(response).await
    }

    fn transient_cause(&self, error: &FetchError) -> Option<&'static str> {
        match error {
            FetchError::ConnectionReset(_) => Some("connection_reset"),
            FetchError::Status { status, .. } if self.retry.is_retryable_status(*status) => {
                Some("status")
            }
            _ => None,
        }
    }
}

#[async_trait]
impl HistoryTransport for TradierHttpClient {
    async fn fetch(&self, descriptor: &RequestDescriptor) -> Result<Value, FetchError> {
        self.get_json(descriptor.url()).await
    }
}

async fn decode_response(response: reqwest::Response) -> Result<Value, FetchError> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FetchError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let text = response.text().await.map_err(classify_transport_error)?;
    serde_json::from_str(&text).map_err(|e| FetchError::Decode(e.to_string()))
}

fn classify_transport_error(error: reqwest::Error) -> FetchError {
    if error.is_connect() || is_connection_reset(&error) {
        FetchError::ConnectionReset(error.to_string())
    } else {
        FetchError::Network(error.to_string())
    }
}

/// Walk the source chain looking for a reset-like I/O error.
fn is_connection_reset(error: &(dyn StdError + 'static)) -> bool {
    let mut source = Some(error);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::BrokenPipe
            ) {
                return true;
            }
        }
        source = err.source();
    }
    false
}
