//! Streaming session authentication.

use async_trait::async_trait;
use serde::Deserialize;

use super::http_client::TradierHttpClient;
use crate::application::ports::{AuthError, FetchError, SessionTokenSource};
use crate::domain::streaming::SessionToken;

const SESSION_PATH: &str = "markets/events/session";

#[derive(Debug, Deserialize)]
struct SessionResponse {
    stream: StreamSession,
}

#[derive(Debug, Deserialize)]
struct StreamSession {
    sessionid: String,
}

/// Obtains short-lived streaming session tokens.
///
/// A fresh token is requested on every call; failures are not retried.
#[derive(Debug, Clone)]
pub struct SessionAuthenticator {
    client: TradierHttpClient,
}

impl SessionAuthenticator {
    /// Create an authenticator over an existing client.
    #[must_use]
    pub const fn new(client: TradierHttpClient) -> Self {
        Self { client }
    }

    /// Request a streaming session token.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, is rejected, or the response
    /// lacks a non-empty `stream.sessionid`.
    pub async fn authenticate(&self) -> Result<SessionToken, AuthError> {
        let body = self.client.post_json(SESSION_PATH).await.map_err(|e| match e {
            FetchError::Status { status, .. } => AuthError::Rejected { status },
            FetchError::Decode(detail) => AuthError::MalformedResponse(detail),
            other => AuthError::Transport(other.to_string()),
        })?;

        let response: SessionResponse = serde_json::from_value(body)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        if response.stream.sessionid.trim().is_empty() {
            return Err(AuthError::MalformedResponse("empty sessionid".to_string()));
        }

        tracing::debug!("Streaming session created");
        Ok(SessionToken::new(response.stream.sessionid))
    }
}

#[async_trait]
impl SessionTokenSource for SessionAuthenticator {
    async fn session_token(&self) -> Result<SessionToken, AuthError> {
        self.authenticate().await
    }
}
