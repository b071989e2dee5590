//! Tradier adapter configuration.

use std::str::FromStr;
use std::time::Duration;

use super::retry::RetryConfig;

/// Tradier API environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Production brokerage API.
    #[default]
    Brokerage,
    /// Sandbox API (delayed data).
    Sandbox,
}

impl Environment {
    /// REST base URL, with trailing slash.
    #[must_use]
    pub const fn base_url(&self) -> &'static str {
        match self {
            Self::Brokerage => "https://api.tradier.com/v1/",
            Self::Sandbox => "https://sandbox.tradier.com/v1/",
        }
    }

    /// Environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Brokerage => "brokerage",
            Self::Sandbox => "sandbox",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "brokerage" | "live" | "production" => Ok(Self::Brokerage),
            "sandbox" | "paper" => Ok(Self::Sandbox),
            other => Err(format!("unknown Tradier environment: {other}")),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the Tradier HTTP client.
#[derive(Clone)]
pub struct TradierConfig {
    /// Bearer API key.
    pub api_key: String,
    /// Target environment.
    pub environment: Environment,
    /// Base URL override (tests, proxies). Must end with `/`.
    pub base_url: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy.
    pub retry: RetryConfig,
}

impl TradierConfig {
    /// Create a configuration with default timeout and retry policy.
    #[must_use]
    pub fn new(api_key: impl Into<String>, environment: Environment) -> Self {
        Self {
            api_key: api_key.into(),
            environment,
            base_url: None,
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    /// Point the client at another base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Effective REST base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
    }
}

impl std::fmt::Debug for TradierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradierConfig")
            .field("api_key", &"[REDACTED]")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url())
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}
