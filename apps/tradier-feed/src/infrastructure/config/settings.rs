//! Feed Configuration Settings
//!
//! Configuration for the feed binary, loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, Utc};

use crate::application::services::{HeartbeatConfig, KeepaliveConfig, StreamSettings};
use crate::domain::history::{HistoryParams, Interval};
use crate::domain::subscription::SubscriptionSettings;
use crate::infrastructure::tradier::{Environment, RetryConfig, TradierConfig};

/// What the binary does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedMode {
    /// Drain one history request per symbol.
    #[default]
    History,
    /// Stream market events until the stop time.
    Stream,
}

impl FromStr for FeedMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "history" => Ok(Self::History),
            "stream" => Ok(Self::Stream),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Tradier API credentials.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String) -> Self {
        Self { api_key }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// REST client settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// API environment.
    pub environment: Environment,
    /// Base URL override.
    pub base_url: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Minimum delay between history requests.
    pub request_delay: Duration,
    /// Retry policy.
    pub retry: RetryConfig,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            base_url: None,
            timeout: Duration::from_secs(30),
            request_delay: Duration::from_millis(250),
            retry: RetryConfig::default(),
        }
    }
}

/// Complete feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Run mode.
    pub mode: FeedMode,
    /// API credentials.
    pub credentials: Credentials,
    /// REST client settings.
    pub http: HttpSettings,
    /// Symbols to fetch or stream.
    pub symbols: Vec<String>,
    /// History parameters (history mode).
    pub history: HistoryParams,
    /// Stream payload filter (stream mode, empty = all).
    pub filter: Vec<String>,
    /// Subscription flags (stream mode).
    pub subscription: SubscriptionSettings,
    /// Streaming client settings (stream mode).
    pub stream: StreamSettings,
    /// When to close the stream (required in stream mode).
    pub stoptime: Option<DateTime<Utc>>,
    /// Output file (stdout when unset).
    pub output: Option<PathBuf>,
    /// Prometheus port (0 = disabled).
    pub metrics_port: u16,
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or a value is
    /// invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or a value is
    /// invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("TRADIER_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("TRADIER_API_KEY".to_string()))?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::EmptyValue("TRADIER_API_KEY".to_string()));
        }

        let mode = parse_typed(&lookup, "FEED_MODE")?.unwrap_or_default();

        let symbols = parse_list(lookup("FEED_SYMBOLS").as_deref());
        if symbols.is_empty() {
            return Err(ConfigError::MissingEnvVar("FEED_SYMBOLS".to_string()));
        }

        let http_defaults = HttpSettings::default();
        let retry_defaults = RetryConfig::default();
        let http = HttpSettings {
            environment: parse_typed(&lookup, "TRADIER_ENV")?.unwrap_or_default(),
            base_url: lookup("TRADIER_BASE_URL").filter(|v| !v.trim().is_empty()),
            timeout: parse_env_duration_secs(
                &lookup,
                "TRADIER_REQUEST_TIMEOUT_SECS",
                http_defaults.timeout,
            ),
            request_delay: parse_env_duration_millis(
                &lookup,
                "TRADIER_REQUEST_DELAY_MS",
                http_defaults.request_delay,
            ),
            retry: RetryConfig {
                max_retries: parse_env_u32(&lookup, "TRADIER_RETRY_MAX", retry_defaults.max_retries),
                backoff_base: parse_env_duration_millis(
                    &lookup,
                    "TRADIER_RETRY_BACKOFF_MS",
                    retry_defaults.backoff_base,
                ),
                retry_statuses: parse_statuses(&lookup, "TRADIER_RETRY_STATUSES")?
                    .unwrap_or(retry_defaults.retry_statuses),
                ..RetryConfig::default()
            },
        };

        let interval: Interval = parse_typed(&lookup, "FEED_INTERVAL")?.unwrap_or_default();
        let mut history = HistoryParams::new(interval);
        if let Some(start) = lookup("FEED_START").filter(|v| !v.trim().is_empty()) {
            history = history.with_start(start.trim());
        }
        if let Some(end) = lookup("FEED_END").filter(|v| !v.trim().is_empty()) {
            history = history.with_end(end.trim());
        }

        let subscription_defaults = SubscriptionSettings::default();
        let subscription = SubscriptionSettings {
            valid_only: parse_env_bool(&lookup, "FEED_VALID_ONLY", subscription_defaults.valid_only),
            linebreak: parse_env_bool(&lookup, "FEED_LINEBREAK", subscription_defaults.linebreak),
            advanced_details: parse_env_bool(
                &lookup,
                "FEED_ADVANCED_DETAILS",
                subscription_defaults.advanced_details,
            ),
        };

        let stream_defaults = StreamSettings::default();
        let keepalive_defaults = KeepaliveConfig::default();
        let ping_interval = parse_env_duration_secs(
            &lookup,
            "FEED_PING_INTERVAL_SECS",
            keepalive_defaults.ping_interval,
        );
        let stream = StreamSettings {
            url: lookup("TRADIER_STREAM_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(stream_defaults.url),
            window: parse_env_duration_secs(&lookup, "FEED_WINDOW_SECS", stream_defaults.window),
            heartbeat: HeartbeatConfig::new(parse_env_duration_secs(
                &lookup,
                "FEED_HEARTBEAT_SECS",
                stream_defaults.heartbeat.interval,
            )),
            keepalive: (!ping_interval.is_zero()).then(|| KeepaliveConfig {
                ping_interval,
                ping_timeout: parse_env_duration_secs(
                    &lookup,
                    "FEED_PING_TIMEOUT_SECS",
                    keepalive_defaults.ping_timeout,
                ),
            }),
            handle_interrupt: true,
        };
        if stream.window.is_zero() {
            return Err(ConfigError::Invalid {
                key: "FEED_WINDOW_SECS".to_string(),
                reason: "window must be at least one second".to_string(),
            });
        }

        let stoptime = match lookup("FEED_STOPTIME").filter(|v| !v.trim().is_empty()) {
            Some(value) => Some(parse_stoptime(&value).map_err(|reason| ConfigError::Invalid {
                key: "FEED_STOPTIME".to_string(),
                reason,
            })?),
            None => None,
        };
        if mode == FeedMode::Stream && stoptime.is_none() {
            return Err(ConfigError::MissingEnvVar("FEED_STOPTIME".to_string()));
        }

        Ok(Self {
            mode,
            credentials: Credentials::new(api_key.trim().to_string()),
            http,
            symbols,
            history,
            filter: parse_list(lookup("FEED_FILTER").as_deref()),
            subscription,
            stream,
            stoptime,
            output: lookup("FEED_OUTPUT")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            metrics_port: parse_env_u16(&lookup, "FEED_METRICS_PORT", 0),
        })
    }

    /// Tradier client configuration.
    #[must_use]
    pub fn tradier(&self) -> TradierConfig {
        let config = TradierConfig::new(self.credentials.api_key(), self.http.environment)
            .with_timeout(self.http.timeout)
            .with_retry(self.http.retry.clone());
        match &self.http.base_url {
            Some(base_url) => config.with_base_url(base_url.clone()),
            None => config,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Variable name.
        key: String,
        /// Parse failure.
        reason: String,
    },
}

/// Parse a stop time: RFC 3339, or a local `YYYY-MM-DD HH:MM:SS`.
///
/// # Errors
///
/// Returns a description of the failure.
pub fn parse_stoptime(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| format!("{value}: {e}"))?;
    naive
        .and_local_timezone(Local)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| format!("{value}: not a valid local time"))
}

fn parse_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_typed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .map(|v| {
            v.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key: key.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_statuses(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Vec<u16>>, ConfigError> {
    let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    parse_list(Some(&value))
        .iter()
        .map(|status| {
            status.parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: key.to_string(),
                reason: format!("{status}: {e}"),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn parse_env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key).map_or(default, |v| {
        match v.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        }
    })
}

fn parse_env_u16(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u16) -> u16 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u32) -> u32 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::TimeZone;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<FeedConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        FeedConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [("TRADIER_API_KEY", "key123"), ("FEED_SYMBOLS", "AAPL")];

    #[test]
    fn missing_api_key() {
        let err = config(&[("FEED_SYMBOLS", "AAPL")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "TRADIER_API_KEY"));
    }

    #[test]
    fn empty_api_key() {
        let err = config(&[("TRADIER_API_KEY", "  "), ("FEED_SYMBOLS", "AAPL")]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }

    #[test]
    fn missing_symbols() {
        let err = config(&[("TRADIER_API_KEY", "k"), ("FEED_SYMBOLS", " , ")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "FEED_SYMBOLS"));
    }

    #[test]
    fn defaults() {
        let config = config(&REQUIRED).unwrap();
        assert_eq!(config.mode, FeedMode::History);
        assert_eq!(config.http.environment, Environment::Brokerage);
        assert_eq!(config.http.request_delay, Duration::from_millis(250));
        assert_eq!(config.http.timeout, Duration::from_secs(30));
        assert_eq!(config.http.retry, RetryConfig::default());
        assert_eq!(config.symbols, ["AAPL"]);
        assert_eq!(config.history.interval, Interval::Daily);
        assert_eq!(config.history.start, "2000-01-01");
        assert!(config.filter.is_empty());
        assert_eq!(config.stream.window, Duration::from_secs(60));
        assert!(config.stream.keepalive.is_some());
        assert!(config.stoptime.is_none());
        assert!(config.output.is_none());
        assert_eq!(config.metrics_port, 0);
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("TRADIER_API_KEY", "key123"),
            ("TRADIER_ENV", "sandbox"),
            ("TRADIER_REQUEST_DELAY_MS", "500"),
            ("TRADIER_RETRY_BACKOFF_MS", "100"),
            ("TRADIER_RETRY_STATUSES", "403, 429"),
            ("FEED_MODE", "stream"),
            ("FEED_SYMBOLS", "AAPL, MSFT ,,SPY"),
            ("FEED_FILTER", "trade,quote"),
            ("FEED_INTERVAL", "5min"),
            ("FEED_WINDOW_SECS", "15"),
            ("FEED_PING_INTERVAL_SECS", "0"),
            ("FEED_VALID_ONLY", "false"),
            ("FEED_STOPTIME", "2030-01-02T21:00:00Z"),
            ("FEED_OUTPUT", "out.jsonl"),
            ("FEED_METRICS_PORT", "9100"),
        ])
        .unwrap();

        assert_eq!(config.mode, FeedMode::Stream);
        assert_eq!(config.http.environment, Environment::Sandbox);
        assert_eq!(config.http.request_delay, Duration::from_millis(500));
        assert_eq!(config.http.retry.backoff_base, Duration::from_millis(100));
        assert_eq!(config.http.retry.retry_statuses, [403, 429]);
        assert_eq!(config.symbols, ["AAPL", "MSFT", "SPY"]);
        assert_eq!(config.filter, ["trade", "quote"]);
        assert_eq!(config.history.interval, Interval::FiveMinutes);
        assert_eq!(config.stream.window, Duration::from_secs(15));
        assert!(config.stream.keepalive.is_none());
        assert!(!config.subscription.valid_only);
        assert_eq!(
            config.stoptime,
            Some(Utc.with_ymd_and_hms(2030, 1, 2, 21, 0, 0).unwrap())
        );
        assert_eq!(config.output, Some(PathBuf::from("out.jsonl")));
        assert_eq!(config.metrics_port, 9100);
        assert_eq!(config.tradier().base_url(), "https://sandbox.tradier.com/v1/");
    }

    #[test]
    fn stream_mode_requires_stoptime() {
        let err = config(&[
            ("TRADIER_API_KEY", "k"),
            ("FEED_SYMBOLS", "SPY"),
            ("FEED_MODE", "stream"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "FEED_STOPTIME"));
    }

    #[test]
    fn invalid_values_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("FEED_INTERVAL", "hourly"));
        assert!(matches!(config(&vars), Err(ConfigError::Invalid { .. })));

        let mut vars = REQUIRED.to_vec();
        vars.push(("TRADIER_RETRY_STATUSES", "403,abc"));
        assert!(matches!(config(&vars), Err(ConfigError::Invalid { .. })));

        let mut vars = REQUIRED.to_vec();
        vars.push(("FEED_WINDOW_SECS", "0"));
        assert!(matches!(config(&vars), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn local_stoptime_format() {
        let parsed = parse_stoptime("2030-06-01 16:00:00").unwrap();
        let expected = Local
            .with_ymd_and_hms(2030, 6, 1, 16, 0, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parsed, expected);
        assert!(parse_stoptime("tomorrow").is_err());
    }

    #[test]
    fn credentials_redacted_debug() {
        let config = config(&REQUIRED).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("key123"));
        assert!(debug.contains("[REDACTED]"));
    }
}
