//! Historical Data Requests
//!
//! Types describing a historical market data fetch. A [`RequestDescriptor`]
//! is the fully-formed request handed to the dispatcher; [`HistoryParams`]
//! and [`Interval`] are the inputs the endpoint builder turns into one.
//!
//! # Endpoints
//!
//! - `daily`, `weekly`, `monthly` bars: `markets/history`
//! - `tick`, `1min`, `5min`, `15min` time and sales: `markets/timesales`

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Default start date used when none is given.
pub const DEFAULT_START: &str = "2000-01-01";

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while describing a history request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// Interval string is not one the API understands.
    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    /// Symbol is empty or blank.
    #[error("symbol cannot be empty")]
    EmptySymbol,
}

// =============================================================================
// Interval
// =============================================================================

/// Bar interval for a historical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// Daily bars.
    #[default]
    Daily,
    /// Weekly bars.
    Weekly,
    /// Monthly bars.
    Monthly,
    /// Every trade.
    Tick,
    /// One minute time and sales.
    #[serde(rename = "1min")]
    OneMinute,
    /// Five minute time and sales.
    #[serde(rename = "5min")]
    FiveMinutes,
    /// Fifteen minute time and sales.
    #[serde(rename = "15min")]
    FifteenMinutes,
}

impl Interval {
    /// Wire value used in the `interval` query parameter.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Tick => "tick",
            Self::OneMinute => "1min",
            Self::FiveMinutes => "5min",
            Self::FifteenMinutes => "15min",
        }
    }

    /// API path (relative to the REST base) serving this interval.
    #[must_use]
    pub const fn path(&self) -> &'static str {
        if self.is_intraday() {
            "markets/timesales"
        } else {
            "markets/history"
        }
    }

    /// Check if this interval is served by the time and sales endpoint.
    #[must_use]
    pub const fn is_intraday(&self) -> bool {
        matches!(
            self,
            Self::Tick | Self::OneMinute | Self::FiveMinutes | Self::FifteenMinutes
        )
    }
}

impl FromStr for Interval {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "D" | "d" | "daily" => Ok(Self::Daily),
            "W" | "w" | "weekly" => Ok(Self::Weekly),
            "M" | "monthly" => Ok(Self::Monthly),
            "tick" => Ok(Self::Tick),
            "1min" => Ok(Self::OneMinute),
            "5min" => Ok(Self::FiveMinutes),
            "15min" => Ok(Self::FifteenMinutes),
            other => Err(HistoryError::InvalidInterval(other.to_string())),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Parameters
// =============================================================================

/// Parameters shared by every symbol registered in one batch.
///
/// `start` and `end` are passed through verbatim; the API accepts both
/// `YYYY-MM-DD` and `YYYY-MM-DD HH:MM` forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryParams {
    /// Bar interval.
    pub interval: Interval,
    /// Start of the requested range.
    pub start: String,
    /// End of the requested range.
    pub end: String,
}

impl Default for HistoryParams {
    fn default() -> Self {
        Self {
            interval: Interval::Daily,
            start: DEFAULT_START.to_string(),
            end: today().to_string(),
        }
    }
}

impl HistoryParams {
    /// Create parameters for the given interval with the default range.
    #[must_use]
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Set the range start.
    #[must_use]
    pub fn with_start(mut self, start: impl Into<String>) -> Self {
        self.start = start.into();
        self
    }

    /// Set the range end.
    #[must_use]
    pub fn with_end(mut self, end: impl Into<String>) -> Self {
        self.end = end.into();
        self
    }

    /// Query pairs for a symbol, in the order the API documents them.
    #[must_use]
    pub fn query_pairs<'a>(&'a self, symbol: &'a str) -> [(&'static str, &'a str); 4] {
        [
            ("symbol", symbol),
            ("interval", self.interval.as_str()),
            ("start", &self.start),
            ("end", &self.end),
        ]
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

// =============================================================================
// Descriptor
// =============================================================================

/// A fully-formed request ready for the HTTP transport.
///
/// Immutable once built; the dispatcher treats it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestDescriptor {
    url: String,
}

impl RequestDescriptor {
    /// Wrap an absolute URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("D", Interval::Daily)]
    #[test_case("daily", Interval::Daily)]
    #[test_case("W", Interval::Weekly)]
    #[test_case("M", Interval::Monthly)]
    #[test_case("tick", Interval::Tick)]
    #[test_case("1min", Interval::OneMinute)]
    #[test_case("5min", Interval::FiveMinutes)]
    #[test_case(" 15min ", Interval::FifteenMinutes)]
    fn interval_parsing(input: &str, expected: Interval) {
        assert_eq!(input.parse::<Interval>().unwrap(), expected);
    }

    #[test]
    fn interval_rejects_unknown() {
        let err = "30min".parse::<Interval>().unwrap_err();
        assert_eq!(err, HistoryError::InvalidInterval("30min".to_string()));
    }

    #[test]
    fn interval_paths() {
        assert_eq!(Interval::Daily.path(), "markets/history");
        assert_eq!(Interval::Monthly.path(), "markets/history");
        assert_eq!(Interval::Tick.path(), "markets/timesales");
        assert_eq!(Interval::FifteenMinutes.path(), "markets/timesales");
    }

    #[test]
    fn interval_serde_uses_wire_names() {
        let json = serde_json::to_string(&Interval::FiveMinutes).unwrap();
        assert_eq!(json, r#""5min""#);
        let parsed: Interval = serde_json::from_str(r#""weekly""#).unwrap();
        assert_eq!(parsed, Interval::Weekly);
    }

    #[test]
    fn params_defaults() {
        let params = HistoryParams::default();
        assert_eq!(params.interval, Interval::Daily);
        assert_eq!(params.start, DEFAULT_START);
        assert_eq!(params.end, today().to_string());
    }

    #[test]
    fn params_query_pairs_order() {
        let params = HistoryParams::new(Interval::OneMinute)
            .with_start("2020-12-09")
            .with_end("2020-12-13");
        let pairs = params.query_pairs("SPY");
        assert_eq!(
            pairs,
            [
                ("symbol", "SPY"),
                ("interval", "1min"),
                ("start", "2020-12-09"),
                ("end", "2020-12-13"),
            ]
        );
    }

    #[test]
    fn descriptor_display_is_url() {
        let descriptor = RequestDescriptor::new("https://example.test/a?b=c");
        assert_eq!(descriptor.to_string(), "https://example.test/a?b=c");
        assert_eq!(descriptor.url(), "https://example.test/a?b=c");
    }
}
