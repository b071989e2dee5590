//! Streaming Subscription
//!
//! The subscription describes which symbols and payload kinds a streaming
//! session asks for. It is attached to the client before connecting and
//! serialized into the first frame sent after the socket opens:
//!
//! ```json
//! {"symbols":["SPY"],"filter":["trade"],"sessionid":"...",
//!  "linebreak":false,"validOnly":true,"advancedDetails":false}
//! ```

use serde::Serialize;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while building a subscription.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// No usable symbol was given.
    #[error("subscription requires at least one symbol")]
    NoSymbols,
}

// =============================================================================
// Settings
// =============================================================================

/// Stream settings carried alongside the symbol list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionSettings {
    /// Only include ticks the exchanges consider valid.
    pub valid_only: bool,
    /// Insert a line break after each completed payload.
    pub linebreak: bool,
    /// Include advanced details in timesale payloads.
    pub advanced_details: bool,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            valid_only: true,
            linebreak: false,
            advanced_details: false,
        }
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Symbols, payload filter and settings for one streaming session.
///
/// Symbols are trimmed and de-duplicated, keeping first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    symbols: Vec<String>,
    filter: Vec<String>,
    settings: SubscriptionSettings,
}

impl Subscription {
    /// Create a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::NoSymbols`] if no non-blank symbol is given.
    pub fn new<S, F>(
        symbols: impl IntoIterator<Item = S>,
        filter: impl IntoIterator<Item = F>,
        settings: SubscriptionSettings,
    ) -> Result<Self, SubscriptionError>
    where
        S: AsRef<str>,
        F: AsRef<str>,
    {
        let symbols = dedup_trimmed(symbols);
        if symbols.is_empty() {
            return Err(SubscriptionError::NoSymbols);
        }

        Ok(Self {
            symbols,
            filter: dedup_trimmed(filter),
            settings,
        })
    }

    /// Subscribed symbols.
    #[must_use]
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Payload kinds to receive (empty means all).
    #[must_use]
    pub fn filter(&self) -> &[String] {
        &self.filter
    }

    /// Stream settings.
    #[must_use]
    pub const fn settings(&self) -> SubscriptionSettings {
        self.settings
    }

    /// Build the wire payload for a session.
    #[must_use]
    pub fn payload<'a>(&'a self, session_id: &'a str) -> SubscriptionPayload<'a> {
        SubscriptionPayload {
            symbols: &self.symbols,
            filter: &self.filter,
            sessionid: session_id,
            linebreak: self.settings.linebreak,
            valid_only: self.settings.valid_only,
            advanced_details: self.settings.advanced_details,
        }
    }
}

fn dedup_trimmed<T: AsRef<str>>(items: impl IntoIterator<Item = T>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.as_ref().trim();
        if !item.is_empty() && !out.iter().any(|existing| existing == item) {
            out.push(item.to_string());
        }
    }
    out
}

/// First frame sent on an open streaming socket.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionPayload<'a> {
    /// Symbols to stream.
    pub symbols: &'a [String],
    /// Payload kinds to stream.
    pub filter: &'a [String],
    /// Session token for this connection.
    pub sessionid: &'a str,
    /// Line break setting.
    pub linebreak: bool,
    /// Valid-ticks-only setting.
    #[serde(rename = "validOnly")]
    pub valid_only: bool,
    /// Advanced timesale details setting.
    #[serde(rename = "advancedDetails")]
    pub advanced_details: bool,
}

impl SubscriptionPayload<'_> {
    /// Serialize the payload to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (should not happen with valid data).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
