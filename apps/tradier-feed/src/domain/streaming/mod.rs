//! Streaming Session Types
//!
//! Connection state, message windowing and shutdown classification for a
//! single streaming session. These types hold no I/O; the streaming client
//! drives them from its transport callbacks.

use std::fmt;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of a streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// No connection (initial and terminal state).
    #[default]
    Disconnected,
    /// Session token requested or socket being dialed.
    Connecting,
    /// Socket open and subscription sent.
    Connected,
}

impl StreamState {
    /// Check if the socket is open and streaming.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if no session is active.
    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

// =============================================================================
// Message Window
// =============================================================================

/// Raw inbound messages accumulated since the last flush, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageWindow {
    messages: Vec<String>,
}

impl MessageWindow {
    /// Create an empty window.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Append a message.
    pub fn push(&mut self, message: String) {
        self.messages.push(message);
    }

    /// Take every accumulated message, leaving the window empty.
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }

    /// Number of pending messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if no message is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop every pending message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

// =============================================================================
// Session Snapshot
// =============================================================================

/// Mutable state shared by the receive loop, flush timer and heartbeat.
///
/// Kept behind a single lock so that a message can never land in a window
/// after the session has been reset.
#[derive(Debug, Default)]
pub struct SessionState {
    state: StreamState,
    window: MessageWindow,
    sequence: u64,
}

impl SessionState {
    /// Create a disconnected session.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: StreamState::Disconnected,
            window: MessageWindow::new(),
            sequence: 0,
        }
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// Messages received since connect.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Messages waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.window.len()
    }

    /// Move from `Disconnected` to `Connecting`.
    ///
    /// Returns `false` (and changes nothing) if a session is already active.
    pub fn begin_connecting(&mut self) -> bool {
        if !self.state.is_disconnected() {
            return false;
        }
        self.state = StreamState::Connecting;
        true
    }

    /// Move from `Connecting` to `Connected`.
    ///
    /// Returns `false` if the session was torn down in the meantime.
    pub fn mark_connected(&mut self) -> bool {
        if self.state != StreamState::Connecting {
            return false;
        }
        self.state = StreamState::Connected;
        true
    }

    /// Record an inbound message.
    ///
    /// Messages are only accepted while connected; returns whether it was kept.
    pub fn record(&mut self, message: String) -> bool {
        if !self.state.is_connected() {
            return false;
        }
        self.window.push(message);
        self.sequence += 1;
        true
    }

    /// Empty the current window and return its contents.
    pub fn flush(&mut self) -> Vec<String> {
        self.window.take()
    }

    /// Return to the initial disconnected state. Safe to call repeatedly.
    pub fn reset(&mut self) {
        self.state = StreamState::Disconnected;
        self.window.clear();
        self.sequence = 0;
    }
}

// =============================================================================
// Shutdown Reason
// =============================================================================

/// Why a streaming session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The scheduled stop time was reached.
    Deadline,
    /// The caller asked for shutdown.
    Requested,
    /// The process received an interrupt signal.
    Interrupted,
    /// A frame or the subscription payload could not be handled.
    Payload(String),
    /// The connection stopped responding.
    Timeout,
    /// The server closed the connection or the socket dropped.
    ConnectionClosed,
    /// Any other transport failure.
    Unhandled(String),
}

impl ShutdownReason {
    /// Short tag for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deadline => "deadline",
            Self::Requested => "requested",
            Self::Interrupted => "interrupted",
            Self::Payload(_) => "payload",
            Self::Timeout => "timeout",
            Self::ConnectionClosed => "connection_closed",
            Self::Unhandled(_) => "unhandled",
        }
    }

    /// Check if the session ended because of a failure.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(
            self,
            Self::Payload(_) | Self::Timeout | Self::ConnectionClosed | Self::Unhandled(_)
        )
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deadline => write!(f, "reached stoptime"),
            Self::Requested => write!(f, "shutdown requested"),
            Self::Interrupted => write!(f, "stream manually interrupted"),
            Self::Payload(detail) => write!(f, "invalid payload: {detail}"),
            Self::Timeout => write!(f, "stream connection timed out"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::Unhandled(detail) => write!(f, "unhandled error: {detail}"),
        }
    }
}

// =============================================================================
// Session Token
// =============================================================================

/// Short-lived token authorizing one streaming connection.
///
/// The `Debug` implementation redacts the value for safe logging.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a token value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionToken").field(&"[REDACTED]").finish()
    }
}
