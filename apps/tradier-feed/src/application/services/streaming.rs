//! Streaming Client
//!
//! Owns the lifecycle of one persistent market events connection:
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──open──► Connected ──┐
//!      ▲                                                       │
//!      └──── deadline / shutdown() / interrupt / fatal error ──┘
//! ```
//!
//! `connect` drives the whole session and resolves only once the terminal
//! `Disconnected` transition has happened. While connected, inbound frames
//! are appended to the current window and a flush timer hands each window to
//! the caller's sink every `window` interval, whether or not it is empty.
//!
//! No in-process reconnection is attempted: every stream error funnels into
//! the shutdown transition and is reported as a [`ShutdownReason`]. Wrap
//! `connect` in a loop to restart the stream.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::heartbeat::{HeartbeatConfig, HeartbeatMonitor};
use crate::application::ports::{
    AuthError, InboundFrame, SessionTokenSource, StreamConnection, StreamConnector,
    TransportError, WindowSink,
};
use crate::domain::streaming::{SessionState, SessionToken, ShutdownReason, StreamState};
use crate::domain::subscription::{Subscription, SubscriptionError, SubscriptionSettings};
use crate::infrastructure::metrics;

/// Tradier market events WebSocket endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://ws.tradier.com/v1/markets/events";

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end a `connect` call before the session is established.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Missing or invalid subscription, or session already active.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Session token could not be obtained.
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    /// Socket could not be opened.
    #[error("connection failed: {0}")]
    Connection(#[from] TransportError),
}

impl From<SubscriptionError> for StreamError {
    fn from(err: SubscriptionError) -> Self {
        Self::Configuration(err.to_string())
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Transport-level keepalive: a ping every `ping_interval`, and a timeout if
/// nothing at all arrives within `ping_timeout` of a ping.
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Interval between pings.
    pub ping_interval: Duration,
    /// Silence tolerated after a ping.
    pub ping_timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration for the streaming client.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// WebSocket URL.
    pub url: String,
    /// Width of each message window.
    pub window: Duration,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
    /// Keepalive configuration (`None` disables pings).
    pub keepalive: Option<KeepaliveConfig>,
    /// Treat Ctrl+C during `connect` as a shutdown trigger.
    pub handle_interrupt: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            window: Duration::from_secs(60),
            heartbeat: HeartbeatConfig::default(),
            keepalive: Some(KeepaliveConfig::default()),
            handle_interrupt: true,
        }
    }
}

// =============================================================================
// Streaming Client
// =============================================================================

/// Cancellation and shutdown reason of one `connect` call.
#[derive(Debug, Default)]
struct SessionControl {
    cancel: CancellationToken,
    reason: Mutex<Option<ShutdownReason>>,
}

impl SessionControl {
    /// Record `reason` unless one is already set, cancel, and return the
    /// reason that stands.
    fn stop(&self, reason: ShutdownReason) -> ShutdownReason {
        let mut recorded = self.reason.lock();
        let first = recorded.is_none();
        let effective = recorded.get_or_insert(reason).clone();
        self.cancel.cancel();

        if first {
            tracing::debug!(reason = %effective, "Shutdown sequence initiated");
        }
        effective
    }
}

/// Single-session streaming client.
///
/// Lock order is always `session`, then `control`, then a session's reason.
pub struct StreamingClient {
    settings: StreamSettings,
    tokens: Arc<dyn SessionTokenSource>,
    connector: Arc<dyn StreamConnector>,
    subscription: RwLock<Option<Subscription>>,
    session: Arc<Mutex<SessionState>>,
    control: Mutex<Arc<SessionControl>>,
}

impl StreamingClient {
    /// Create a disconnected client.
    #[must_use]
    pub fn new(
        settings: StreamSettings,
        tokens: Arc<dyn SessionTokenSource>,
        connector: Arc<dyn StreamConnector>,
    ) -> Self {
        Self {
            settings,
            tokens,
            connector,
            subscription: RwLock::new(None),
            session: Arc::new(Mutex::new(SessionState::new())),
            control: Mutex::new(Arc::new(SessionControl::default())),
        }
    }

    /// Build and attach a subscription.
    ///
    /// An invalid subscription detaches the previous one while disconnected,
    /// so a following `connect` fails instead of streaming stale symbols.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Configuration`] if `symbols` is empty or a
    /// session is already active.
    pub fn register_subscription<S, F>(
        &self,
        symbols: impl IntoIterator<Item = S>,
        filter: impl IntoIterator<Item = F>,
        settings: SubscriptionSettings,
    ) -> Result<(), StreamError>
    where
        S: AsRef<str>,
        F: AsRef<str>,
    {
        match Subscription::new(symbols, filter, settings) {
            Ok(subscription) => self.attach(subscription),
            Err(e) => {
                let session = self.session.lock();
                if session.state().is_disconnected() {
                    *self.subscription.write() = None;
                }
                Err(e.into())
            }
        }
    }

    /// Attach a prepared subscription, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Configuration`] if a session is already active.
    pub fn attach(&self, subscription: Subscription) -> Result<(), StreamError> {
        let session = self.session.lock();
        if !session.state().is_disconnected() {
            return Err(StreamError::Configuration(format!(
                "cannot change subscription while {}",
                session.state().as_str()
            )));
        }

        tracing::debug!(
            symbols = ?subscription.symbols(),
            filter = ?subscription.filter(),
            "Subscription registered"
        );
        *self.subscription.write() = Some(subscription);
        Ok(())
    }

    /// Currently attached subscription.
    #[must_use]
    pub fn subscription(&self) -> Option<Subscription> {
        self.subscription.read().clone()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.session.lock().state()
    }

    /// Messages received since connect.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.session.lock().sequence()
    }

    /// Messages waiting for the next window flush.
    #[must_use]
    pub fn pending_messages(&self) -> usize {
        self.session.lock().pending()
    }

    /// Connect, stream until `stoptime` or another shutdown trigger, and
    /// return why the session ended.
    ///
    /// `stoptime` is converted once into a delay relative to now; wall-clock
    /// changes during the session are not re-evaluated. A stoptime in the
    /// past ends the session immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if no subscription is attached, a session is already
    /// active, the session token cannot be obtained, or the socket cannot be
    /// opened. Failures after the socket opens are reported as the returned
    /// [`ShutdownReason`] instead.
    pub async fn connect<S>(
        &self,
        stoptime: DateTime<Utc>,
        mut sink: S,
    ) -> Result<ShutdownReason, StreamError>
    where
        S: WindowSink,
    {
        let subscription = self.subscription.read().clone().ok_or_else(|| {
            StreamError::Configuration("no symbols registered before connect".to_string())
        })?;

        let control = Arc::new(SessionControl::default());
        {
            let mut session = self.session.lock();
            if !session.begin_connecting() {
                return Err(StreamError::Configuration(
                    "stream session already active".to_string(),
                ));
            }
            *self.control.lock() = Arc::clone(&control);
        }

        let delay = deadline_delay(stoptime, Utc::now());
        let span = tracing::info_span!("stream_session", session_id = %Uuid::new_v4());

        self.run_session(&subscription, delay, &control, &mut sink)
            .instrument(span)
            .await
    }

    /// Force the session to `Disconnected` and return the effective reason.
    ///
    /// The first reason recorded for a session wins; later calls (for
    /// example a manual shutdown racing the deadline) are no-ops apart from
    /// returning that reason.
    pub fn shutdown(&self, reason: ShutdownReason) -> ShutdownReason {
        let mut session = self.session.lock();
        session.reset();
        let current = Arc::clone(&self.control.lock());
        current.stop(reason)
    }

    /// Terminal transition for the session owning `control`.
    ///
    /// Shared state is only reset while `control` is still the current
    /// session; a `connect` that started after an external `shutdown` is
    /// left running.
    fn finish(&self, control: &Arc<SessionControl>, reason: ShutdownReason) -> ShutdownReason {
        let mut session = self.session.lock();
        if Arc::ptr_eq(&self.control.lock(), control) {
            session.reset();
        }
        control.stop(reason)
    }

    fn abandon(&self, control: &Arc<SessionControl>) {
        let mut session = self.session.lock();
        if Arc::ptr_eq(&self.control.lock(), control) {
            session.reset();
        }
        control.cancel.cancel();
    }

    async fn run_session<S>(
        &self,
        subscription: &Subscription,
        delay: Duration,
        control: &Arc<SessionControl>,
        sink: &mut S,
    ) -> Result<ShutdownReason, StreamError>
    where
        S: WindowSink + ?Sized,
    {
        let cancel = &control.cancel;
        let deadline = Instant::now() + delay;
        let interrupt = wait_for_interrupt(self.settings.handle_interrupt);
        tokio::pin!(interrupt);

        tracing::info!(
            symbols = ?subscription.symbols(),
            stop_in_secs = delay.as_secs(),
            "Startup sequence initiated"
        );

        let token = tokio::select! {
            () = cancel.cancelled() => return Ok(self.finish(control, ShutdownReason::Requested)),
            () = tokio::time::sleep_until(deadline) => {
                return Ok(self.finish(control, ShutdownReason::Deadline));
            }
            () = &mut interrupt => return Ok(self.finish(control, ShutdownReason::Interrupted)),
            token = self.tokens.session_token() => token,
        };
        let token = match token {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(error = %e, "Failed to retrieve session token");
                self.abandon(control);
                return Err(e.into());
            }
        };
        tracing::debug!("Retrieved session token");

        let connected = tokio::select! {
            () = cancel.cancelled() => return Ok(self.finish(control, ShutdownReason::Requested)),
            () = tokio::time::sleep_until(deadline) => {
                return Ok(self.finish(control, ShutdownReason::Deadline));
            }
            () = &mut interrupt => return Ok(self.finish(control, ShutdownReason::Interrupted)),
            connected = self.connector.connect(&self.settings.url) => connected,
        };
        let mut conn = match connected {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(url = %self.settings.url, error = %e, "Failed to open stream");
                self.abandon(control);
                return Err(e.into());
            }
        };

        let (reason, heartbeat) =
            match self.on_open(conn.as_mut(), subscription, &token, cancel).await {
                Ok(heartbeat) => {
                    let reason = self
                        .receive(conn.as_mut(), deadline, cancel, interrupt.as_mut(), sink)
                        .await;
                    (reason, Some(heartbeat))
                }
                Err(reason) => (reason, None),
            };

        let reason = self.finish(control, reason);

        if let Some(heartbeat) = heartbeat {
            match heartbeat.await {
                Ok(beats) => tracing::debug!(beats, "Heartbeat stopped"),
                Err(e) => tracing::warn!(error = %e, "Heartbeat task failed"),
            }
        }
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "Error closing stream");
        }
        self.on_close(&reason);

        Ok(reason)
    }

    /// Transport open: send the subscription and start the heartbeat.
    async fn on_open(
        &self,
        conn: &mut dyn StreamConnection,
        subscription: &Subscription,
        token: &SessionToken,
        cancel: &CancellationToken,
    ) -> Result<JoinHandle<u64>, ShutdownReason> {
        tracing::debug!("Connected to websocket");

        {
            let mut session = self.session.lock();
            if cancel.is_cancelled() || !session.mark_connected() {
                return Err(ShutdownReason::Requested);
            }
        }
        metrics::set_stream_connected(true);

        let payload = subscription
            .payload(token.as_str())
            .to_json()
            .map_err(|e| ShutdownReason::Payload(e.to_string()))?;

        tracing::debug!(
            symbols = ?subscription.symbols(),
            filter = ?subscription.filter(),
            "Sending subscription"
        );
        conn.send_text(payload)
            .await
            .map_err(|e| self.on_error(e))?;

        Ok(HeartbeatMonitor::new(
            self.settings.heartbeat.clone(),
            Arc::clone(&self.session),
            cancel.child_token(),
        )
        .spawn())
    }

    /// Receive loop: runs until a shutdown trigger fires.
    async fn receive<S, I>(
        &self,
        conn: &mut dyn StreamConnection,
        deadline: Instant,
        cancel: &CancellationToken,
        mut interrupt: Pin<&mut I>,
        sink: &mut S,
    ) -> ShutdownReason
    where
        S: WindowSink + ?Sized,
        I: Future<Output = ()>,
    {
        let window = self.settings.window;
        let mut flush = tokio::time::interval_at(Instant::now() + window, window);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut keepalive = self.settings.keepalive.clone().map(Keepalive::new);

        let stop = tokio::time::sleep_until(deadline);
        tokio::pin!(stop);

        tracing::debug!("Listening into stream");

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => return ShutdownReason::Requested,
                () = &mut stop => return ShutdownReason::Deadline,
                () = interrupt.as_mut() => return ShutdownReason::Interrupted,
                _ = flush.tick() => self.flush_window(cancel, sink),
                event = next_keepalive_event(keepalive.as_mut()) => match event {
                    KeepaliveEvent::PingDue => {
                        if let Err(e) = conn.send_ping().await {
                            return self.on_error(e);
                        }
                        if let Some(keepalive) = keepalive.as_mut() {
                            keepalive.ping_sent();
                        }
                    }
                    KeepaliveEvent::Expired => return self.on_error(TransportError::Timeout),
                },
                frame = conn.next_frame() => {
                    if let Some(keepalive) = keepalive.as_mut() {
                        keepalive.frame_received();
                    }
                    match frame {
                        Some(Ok(InboundFrame::Text(text))) => self.on_message(cancel, text),
                        Some(Ok(InboundFrame::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => self.on_message(cancel, text),
                            Err(e) => return self.on_error(TransportError::Payload(e.to_string())),
                        },
                        Some(Ok(InboundFrame::Pong)) => tracing::trace!("Pong received"),
                        Some(Ok(InboundFrame::Close)) | None => {
                            return self.on_error(TransportError::Closed);
                        }
                        Some(Err(e)) => return self.on_error(e),
                    }
                }
            }
        }
    }

    /// Inbound message: append to the current window.
    fn on_message(&self, cancel: &CancellationToken, message: String) {
        let mut session = self.session.lock();
        if !cancel.is_cancelled() && session.record(message) {
            metrics::record_stream_message();
        }
    }

    /// Stream error: classify and log. The caller funnels the returned
    /// reason into the shutdown transition.
    fn on_error(&self, error: TransportError) -> ShutdownReason {
        let reason = classify(error);
        match &reason {
            ShutdownReason::Payload(detail) => tracing::error!(%detail, "Invalid payload"),
            ShutdownReason::Timeout => tracing::error!("Stream connection timed out"),
            ShutdownReason::ConnectionClosed => tracing::error!("Fatal connection error"),
            ShutdownReason::Unhandled(detail) => tracing::error!(%detail, "Unhandled stream error"),
            _ => {}
        }
        metrics::record_stream_error(reason.as_str());
        reason
    }

    /// Transport closed.
    fn on_close(&self, reason: &ShutdownReason) {
        metrics::set_stream_connected(false);
        tracing::info!(reason = %reason, "Disconnected from websocket");
    }

    fn flush_window<S>(&self, cancel: &CancellationToken, sink: &mut S)
    where
        S: WindowSink + ?Sized,
    {
        let window = {
            let mut session = self.session.lock();
            if cancel.is_cancelled() {
                return;
            }
            session.flush()
        };
        tracing::debug!(messages = window.len(), "Window flushed");
        metrics::record_window(window.len());
        sink.deliver(window);
    }
}

impl std::fmt::Debug for StreamingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingClient")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Map a transport failure onto a shutdown reason.
#[must_use]
pub fn classify(error: TransportError) -> ShutdownReason {
    match error {
        TransportError::Closed => ShutdownReason::ConnectionClosed,
        TransportError::Timeout => ShutdownReason::Timeout,
        TransportError::Payload(detail) => ShutdownReason::Payload(detail),
        TransportError::Other(detail) => ShutdownReason::Unhandled(detail),
    }
}

/// Delay until `stoptime`, saturating at zero.
#[must_use]
pub fn deadline_delay(stoptime: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (stoptime - now).to_std().unwrap_or(Duration::ZERO)
}

async fn wait_for_interrupt(enabled: bool) {
    if enabled {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl+C, initiating shutdown");
                return;
            }
            Err(e) => tracing::warn!(error = %e, "Interrupt handler unavailable"),
        }
    }
    std::future::pending::<()>().await;
}

// =============================================================================
// Keepalive
// =============================================================================

enum KeepaliveEvent {
    PingDue,
    Expired,
}

struct Keepalive {
    ticker: Interval,
    timeout: Duration,
    pong_deadline: Option<Instant>,
}

impl Keepalive {
    fn new(config: KeepaliveConfig) -> Self {
        let mut ticker = tokio::time::interval_at(
            Instant::now() + config.ping_interval,
            config.ping_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            ticker,
            timeout: config.ping_timeout,
            pong_deadline: None,
        }
    }

    async fn next_event(&mut self) -> KeepaliveEvent {
        match self.pong_deadline {
            Some(deadline) => tokio::select! {
                () = tokio::time::sleep_until(deadline) => KeepaliveEvent::Expired,
                _ = self.ticker.tick() => KeepaliveEvent::PingDue,
            },
            None => {
                self.ticker.tick().await;
                KeepaliveEvent::PingDue
            }
        }
    }

    fn ping_sent(&mut self) {
        if self.pong_deadline.is_none() {
            self.pong_deadline = Some(Instant::now() + self.timeout);
        }
    }

    fn frame_received(&mut self) {
        self.pong_deadline = None;
    }
}

async fn next_keepalive_event(keepalive: Option<&mut Keepalive>) -> KeepaliveEvent {
    match keepalive {
        Some(keepalive) => keepalive.next_event().await,
        None => std::future::pending().await,
    }
}
