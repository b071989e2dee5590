//! Streaming Session Integration Tests
//!
//! Drives the streaming client over a scripted connection with the tokio
//! clock paused: window boundaries, deadline, keepalive timeout, error
//! classification and shutdown races.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use tradier_feed::{
    AuthError, HeartbeatConfig, InboundFrame, KeepaliveConfig, SessionToken, SessionTokenSource,
    ShutdownReason, StreamConnection, StreamConnector, StreamError, StreamSettings, StreamState,
    StreamingClient, SubscriptionSettings, TransportError,
};

type Frame = Result<InboundFrame, TransportError>;

// =============================================================================
// Scripted transport
// =============================================================================

#[derive(Default)]
struct StaticTokens {
    calls: AtomicUsize,
}

#[async_trait]
impl SessionTokenSource for StaticTokens {
    async fn session_token(&self) -> Result<SessionToken, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SessionToken::new("test-session"))
    }
}

#[derive(Default)]
struct Observed {
    sent: Mutex<Vec<String>>,
    pings: AtomicUsize,
    closed: AtomicBool,
}

struct ScriptedConnection {
    frames: mpsc::UnboundedReceiver<Frame>,
    loopback: mpsc::UnboundedSender<Frame>,
    auto_pong: bool,
    observed: Arc<Observed>,
}

#[async_trait]
impl StreamConnection for ScriptedConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.observed.sent.lock().push(text);
        Ok(())
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.observed.pings.fetch_add(1, Ordering::SeqCst);
        if self.auto_pong {
            let _ = self.loopback.send(Ok(InboundFrame::Pong));
        }
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.observed.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedConnector {
    connection: Mutex<Option<ScriptedConnection>>,
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn StreamConnection>, TransportError> {
        self.connection
            .lock()
            .take()
            .map(|c| Box::new(c) as Box<dyn StreamConnection>)
            .ok_or_else(|| TransportError::Other("no scripted connection left".to_string()))
    }
}

struct Harness {
    client: Arc<StreamingClient>,
    tokens: Arc<StaticTokens>,
    frames: mpsc::UnboundedSender<Frame>,
    observed: Arc<Observed>,
    windows: Arc<Mutex<Vec<Vec<String>>>>,
}

impl Harness {
    fn new(settings: StreamSettings) -> Self {
        Self::with_pong(settings, false)
    }

    fn with_pong(settings: StreamSettings, auto_pong: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let observed = Arc::new(Observed::default());
        let connection = ScriptedConnection {
            frames: rx,
            loopback: tx.clone(),
            auto_pong,
            observed: Arc::clone(&observed),
        };
        let tokens = Arc::new(StaticTokens::default());
        let connector = Arc::new(ScriptedConnector {
            connection: Mutex::new(Some(connection)),
        });
        let client = Arc::new(StreamingClient::new(
            settings,
            Arc::clone(&tokens) as Arc<dyn SessionTokenSource>,
            connector,
        ));
        client
            .register_subscription(["SPY", "AAPL"], ["trade", "quote"], SubscriptionSettings::default())
            .unwrap();

        Self {
            client,
            tokens,
            frames: tx,
            observed,
            windows: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Run `connect` in a background task.
    fn spawn_connect(
        &self,
        stop_in: Duration,
    ) -> tokio::task::JoinHandle<Result<ShutdownReason, StreamError>> {
        let client = Arc::clone(&self.client);
        let windows = Arc::clone(&self.windows);
        let stoptime = Utc::now() + chrono::Duration::from_std(stop_in).unwrap();
        tokio::spawn(async move {
            client
                .connect(stoptime, move |window: Vec<String>| windows.lock().push(window))
                .await
        })
    }

    /// Deliver `frame` after `delay` from now.
    fn send_at(&self, delay: Duration, frame: Frame) {
        let tx = self.frames.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(frame);
        });
    }

    fn windows(&self) -> Vec<Vec<String>> {
        self.windows.lock().clone()
    }
}

fn settings(window: Duration) -> StreamSettings {
    StreamSettings {
        url: "wss://ws.test/v1/markets/events".to_string(),
        window,
        heartbeat: HeartbeatConfig::new(Duration::from_secs(10)),
        keepalive: None,
        handle_interrupt: false,
    }
}

fn text(s: &str) -> Frame {
    Ok(InboundFrame::Text(s.to_string()))
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

fn assert_reset(client: &StreamingClient) {
    assert_eq!(client.state(), StreamState::Disconnected);
    assert_eq!(client.pending_messages(), 0);
    assert_eq!(client.sequence(), 0);
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn subscription_is_first_frame_with_session_id() {
    let harness = Harness::new(settings(Duration::from_secs(10)));

    let reason = harness
        .spawn_connect(Duration::from_secs(1))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(reason, ShutdownReason::Deadline);
    assert_eq!(harness.tokens.calls.load(Ordering::SeqCst), 1);

    let sent = harness.observed.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    let payload: Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(payload["sessionid"], "test-session");
    assert_eq!(payload["symbols"], serde_json::json!(["SPY", "AAPL"]));
    assert_eq!(payload["filter"], serde_json::json!(["trade", "quote"]));
    assert_eq!(payload["validOnly"], true);
}

#[tokio::test(start_paused = true)]
async fn messages_are_batched_into_windows() {
    let harness = Harness::new(settings(Duration::from_secs(10)));
    harness.send_at(Duration::ZERO, text("m1"));
    harness.send_at(Duration::from_secs(3), text("m2"));
    harness.send_at(Duration::from_secs(12), text("m3"));

    let reason = harness
        .spawn_connect(Duration::from_secs(25))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(reason, ShutdownReason::Deadline);
    assert_eq!(
        harness.windows(),
        vec![strings(&["m1", "m2"]), strings(&["m3"])]
    );
    assert!(harness.observed.closed.load(Ordering::SeqCst));
    assert_reset(&harness.client);
}

#[tokio::test(start_paused = true)]
async fn empty_windows_are_still_delivered() {
    let harness = Harness::new(settings(Duration::from_secs(1)));

    harness
        .spawn_connect(Duration::from_millis(3500))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(harness.windows(), vec![Vec::<String>::new(); 3]);
}

#[tokio::test(start_paused = true)]
async fn deadline_stops_a_busy_stream() {
    let harness = Harness::new(settings(Duration::from_secs(60)));
    let feeder = {
        let tx = harness.frames.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(100));
            for i in 0.. {
                ticker.tick().await;
                if tx.send(text(&format!("tick-{i}"))).is_err() {
                    break;
                }
            }
        })
    };

    let start = Instant::now();
    let reason = harness
        .spawn_connect(Duration::from_secs(2))
        .await
        .unwrap()
        .unwrap();
    let elapsed = start.elapsed();
    feeder.abort();

    assert_eq!(reason, ShutdownReason::Deadline);
    assert!(elapsed >= Duration::from_millis(1900), "{elapsed:?}");
    assert!(elapsed <= Duration::from_millis(2100), "{elapsed:?}");
    assert_reset(&harness.client);
}

#[tokio::test(start_paused = true)]
async fn past_stoptime_shuts_down_immediately() {
    let harness = Harness::new(settings(Duration::from_secs(10)));
    let client = Arc::clone(&harness.client);

    let start = Instant::now();
    let reason = client
        .connect(Utc::now() - chrono::Duration::minutes(5), |_: Vec<String>| {})
        .await
        .unwrap();

    assert_eq!(reason, ShutdownReason::Deadline);
    assert!(start.elapsed() < Duration::from_millis(10));
    assert_reset(&client);
}

#[tokio::test(start_paused = true)]
async fn manual_shutdown_is_idempotent() {
    let harness = Harness::new(settings(Duration::from_secs(10)));
    harness.send_at(Duration::from_millis(500), text("m1"));
    let handle = harness.spawn_connect(Duration::from_secs(60));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.client.state(), StreamState::Connected);
    assert_eq!(harness.client.sequence(), 1);
    assert_eq!(harness.client.pending_messages(), 1);

    assert_eq!(
        harness.client.shutdown(ShutdownReason::Requested),
        ShutdownReason::Requested
    );
    assert_eq!(
        harness.client.shutdown(ShutdownReason::Interrupted),
        ShutdownReason::Requested
    );

    let reason = handle.await.unwrap().unwrap();

    assert_eq!(reason, ShutdownReason::Requested);
    assert!(harness.observed.closed.load(Ordering::SeqCst));
    assert_reset(&harness.client);
    assert!(harness.windows().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_racing_deadline_is_safe() {
    let harness = Harness::new(settings(Duration::from_secs(10)));
    let handle = harness.spawn_connect(Duration::from_secs(2));

    tokio::time::sleep(Duration::from_secs(2)).await;
    let manual = harness.client.shutdown(ShutdownReason::Requested);

    let reason = handle.await.unwrap().unwrap();

    assert!(matches!(
        reason,
        ShutdownReason::Requested | ShutdownReason::Deadline
    ));
    assert_eq!(manual, reason);
    assert_reset(&harness.client);
    assert_reset(&harness.client);
}

#[tokio::test(start_paused = true)]
async fn active_session_rejects_reconfiguration() {
    let harness = Harness::new(settings(Duration::from_secs(10)));
    let handle = harness.spawn_connect(Duration::from_secs(30));

    tokio::time::sleep(Duration::from_secs(1)).await;

    let err = harness
        .client
        .register_subscription(["MSFT"], ["trade"], SubscriptionSettings::default())
        .unwrap_err();
    assert!(matches!(err, StreamError::Configuration(_)));

    let err = harness
        .client
        .connect(Utc::now() + chrono::Duration::seconds(5), |_: Vec<String>| {})
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::Configuration(_)));
    assert_eq!(harness.client.subscription().unwrap().symbols(), ["SPY", "AAPL"]);

    harness.client.shutdown(ShutdownReason::Requested);
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn server_close_ends_session() {
    let harness = Harness::new(settings(Duration::from_secs(10)));
    harness.send_at(Duration::from_secs(1), text("m1"));
    harness.send_at(Duration::from_secs(2), Ok(InboundFrame::Close));

    let reason = harness
        .spawn_connect(Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(reason, ShutdownReason::ConnectionClosed);
    assert!(reason.is_error());
    assert!(harness.windows().is_empty());
    assert_reset(&harness.client);
}

#[tokio::test(start_paused = true)]
async fn transport_errors_are_classified() {
    let cases = [
        (
            Err(TransportError::Payload("bad frame".to_string())),
            ShutdownReason::Payload("bad frame".to_string()),
        ),
        (Err(TransportError::Timeout), ShutdownReason::Timeout),
        (Err(TransportError::Closed), ShutdownReason::ConnectionClosed),
        (
            Err(TransportError::Other("tls".to_string())),
            ShutdownReason::Unhandled("tls".to_string()),
        ),
    ];

    for (frame, expected) in cases {
        let harness = Harness::new(settings(Duration::from_secs(10)));
        harness.send_at(Duration::from_secs(1), frame);

        let reason = harness
            .spawn_connect(Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reason, expected);
        assert_reset(&harness.client);
    }
}

#[tokio::test(start_paused = true)]
async fn invalid_utf8_binary_is_payload_error() {
    let harness = Harness::new(settings(Duration::from_secs(10)));
    harness.send_at(
        Duration::from_secs(1),
        Ok(InboundFrame::Binary(b"{\"type\":\"trade\"}".to_vec())),
    );
    harness.send_at(Duration::from_secs(2), Ok(InboundFrame::Binary(vec![0xff, 0xfe])));

    let reason = harness
        .spawn_connect(Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(reason, ShutdownReason::Payload(_)));
}

#[tokio::test(start_paused = true)]
async fn unanswered_ping_times_out() {
    let mut settings = settings(Duration::from_secs(60));
    settings.keepalive = Some(KeepaliveConfig {
        ping_interval: Duration::from_secs(10),
        ping_timeout: Duration::from_secs(5),
    });
    let harness = Harness::new(settings);

    let start = Instant::now();
    let reason = harness
        .spawn_connect(Duration::from_secs(120))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(reason, ShutdownReason::Timeout);
    assert_eq!(harness.observed.pings.load(Ordering::SeqCst), 1);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(15), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(16), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn answered_pings_keep_session_alive() {
    let mut settings = settings(Duration::from_secs(60));
    settings.keepalive = Some(KeepaliveConfig::default());
    let harness = Harness::with_pong(settings, true);

    let reason = harness
        .spawn_connect(Duration::from_secs(45))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(reason, ShutdownReason::Deadline);
    assert_eq!(harness.observed.pings.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn reconnect_after_shutdown_uses_fresh_token() {
    let harness = Harness::new(settings(Duration::from_secs(10)));
    harness
        .spawn_connect(Duration::from_secs(1))
        .await
        .unwrap()
        .unwrap();

    // The scripted connector only has one connection to hand out.
    let err = harness
        .spawn_connect(Duration::from_secs(1))
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, StreamError::Connection(_)));
    assert_eq!(harness.tokens.calls.load(Ordering::SeqCst), 2);
    assert_reset(&harness.client);
}
