//! Heartbeat Monitor
//!
//! Periodically reports session liveness (messages received since connect)
//! while a streaming session is connected. Purely observational: it never
//! acts on the connection, and exits on cancellation or as soon as it sees
//! the session is no longer connected.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::streaming::SessionState;

/// Configuration for heartbeat reporting.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between liveness reports.
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

/// Heartbeat task bound to one streaming session.
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    session: Arc<Mutex<SessionState>>,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Create a new heartbeat monitor.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        session: Arc<Mutex<SessionState>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            session,
            cancel,
        }
    }

    /// Spawn the monitor onto the runtime.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }

    /// Run the reporting loop. Returns the number of reports emitted.
    pub async fn run(self) -> u64 {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut beats = 0;

        tracing::debug!("Entered heartbeat");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat cancelled");
                    break;
                }
                _ = interval.tick() => {
                    let (state, sequence) = {
                        let session = self.session.lock();
                        (session.state(), session.sequence())
                    };

                    if !state.is_connected() {
                        tracing::debug!(state = state.as_str(), "Exiting heartbeat");
                        break;
                    }

                    beats += 1;
                    tracing::info!(sequence, "Stream heartbeat");
                }
            }
        }

        beats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_session() -> Arc<Mutex<SessionState>> {
        let mut session = SessionState::new();
        session.begin_connecting();
        session.mark_connected();
        Arc::new(Mutex::new(session))
    }

    #[test]
    fn default_interval() {
        assert_eq!(HeartbeatConfig::default().interval, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn reports_while_connected_until_cancelled() {
        let session = connected_session();
        let cancel = CancellationToken::new();
        let handle = HeartbeatMonitor::new(
            HeartbeatConfig::new(Duration::from_secs(10)),
            Arc::clone(&session),
            cancel.clone(),
        )
        .spawn();

        // Ticks at 0s, 10s and 20s.
        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exits_once_session_disconnects() {
        let session = connected_session();
        let handle = HeartbeatMonitor::new(
            HeartbeatConfig::new(Duration::from_secs(1)),
            Arc::clone(&session),
            CancellationToken::new(),
        )
        .spawn();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        session.lock().reset();

        let beats = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("heartbeat should exit on its own")
            .unwrap();
        assert_eq!(beats, 2);
    }

    #[tokio::test]
    async fn never_reports_for_disconnected_session() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let beats = HeartbeatMonitor::new(
            HeartbeatConfig::default(),
            session,
            CancellationToken::new(),
        )
        .run()
        .await;
        assert_eq!(beats, 0);
    }
}
