//! History Dispatcher
//!
//! Drains a FIFO queue of request descriptors through a [`HistoryTransport`]
//! at a bounded rate. Requests are strictly serialized: the next one is not
//! issued until the previous one has finished (including its retries) and
//! at least `min_delay` has passed since it was issued.
//!
//! Every descriptor produces exactly one sink call, either the decoded
//! payload or its final failure. A failing descriptor never aborts the rest
//! of the queue.

use std::time::Duration;

use tokio::time::Instant;

use crate::application::ports::{HistoryTransport, ResponseSink};
use crate::domain::history::RequestDescriptor;
use crate::infrastructure::metrics;

/// Outcome counts for one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Descriptors whose payload reached the sink.
    pub succeeded: usize,
    /// Descriptors whose failure reached the sink.
    pub failed: usize,
}

impl DrainSummary {
    /// Total descriptors processed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Rate-limited, sequential history request pipeline.
#[derive(Debug)]
pub struct Dispatcher<T> {
    transport: T,
    queue: Vec<RequestDescriptor>,
    last_issued: Option<Instant>,
}

impl<T: HistoryTransport> Dispatcher<T> {
    /// Create a dispatcher with an empty queue.
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            queue: Vec::new(),
            last_issued: None,
        }
    }

    /// Append a descriptor to the queue.
    pub fn enqueue(&mut self, descriptor: RequestDescriptor) {
        tracing::debug!(url = %descriptor, "Request queued");
        self.queue.push(descriptor);
    }

    /// Append several descriptors, keeping their order.
    pub fn extend(&mut self, descriptors: impl IntoIterator<Item = RequestDescriptor>) {
        for descriptor in descriptors {
            self.enqueue(descriptor);
        }
    }

    /// Descriptors waiting for the next drain.
    #[must_use]
    pub fn queued(&self) -> &[RequestDescriptor] {
        &self.queue
    }

    /// When the most recent request was issued, if any.
    #[must_use]
    pub const fn last_issued(&self) -> Option<Instant> {
        self.last_issued
    }

    /// Borrow the transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Issue every queued descriptor in order and clear the queue.
    ///
    /// The first request of a pass is issued immediately; each following one
    /// waits until `min_delay` has elapsed since the previous issue. Returns
    /// once every descriptor has reached success or final failure.
    pub async fn drain<S>(&mut self, sink: &mut S, min_delay: Duration) -> DrainSummary
    where
        S: ResponseSink + ?Sized,
    {
        let mut summary = DrainSummary::default();

        if self.queue.is_empty() {
            tracing::warn!("No requests queued, nothing to drain");
            return summary;
        }

        tracing::info!(
            requests = self.queue.len(),
            min_delay_ms = min_delay.as_millis(),
            "Draining request queue"
        );

        let mut previous: Option<Instant> = None;

        for descriptor in &self.queue {
            if let Some(previous) = previous {
                tokio::time::sleep_until(previous + min_delay).await;
            }

            let issued = Instant::now();
            previous = Some(issued);
            self.last_issued = Some(issued);

            let result = self.transport.fetch(descriptor).await;
            metrics::record_request(result.is_ok());

            match &result {
                Ok(_) => {
                    summary.succeeded += 1;
                    tracing::debug!(url = %descriptor, "Request succeeded");
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(url = %descriptor, error = %e, "Request failed");
                }
            }

            sink.accept(descriptor, result);
        }

        self.queue.clear();

        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Request queue drained"
        );

        summary
    }
}
