//! Pub/sub for [`HandlerEvent`]s plus predicate-based waiting with
//! timeout/cancellation. See spec.md §4.5.
//!
//! Built on `tokio::sync::broadcast`: each subscriber gets its own receiver,
//! so a panicking predicate in one `wait_for` call cannot affect another —
//! the isolation spec.md asks for falls out of the channel model rather
//! than needing a hand-rolled listener list with try/catch.

use std::sync::Arc;
use std::time::Duration;

use bc_protocol::HandlerEvent;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::error::BcClientError;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<HandlerEvent>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<HandlerEvent>> {
        self.sender.subscribe()
    }

    /// Emit an event to every current subscriber. A lagged or fully-dropped
    /// receiver is not an error for the emitter — it only affects that one
    /// subscriber's next `recv`.
    pub fn emit(&self, event: HandlerEvent) {
        let _ = self.sender.send(Arc::new(event));
    }

    /// Resolve on the first event for which `predicate` returns `Some`.
    /// Rejects with [`BcClientError::Timeout`] if `timeout` elapses first,
    /// or [`BcClientError::Aborted`] if `cancel` fires first.
    ///
    /// Callers MUST call `subscribe()` (or otherwise ensure their
    /// subscription predates the triggering `invoke`) before issuing the
    /// request that is expected to produce the matching event — events are
    /// not buffered for subscribers that don't exist yet.
    #[instrument(skip(self, predicate, cancel), fields(operation = operation))]
    pub async fn wait_for<T, F>(
        &self,
        mut receiver: broadcast::Receiver<Arc<HandlerEvent>>,
        mut predicate: F,
        operation: &str,
        timeout: Duration,
        cancel: Option<CancellationToken>,
    ) -> Result<T, BcClientError>
    where
        F: FnMut(&HandlerEvent) -> Option<T>,
    {
        let cancel = cancel.unwrap_or_default();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    return Err(BcClientError::Aborted {
                        operation: operation.to_string(),
                        reason: "external cancellation".to_string(),
                    });
                }
                () = &mut deadline => {
                    return Err(BcClientError::Timeout {
                        operation: operation.to_string(),
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    });
                }
                received = receiver.recv() => {
                    match received {
                        Ok(event) => {
                            if let Some(value) = predicate(&event) {
                                return Ok(value);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "wait_for receiver lagged, some events were missed");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(BcClientError::Connection(
                                crate::error::ConnectionError::NotConnected,
                            ));
                        }
                    }
                }
            }
        }
        // Dropping `receiver` here unsubscribes exactly once, on every
        // termination path (match, timeout, abort) because it's owned by
        // this stack frame.
    }
}
