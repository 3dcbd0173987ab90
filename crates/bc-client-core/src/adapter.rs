//! Subscribes to the transport's raw-frame stream, emits typed
//! [`HandlerEvent`]s on the [`EventBus`], and tracks the server sequence
//! number. See spec.md §4.4.
//!
//! The adapter owns no state other than `last_server_sequence`. It never
//! mutates `Session` or `Form` state directly — the session manager
//! subscribes to the same bus and does that. There is no back-edge from
//! here to the session manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bc_protocol::rpc::{CompressedPayload, InboundFrame};
use bc_protocol::HandlerEvent;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::event_bus::EventBus;

pub struct ProtocolAdapter {
    last_server_sequence: AtomicU64,
}

impl Default for ProtocolAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_server_sequence: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn last_server_sequence(&self) -> u64 {
        self.last_server_sequence.load(Ordering::SeqCst)
    }

    /// Run the adapter loop until the raw-frame channel closes. Spawn this
    /// once per session, alongside the transport.
    pub fn spawn(self: Arc<Self>, mut raw_rx: broadcast::Receiver<Arc<Value>>, bus: EventBus) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match raw_rx.recv().await {
                    Ok(raw) => self.handle_raw_frame(&raw, &bus),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "protocol adapter lagged behind raw frame stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn handle_raw_frame(&self, raw: &Value, bus: &EventBus) {
        match InboundFrame::classify(raw) {
            InboundFrame::Message {
                sequence_number,
                payload,
            } => {
                self.last_server_sequence
                    .fetch_max(sequence_number, Ordering::SeqCst);
                bus.emit(HandlerEvent::Message { sequence_number });
                if let Some(payload) = payload {
                    self.decompress_and_emit(&payload, bus);
                }
            }
            InboundFrame::Resolved { payload, .. } => {
                self.decompress_and_emit(&payload, bus);
            }
            InboundFrame::Failed { .. } | InboundFrame::AckOnly { .. } | InboundFrame::Unrecognized => {}
        }
    }

    fn decompress_and_emit(&self, payload: &CompressedPayload, bus: &EventBus) {
        match bc_protocol::codec::decompress(payload) {
            Ok(handlers) => {
                for event in bc_protocol::parse_handlers(&handlers) {
                    bus.emit(event);
                }
            }
            Err(error) => {
                // Non-critical handlers failing to parse shouldn't kill the
                // event stream; missing session-info fields is the one
                // failure mode critical enough to be raised, and that's
                // judged by the session manager once it fails to find what
                // it needs, not here.
                warn!(%error, "failed to decompress handler payload, dropping frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn message_frame_advances_sequence_and_emits_event() {
        let adapter = Arc::new(ProtocolAdapter::new());
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let raw = json!({ "method": "Message", "params": [{ "sequenceNumber": 5 }] });
        adapter.handle_raw_frame(&raw, &bus);

        assert_eq!(adapter.last_server_sequence(), 5);
        let event = rx.recv().await.unwrap();
        assert!(matches!(*event, HandlerEvent::Message { sequence_number: 5 }));
    }

    #[test]
    fn sequence_only_advances_never_regresses() {
        let adapter = ProtocolAdapter::new();
        let bus = EventBus::new(16);
        adapter.handle_raw_frame(&json!({ "method": "Message", "params": [{ "sequenceNumber": 10 }] }), &bus);
        adapter.handle_raw_frame(&json!({ "method": "Message", "params": [{ "sequenceNumber": 3 }] }), &bus);
        assert_eq!(adapter.last_server_sequence(), 10);
    }
}
