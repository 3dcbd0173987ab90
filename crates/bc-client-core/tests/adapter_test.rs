//! Drives the protocol adapter through its public surface only: feed a raw
//! frame (built from a `bc-protocol` fixture, gzip+base64-compressed the
//! way the server does) onto the raw-frame channel and observe the typed
//! event it emits on the bus.

mod common;

use std::sync::Arc;

use bc_client_core::{EventBus, ProtocolAdapter};
use bc_protocol::HandlerEvent;
use tokio::sync::broadcast;

#[tokio::test]
async fn session_info_handler_batch_is_resolved_into_an_event() {
    common::init_tracing();

    let handlers_json = bc_protocol::fixtures::session_info_handlers_json("sess-1", "key-1", "CRONUS", "3F");
    let payload = bc_protocol::fixtures::compress_handlers_json(&handlers_json);

    let raw = serde_json::json!({
        "jsonrpc": "2.0",
        "id": uuid::Uuid::new_v4().to_string(),
        "result": { "compressedResult": payload.as_str() },
    });

    let (raw_tx, raw_rx) = broadcast::channel(16);
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();

    let adapter = Arc::new(ProtocolAdapter::new());
    let handle = adapter.spawn(raw_rx, bus);

    raw_tx.send(Arc::new(raw)).unwrap();

    let event = tokio::time::timeout(std::time::Duration::from_secs(1), events.recv())
        .await
        .expect("adapter should emit an event before the timeout")
        .unwrap();

    assert!(matches!(
        *event,
        HandlerEvent::SessionInfo { server_session_id: Some(ref id), .. } if id == "sess-1"
    ));

    drop(raw_tx);
    handle.await.unwrap();
}
