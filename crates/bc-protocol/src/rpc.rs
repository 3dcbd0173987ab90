//! JSON-RPC 2.0 envelope for the `csh` WebSocket endpoint.
//!
//! Outbound frames are always requests (`OpenSession` / `Invoke`) carrying a
//! fresh UUID `id`. Inbound frames are either a JSON-RPC response matching
//! that `id`, or a `"Message"` notification that may carry the actual
//! compressed payload asynchronously (see [`InboundFrame`]).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const METHOD_OPEN_SESSION: &str = "OpenSession";
pub const METHOD_INVOKE: &str = "Invoke";

/// A JSON-RPC request id. Only this module can mint one (via
/// [`RpcRequest::new`]) — mirrors the teacher's `ConnectionId`
/// newtype-with-private-constructor idiom, so a pending-request map can't
/// be indexed by a caller-fabricated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn inner(self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub method: &'static str,
    pub params: Value,
}

impl RpcRequest {
    #[must_use]
    pub fn new(method: &'static str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: RequestId::new(),
            method,
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
}

/// A compressed handler-array payload, as attached to either a JSON-RPC
/// `result` or a `"Message"` notification's `params[0]`.
#[derive(Debug, Clone)]
pub enum CompressedPayload {
    Result(String),
    Data(String),
}

impl CompressedPayload {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Result(s) | Self::Data(s) => s,
        }
    }

    fn extract(value: &Value) -> Option<Self> {
        if let Some(s) = value.get("compressedResult").and_then(Value::as_str) {
            return Some(Self::Result(s.to_string()));
        }
        if let Some(s) = value.get("compressedData").and_then(Value::as_str) {
            return Some(Self::Data(s.to_string()));
        }
        None
    }
}

/// A fully classified inbound WebSocket frame. Classification follows
/// spec.md §4.2's matching rules (a)-(d).
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// Rule (a): response with a matching id and a compressed payload.
    Resolved {
        id: RequestId,
        payload: CompressedPayload,
    },
    /// Rule (b): response with a matching id and only an error.
    Failed { id: RequestId, error: RpcErrorBody },
    /// Rule (c): response with a matching id but no compressed payload —
    /// an ack only. The request this matches stays pending.
    AckOnly { id: RequestId },
    /// Rule (d): a `"Message"` notification. `sequence_number` always
    /// advances `lastServerSequence`; `payload` is present when the
    /// notification also carries the oldest pending request's result.
    Message {
        sequence_number: u64,
        payload: Option<CompressedPayload>,
    },
    /// Anything that doesn't match the JSON-RPC request/notification shape
    /// this protocol uses (unexpected fields, wrong jsonrpc version, ...).
    Unrecognized,
}

impl InboundFrame {
    /// Classify a raw inbound JSON value per spec.md §4.2.
    #[must_use]
    pub fn classify(raw: &Value) -> Self {
        let method = raw.get("method").and_then(Value::as_str);

        if method == Some("Message") {
            let params = raw.get("params").and_then(Value::as_array);
            let first = params.and_then(|p| p.first());
            let sequence_number = first
                .and_then(|p| p.get("sequenceNumber"))
                .and_then(Value::as_u64);
            let Some(sequence_number) = sequence_number else {
                return Self::Unrecognized;
            };
            let payload = first.and_then(CompressedPayload::extract);
            return Self::Message {
                sequence_number,
                payload,
            };
        }

        let Some(id) = raw
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(RequestId)
        else {
            return Self::Unrecognized;
        };

        if let Some(error) = raw.get("error") {
            if let Ok(error) = serde_json::from_value::<RpcErrorBody>(error.clone()) {
                return Self::Failed { id, error };
            }
        }

        let result = raw.get("result");
        let payload = result
            .and_then(CompressedPayload::extract)
            .or_else(|| CompressedPayload::extract(raw));

        match payload {
            Some(payload) => Self::Resolved { id, payload },
            None if result.is_some() => Self::AckOnly { id },
            None => Self::Unrecognized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_response_with_compressed_result() {
        let id = Uuid::new_v4();
        let raw = json!({
            "jsonrpc": "2.0",
            "id": id.to_string(),
            "result": { "compressedResult": "abc" },
        });
        match InboundFrame::classify(&raw) {
            InboundFrame::Resolved { id: got, payload } => {
                assert_eq!(got.inner(), id);
                assert_eq!(payload.as_str(), "abc");
            }
            other => panic!("expected Resolved, got {other:?}"),
        }
    }

    #[test]
    fn ack_only_response_stays_pending() {
        let id = Uuid::new_v4();
        let raw = json!({ "jsonrpc": "2.0", "id": id.to_string(), "result": {} });
        assert!(matches!(InboundFrame::classify(&raw), InboundFrame::AckOnly { id: got } if got.inner() == id));
    }

    #[test]
    fn message_notification_carries_sequence_number() {
        let raw = json!({
            "method": "Message",
            "params": [{ "sequenceNumber": 7, "compressedData": "xyz" }],
        });
        match InboundFrame::classify(&raw) {
            InboundFrame::Message { sequence_number, payload } => {
                assert_eq!(sequence_number, 7);
                assert_eq!(payload.unwrap().as_str(), "xyz");
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[test]
    fn error_response_fails_the_request() {
        let id = Uuid::new_v4();
        let raw = json!({
            "jsonrpc": "2.0",
            "id": id.to_string(),
            "error": { "code": -32000, "message": "boom" },
        });
        match InboundFrame::classify(&raw) {
            InboundFrame::Failed { id: got, error } => {
                assert_eq!(got.inner(), id);
                assert_eq!(error.message, "boom");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
