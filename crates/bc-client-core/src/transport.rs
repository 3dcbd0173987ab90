//! WebSocket transport: opens the `csh` endpoint, sends JSON-RPC requests,
//! matches responses to requests per spec.md §4.2, and republishes every
//! inbound frame for the protocol adapter to parse.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bc_protocol::rpc::{CompressedPayload, InboundFrame, RpcErrorBody, METHOD_INVOKE, METHOD_OPEN_SESSION};
use bc_protocol::{RequestId, RpcRequest};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{BcClientError, ConnectionError};

type PendingResult = Result<CompressedPayload, RpcErrorBody>;

#[derive(Default)]
struct PendingRequests {
    by_id: HashMap<RequestId, oneshot::Sender<PendingResult>>,
    /// Insertion order, oldest first — used to resolve rule (d): a
    /// `"Message"` notification with a payload resolves the oldest pending
    /// request, not any particular `id`.
    order: VecDeque<RequestId>,
}

impl PendingRequests {
    fn insert(&mut self, id: RequestId, tx: oneshot::Sender<PendingResult>) {
        self.by_id.insert(id, tx);
        self.order.push_back(id);
    }

    fn resolve(&mut self, id: RequestId, result: PendingResult) {
        if let Some(tx) = self.by_id.remove(&id) {
            self.order.retain(|pending| *pending != id);
            let _ = tx.send(result);
        }
    }

    fn resolve_oldest(&mut self, result: PendingResult) {
        if let Some(id) = self.order.pop_front() {
            if let Some(tx) = self.by_id.remove(&id) {
                let _ = tx.send(result);
            }
        }
    }

    fn drain_with_connection_error(&mut self) {
        self.order.clear();
        for (_, tx) in self.by_id.drain() {
            let _ = tx.send(Err(RpcErrorBody {
                code: -1,
                message: "connection closed".to_string(),
            }));
        }
    }
}

/// Build the `csh` WebSocket URL from an HTTP(S) base URL and CSRF token.
pub fn to_ws_url(base_url: &str, csrf_token: &str) -> Result<String, BcClientError> {
    let mut url = url::Url::parse(base_url)
        .map_err(|e| BcClientError::Connection(ConnectionError::Socket(e.to_string())))?;

    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(BcClientError::Connection(ConnectionError::Socket(format!(
                "unsupported base_url scheme: {other}"
            ))))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| BcClientError::Connection(ConnectionError::Socket("cannot set ws scheme".into())))?;
    url.set_path("csh");
    url.set_query(Some(&format!("ackseqnb=-1&csrftoken={csrf_token}")));
    Ok(url.to_string())
}

pub struct Transport {
    outbound: mpsc::UnboundedSender<WsMessage>,
    pending: Arc<Mutex<PendingRequests>>,
    raw_frames: broadcast::Sender<Arc<Value>>,
    closed: Arc<std::sync::atomic::AtomicBool>,
}

impl Transport {
    /// Open the WebSocket to `{scheme}://{host}/csh?...` with the session
    /// cookies attached as a `Cookie` header.
    #[instrument(skip(cookie_header))]
    pub async fn connect(base_url: &str, cookie_header: &str, csrf_token: &str) -> Result<Self, BcClientError> {
        let ws_url = to_ws_url(base_url, csrf_token)?;

        let mut request = ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| BcClientError::Connection(ConnectionError::Socket(e.to_string())))?;
        request.headers_mut().insert(
            "Cookie",
            cookie_header
                .parse()
                .map_err(|e: tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue| {
                    BcClientError::Connection(ConnectionError::Socket(e.to_string()))
                })?,
        );

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| BcClientError::Connection(ConnectionError::Socket(e.to_string())))?;

        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();
        let pending = Arc::new(Mutex::new(PendingRequests::default()));
        let (raw_tx, _raw_rx) = broadcast::channel(256);
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));

        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        {
            let pending = Arc::clone(&pending);
            let raw_tx = raw_tx.clone();
            let closed = Arc::clone(&closed);
            tokio::spawn(async move {
                while let Some(msg) = read.next().await {
                    match msg {
                        Ok(WsMessage::Text(text)) => {
                            handle_inbound_text(&text, &pending, &raw_tx);
                        }
                        Ok(WsMessage::Close(_)) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
                closed.store(true, std::sync::atomic::Ordering::SeqCst);
                pending.lock().expect("pending mutex poisoned").drain_with_connection_error();
            });
        }

        Ok(Self {
            outbound: outbound_tx,
            pending,
            raw_frames: raw_tx,
            closed,
        })
    }

    #[must_use]
    pub fn subscribe_raw(&self) -> broadcast::Receiver<Arc<Value>> {
        self.raw_frames.subscribe()
    }

    /// Send an `OpenSession` or `Invoke` JSON-RPC request and await the
    /// first response that resolves it, per spec.md §4.2's matching rules.
    #[instrument(skip(self, params, cancel))]
    pub async fn send_rpc_request(
        &self,
        method: &'static str,
        params: Value,
        timeout: Duration,
        cancel: Option<CancellationToken>,
    ) -> Result<CompressedPayload, BcClientError> {
        debug_assert!(method == METHOD_OPEN_SESSION || method == METHOD_INVOKE);

        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BcClientError::Connection(ConnectionError::NotConnected));
        }

        let request = RpcRequest::new(method, params);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending mutex poisoned")
            .insert(request.id, tx);

        let text = serde_json::to_string(&request).map_err(bc_protocol::ProtocolError::from)?;
        self.outbound
            .send(WsMessage::Text(text))
            .map_err(|e| BcClientError::Connection(ConnectionError::SendFailed(e.to_string())))?;

        let cancel = cancel.unwrap_or_default();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BcClientError::Aborted {
                operation: method.to_string(),
                reason: "external cancellation".to_string(),
            }),
            () = tokio::time::sleep(timeout) => Err(BcClientError::Timeout {
                operation: method.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            result = rx => {
                match result {
                    Ok(Ok(payload)) => Ok(payload),
                    Ok(Err(rpc_error)) => Err(BcClientError::Connection(ConnectionError::SendFailed(rpc_error.message))),
                    Err(_) => Err(BcClientError::Connection(ConnectionError::NotConnected)),
                }
            }
        }
    }
}

fn handle_inbound_text(
    text: &str,
    pending: &Arc<Mutex<PendingRequests>>,
    raw_tx: &broadcast::Sender<Arc<Value>>,
) {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        warn!("received non-JSON WebSocket frame, ignoring");
        return;
    };
    let value = Arc::new(value);
    let _ = raw_tx.send(Arc::clone(&value));

    match InboundFrame::classify(&value) {
        InboundFrame::Resolved { id, payload } => {
            pending.lock().expect("pending mutex poisoned").resolve(id, Ok(payload));
        }
        InboundFrame::Failed { id, error } => {
            pending.lock().expect("pending mutex poisoned").resolve(id, Err(error));
        }
        InboundFrame::AckOnly { id } => {
            debug!(%id, "ack-only response, request stays pending");
        }
        InboundFrame::Message { payload: Some(payload), .. } => {
            pending.lock().expect("pending mutex poisoned").resolve_oldest(Ok(payload));
        }
        InboundFrame::Message { payload: None, .. } | InboundFrame::Unrecognized => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_uses_wss_for_https_base() {
        let url = to_ws_url("https://cronus27/BC", "token-abc").unwrap();
        assert!(url.starts_with("wss://cronus27/csh?"));
        assert!(url.contains("csrftoken=token-abc"));
        assert!(url.contains("ackseqnb=-1"));
    }

    #[test]
    fn ws_url_uses_ws_for_http_base() {
        let url = to_ws_url("http://cronus27/BC", "t").unwrap();
        assert!(url.starts_with("ws://cronus27/csh?"));
    }

    #[test]
    fn resolve_oldest_matches_fifo_order() {
        let mut pending = PendingRequests::default();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        let req1 = RpcRequest::new(METHOD_INVOKE, serde_json::json!({}));
        let req2 = RpcRequest::new(METHOD_INVOKE, serde_json::json!({}));
        pending.insert(req1.id, tx1);
        pending.insert(req2.id, tx2);

        pending.resolve_oldest(Ok(CompressedPayload::Data("first".to_string())));

        assert_eq!(rx1.blocking_recv().unwrap().unwrap().as_str(), "first");
        assert!(rx2.try_recv().is_err());
    }
}
