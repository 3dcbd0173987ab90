//! Owns session identity and issues `OpenSession`/`Invoke`. The only
//! component that mutates [`SessionState`]. See spec.md §4.6.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bc_protocol::interaction::{InvokeRequest, NavigationContext, OpenSessionRequest};
use bc_protocol::{Handler, HandlerEvent, Interaction};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::adapter::ProtocolAdapter;
use crate::error::{BcClientError, ConnectionError, ProtocolError};
use crate::event_bus::EventBus;
use crate::timezone::resolve_client_time_zone;
use crate::transport::Transport;

/// Current-process-stable identifier, used as the prefix of every
/// `sequenceNo` this session sends.
fn new_spa_instance_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Default, Clone)]
struct SessionState {
    session_id: Option<String>,
    session_key: Option<String>,
    company: Option<String>,
    role_center_form_id: Option<String>,
    open_form_ids: Vec<String>,
    client_sequence_counter: u64,
}

impl SessionState {
    fn push_form(&mut self, form_id: String) {
        if !self.open_form_ids.contains(&form_id) {
            self.open_form_ids.push(form_id);
        }
    }

    fn remove_form(&mut self, form_id: &str) {
        self.open_form_ids.retain(|id| id != form_id);
    }
}

/// Read-only snapshot of session identity, safe to hand to callers.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub session_key: String,
    pub company: String,
    pub role_center_form_id: String,
    pub open_form_ids: Vec<String>,
}

pub struct SessionManager {
    transport: Arc<Transport>,
    adapter: Arc<ProtocolAdapter>,
    bus: EventBus,
    state: Arc<Mutex<SessionState>>,
    spa_instance_id: String,
    tenant_id: String,
    rpc_timeout: Duration,
}

impl SessionManager {
    /// Construct the manager and start the background task that applies
    /// `SessionInfo`/`FormToShow` events into session state, in emission
    /// order, as they arrive — the manager's only write path besides the
    /// direct `CloseForm` bookkeeping in [`Self::invoke`].
    #[must_use]
    pub fn new(transport: Arc<Transport>, adapter: Arc<ProtocolAdapter>, bus: EventBus, tenant_id: String, rpc_timeout: Duration) -> Arc<Self> {
        let manager = Arc::new(Self {
            transport,
            adapter,
            bus: bus.clone(),
            state: Arc::new(Mutex::new(SessionState::default())),
            spa_instance_id: new_spa_instance_id(),
            tenant_id,
            rpc_timeout,
        });

        let state = Arc::clone(&manager.state);
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                apply_event(&state, &event);
            }
        });

        manager
    }

    #[must_use]
    pub fn spa_instance_id(&self) -> &str {
        &self.spa_instance_id
    }

    #[must_use]
    pub fn open_form_ids(&self) -> Vec<String> {
        self.state.lock().expect("session state mutex poisoned").open_form_ids.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let state = self.state.lock().expect("session state mutex poisoned");
        Some(SessionSnapshot {
            session_id: state.session_id.clone()?,
            session_key: state.session_key.clone()?,
            company: state.company.clone()?,
            role_center_form_id: state.role_center_form_id.clone()?,
            open_form_ids: state.open_form_ids.clone(),
        })
    }

    /// Open the session: send `OpenSession` carrying an implicit role-center
    /// `OpenForm` interaction, then wait for the `SessionInfo` event the
    /// protocol adapter derives from the response.
    #[instrument(skip(self))]
    pub async fn open_session(&self) -> Result<SessionSnapshot, BcClientError> {
        let rx = self.bus.subscribe();

        // The protocol carries a client time zone for server-side date/time
        // formatting; spec.md doesn't say where the IANA name comes from,
        // and BC itself is tenant-configured, so "UTC" is a safe default
        // rather than a guess at the operator's locale.
        let tz = resolve_client_time_zone("UTC", chrono::Utc::now());

        // An empty Page selects the implicit role-center form rather than a
        // specific numbered page — BC creates it automatically at session
        // open.
        let role_center_interaction = Interaction::OpenForm {
            page: String::new(),
            load_data: true,
            is_reload: false,
        }
        .into_entry(Uuid::new_v4().to_string());

        let request = OpenSessionRequest::builder()
            .spa_instance_id(self.spa_instance_id.clone())
            .open_form_ids(Vec::new())
            .sequence_no(None)
            .last_client_ack_sequence_number(-1)
            .tenant_id(self.tenant_id.clone())
            .supported_extensions(Vec::new())
            .client_time_zone(tz)
            .role_center_interaction(role_center_interaction)
            .build();

        let params = serde_json::to_value(&request).map_err(ProtocolError::from)?;

        let payload = self
            .transport
            .send_rpc_request("OpenSession", params, self.rpc_timeout, None)
            .await?;
        let handlers = bc_protocol::codec::decompress(&payload)?;
        // The adapter (subscribed to the same raw-frame stream) will also
        // parse this frame and emit SessionInfo; we additionally parse it
        // inline so a missing critical field fails this call directly
        // rather than only being observable via logs.
        let events = bc_protocol::parse_handlers(&handlers);
        let has_session_info = events.iter().any(|e| matches!(e, HandlerEvent::SessionInfo { .. }));
        if !has_session_info {
            return Err(BcClientError::Protocol(ProtocolError::MalformedHandler(
                "session initialization incomplete: no SessionInfo handler in OpenSession response".to_string(),
            )));
        }

        self.bus
            .wait_for(
                rx,
                |event| match event {
                    HandlerEvent::SessionInfo { .. } => Some(()),
                    _ => None,
                },
                "open_session",
                self.rpc_timeout,
                None,
            )
            .await?;

        self.snapshot().ok_or_else(|| {
            BcClientError::Protocol(ProtocolError::MalformedHandler(
                "session initialization incomplete: required fields missing".to_string(),
            ))
        })
    }

    /// Send an `Invoke` carrying one or more interactions and return the
    /// primary handler batch from the response. See spec.md §4.6 "Invoke
    /// algorithm".
    #[instrument(skip(self, interactions, cancel))]
    pub async fn invoke(
        &self,
        interactions: Vec<Interaction>,
        open_form_ids_override: Option<Vec<String>>,
        cancel: Option<CancellationToken>,
    ) -> Result<Vec<Handler>, BcClientError> {
        let snapshot = self
            .snapshot()
            .ok_or(BcClientError::Connection(ConnectionError::NotInitialized))?;

        let sequence_no = {
            let mut state = self.state.lock().expect("session state mutex poisoned");
            state.client_sequence_counter += 1;
            format!("{}#{}", self.spa_instance_id, state.client_sequence_counter)
        };

        let open_form_ids = open_form_ids_override.unwrap_or_else(|| self.open_form_ids());
        let last_client_ack_sequence_number = i64::try_from(self.adapter.last_server_sequence()).unwrap_or(i64::MAX);

        let close_form_ids: Vec<String> = interactions
            .iter()
            .filter_map(|i| matches!(i, Interaction::CloseForm { .. }).then(|| i.form_id()).flatten())
            .collect();

        let entries = interactions
            .into_iter()
            .map(|i| i.into_entry(Uuid::new_v4().to_string()))
            .collect();

        let request = InvokeRequest::builder()
            .open_form_ids(open_form_ids)
            .session_id(snapshot.session_id)
            .session_key(snapshot.session_key)
            .company(snapshot.company)
            .sequence_no(sequence_no)
            .last_client_ack_sequence_number(last_client_ack_sequence_number)
            .tenant_id(self.tenant_id.clone())
            .navigation_context(
                NavigationContext::builder()
                    .application_id("bc-web-client")
                    .device_category("Desktop")
                    .spa_instance_id(self.spa_instance_id.clone())
                    .build(),
            )
            .supported_extensions(Vec::new())
            .interactions_to_invoke(entries)
            .telemetry_client_session_id(self.spa_instance_id.clone())
            .features(Vec::new())
            .build();

        let params = serde_json::to_value(&request).map_err(ProtocolError::from)?;

        let payload = self
            .transport
            .send_rpc_request("Invoke", params, self.rpc_timeout, cancel)
            .await?;
        let handlers = bc_protocol::codec::decompress(&payload)?;

        if !close_form_ids.is_empty() {
            let mut state = self.state.lock().expect("session state mutex poisoned");
            for form_id in &close_form_ids {
                state.remove_form(form_id);
            }
            info!(?close_form_ids, "removed closed forms from open form stack");
        }

        Ok(handlers)
    }
}

fn apply_event(state: &Arc<Mutex<SessionState>>, event: &HandlerEvent) {
    let mut state = state.lock().expect("session state mutex poisoned");
    match event {
        HandlerEvent::SessionInfo {
            server_session_id,
            session_key,
            company_name,
            role_center_form_id,
        } => {
            if let Some(v) = server_session_id {
                state.session_id = Some(v.clone());
            }
            if let Some(v) = session_key {
                state.session_key = Some(v.clone());
            }
            if let Some(v) = company_name {
                state.company = Some(v.clone());
            }
            if let Some(v) = role_center_form_id {
                state.role_center_form_id = Some(v.clone());
            }
        }
        HandlerEvent::FormToShow { form_id, .. } => {
            state.push_form(form_id.clone());
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_form_ids_has_no_duplicates_and_preserves_order() {
        let mut state = SessionState::default();
        state.push_form("3F".to_string());
        state.push_form("4A".to_string());
        state.push_form("3F".to_string());
        assert_eq!(state.open_form_ids, vec!["3F".to_string(), "4A".to_string()]);

        state.remove_form("3F");
        assert_eq!(state.open_form_ids, vec!["4A".to_string()]);
    }

    #[test]
    fn sequence_no_format_is_spa_instance_hash_counter() {
        let state = Arc::new(Mutex::new(SessionState::default()));
        {
            let mut s = state.lock().unwrap();
            s.client_sequence_counter += 1;
        }
        let spa = "abc-123";
        let counter = state.lock().unwrap().client_sequence_counter;
        assert_eq!(format!("{spa}#{counter}"), "abc-123#1");
    }
}
