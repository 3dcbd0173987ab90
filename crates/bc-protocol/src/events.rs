//! Translation of raw handler arrays into the small set of typed
//! [`HandlerEvent`] variants the rest of the system reasons about.

use serde_json::Value;

use crate::discriminator::CanonicalChange;
use crate::handler::{find_string_field, Handler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Message,
    Dialog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogKind {
    Confirm,
    YesNo,
}

/// A tagged union of everything the protocol adapter can observe in a
/// handler stream. See spec.md §3 "Handler Event".
#[derive(Debug, Clone)]
pub enum HandlerEvent {
    FormToShow {
        form_id: String,
        caption: Option<String>,
    },
    DataRefreshChange {
        form_id: Option<String>,
        control_path: Option<String>,
    },
    Message {
        sequence_number: u64,
    },
    SessionInfo {
        server_session_id: Option<String>,
        session_key: Option<String>,
        company_name: Option<String>,
        role_center_form_id: Option<String>,
    },
    RawHandlers {
        handlers: Vec<Handler>,
    },
    CallbackResponse {
        raw: Value,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
    ValidationMessage {
        field: Option<String>,
        message: String,
    },
    Dialog {
        kind: DialogKind,
        message: String,
    },
}

/// Translate one decompressed handler array into zero or more events,
/// following spec.md §4.4's parsing rules. Callers are responsible for
/// emitting a leading [`HandlerEvent::Message`] (from the RPC envelope, not
/// from the handler array itself) before calling this.
#[must_use]
pub fn parse_handlers(handlers: &[Handler]) -> Vec<HandlerEvent> {
    let mut events = vec![HandlerEvent::RawHandlers {
        handlers: handlers.to_vec(),
    }];

    for handler in handlers {
        match handler.handler_type.as_str() {
            "LogicalClientEventRaisingHandler" => {
                if let Some(event) = parse_event_raising(handler) {
                    events.push(event);
                }
            }
            "CachedSessionInitHandler" | "SessionInitHandler" => {
                events.push(parse_session_info(handler));
            }
            "LogicalClientChangeHandler" => {
                events.extend(parse_change_handler(handler));
            }
            _ => {
                if let Some(event) = parse_validation_or_error(handler) {
                    events.push(event);
                }
                if let Some(event) = parse_dialog(handler) {
                    events.push(event);
                }
            }
        }
    }

    events
}

fn parse_event_raising(handler: &Handler) -> Option<HandlerEvent> {
    let first = handler.first_parameter()?;
    if first.as_str() != Some("FormToShow") {
        return None;
    }
    let params = handler.parameters.get(1)?;
    let form_id = find_string_field(params, "ServerId")?.to_string();
    let caption = find_string_field(params, "Caption").map(str::to_string);
    Some(HandlerEvent::FormToShow { form_id, caption })
}

fn parse_session_info(handler: &Handler) -> HandlerEvent {
    let tree = Value::Array(handler.parameters.clone());
    HandlerEvent::SessionInfo {
        server_session_id: find_string_field(&tree, "ServerSessionId").map(str::to_string),
        session_key: find_string_field(&tree, "SessionKey").map(str::to_string),
        company_name: find_string_field(&tree, "CompanyName").map(str::to_string),
        role_center_form_id: find_string_field(&tree, "ServerId").map(str::to_string),
    }
}

fn parse_change_handler(handler: &Handler) -> Vec<HandlerEvent> {
    let mut out = Vec::new();
    let Some(changes) = handler.first_parameter().and_then(Value::as_array) else {
        return out;
    };

    for change in changes {
        let Some(t) = change.get("t").and_then(Value::as_str) else {
            continue;
        };
        let Some(canonical) = CanonicalChange::from_wire(t) else {
            continue;
        };
        if matches!(canonical, CanonicalChange::DataRefreshChange) {
            out.push(HandlerEvent::DataRefreshChange {
                form_id: change
                    .get("formId")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                control_path: change
                    .get("controlPath")
                    .or_else(|| change.get("path"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
    }
    out
}

fn parse_validation_or_error(handler: &Handler) -> Option<HandlerEvent> {
    let tree = Value::Array(handler.parameters.clone());
    if let Some(msg) = find_string_field(&tree, "ValidationMessage") {
        return Some(HandlerEvent::ValidationMessage {
            field: find_string_field(&tree, "FieldName").map(str::to_string),
            message: msg.to_string(),
        });
    }
    if let Some(msg) = find_string_field(&tree, "ErrorMessage") {
        return Some(HandlerEvent::Error {
            kind: ErrorKind::Message,
            message: msg.to_string(),
        });
    }
    if let Some(msg) = find_string_field(&tree, "ErrorDialog") {
        return Some(HandlerEvent::Error {
            kind: ErrorKind::Dialog,
            message: msg.to_string(),
        });
    }
    None
}

fn parse_dialog(handler: &Handler) -> Option<HandlerEvent> {
    let tree = Value::Array(handler.parameters.clone());
    if let Some(msg) = find_string_field(&tree, "ConfirmMessage") {
        return Some(HandlerEvent::Dialog {
            kind: DialogKind::Confirm,
            message: msg.to_string(),
        });
    }
    if let Some(msg) = find_string_field(&tree, "YesNoMessage") {
        return Some(HandlerEvent::Dialog {
            kind: DialogKind::YesNo,
            message: msg.to_string(),
        });
    }
    None
}
