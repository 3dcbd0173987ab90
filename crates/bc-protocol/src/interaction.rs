//! Interaction builders and the `Invoke`/`OpenSession` payload shapes.
//!
//! BC requires `namedParameters` to be a JSON *string* even when logically
//! an object — every builder below serializes its parameters up front so
//! callers can't forget.

use serde::Serialize;
use serde_json::{json, Value};
use typed_builder::TypedBuilder;

/// One entry of `interactionsToInvoke`.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionEntry {
    #[serde(rename = "interactionName")]
    pub interaction_name: &'static str,
    #[serde(rename = "namedParameters")]
    pub named_parameters: String,
    #[serde(rename = "controlPath", skip_serializing_if = "Option::is_none")]
    pub control_path: Option<String>,
    #[serde(rename = "formId", skip_serializing_if = "Option::is_none")]
    pub form_id: Option<String>,
    #[serde(rename = "callbackId")]
    pub callback_id: String,
}

fn named_parameters(value: Value) -> String {
    value.to_string()
}

/// Recognized interactions from spec.md §6. Each variant captures the
/// logical parameters; [`Interaction::into_entry`] serializes them per the
/// wire shape.
#[derive(Debug, Clone)]
pub enum Interaction {
    OpenForm {
        page: String,
        load_data: bool,
        is_reload: bool,
    },
    CloseForm {
        form_id: String,
    },
    SaveValue {
        control_path: String,
        new_value: Value,
        commit: bool,
    },
    InvokeAction {
        control_path: String,
    },
    InvokeSessionAction {
        system_action: u32,
        owner_form: String,
        data: Option<Value>,
    },
    Filter {
        control_path: String,
        filter_column_id: String,
    },
    Navigate {
        target: String,
    },
}

impl Interaction {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenForm { .. } => "OpenForm",
            Self::CloseForm { .. } => "CloseForm",
            Self::SaveValue { .. } => "SaveValue",
            Self::InvokeAction { .. } => "InvokeAction",
            Self::InvokeSessionAction { .. } => "InvokeSessionAction",
            Self::Filter { .. } => "Filter",
            Self::Navigate { .. } => "Navigate",
        }
    }

    #[must_use]
    pub fn form_id(&self) -> Option<String> {
        match self {
            Self::CloseForm { form_id } => Some(form_id.clone()),
            Self::InvokeSessionAction { owner_form, .. } => Some(owner_form.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn control_path(&self) -> Option<String> {
        match self {
            Self::SaveValue { control_path, .. }
            | Self::InvokeAction { control_path }
            | Self::Filter { control_path, .. } => Some(control_path.clone()),
            _ => None,
        }
    }

    /// Serialize into a wire `interactionsToInvoke` entry with a fresh
    /// callback id.
    #[must_use]
    pub fn into_entry(self, callback_id: impl Into<String>) -> InteractionEntry {
        let control_path = self.control_path();
        let form_id = self.form_id();
        let interaction_name = self.name();

        let params = match &self {
            Self::OpenForm {
                page,
                load_data,
                is_reload,
            } => json!({ "Page": page, "LoadData": load_data, "IsReload": is_reload }),
            Self::CloseForm { .. } => json!({}),
            Self::SaveValue {
                new_value, commit, ..
            } => json!({ "newValue": new_value, "commit": commit }),
            Self::InvokeAction { .. } => json!({}),
            Self::InvokeSessionAction {
                system_action,
                owner_form,
                data,
            } => json!({
                "systemAction": system_action,
                "ownerForm": owner_form,
                "data": data,
            }),
            Self::Filter {
                filter_column_id, ..
            } => json!({ "operation": "set", "filterColumnId": filter_column_id }),
            Self::Navigate { target } => json!({ "target": target }),
        };

        InteractionEntry {
            interaction_name,
            named_parameters: named_parameters(params),
            control_path,
            form_id,
            callback_id: callback_id.into(),
        }
    }
}

/// Client time-zone + DST period, attached to `OpenSession`.
#[derive(Debug, Clone, Serialize, TypedBuilder)]
pub struct ClientTimeZone {
    #[builder(setter(into))]
    pub name: String,
    pub utc_offset_minutes: i32,
    pub dst_start_utc: Option<String>,
    pub dst_end_utc: Option<String>,
}

/// Navigation context attached to every `Invoke`.
#[derive(Debug, Clone, Serialize, TypedBuilder)]
pub struct NavigationContext {
    #[builder(setter(into))]
    pub application_id: String,
    #[builder(setter(into))]
    pub device_category: String,
    #[builder(setter(into))]
    pub spa_instance_id: String,
}

/// The `OpenSession` request body.
#[derive(Debug, Clone, Serialize, TypedBuilder)]
pub struct OpenSessionRequest {
    #[builder(setter(into))]
    pub spa_instance_id: String,
    #[builder(default)]
    pub open_form_ids: Vec<String>,
    #[builder(default)]
    pub sequence_no: Option<String>,
    #[builder(default = -1)]
    pub last_client_ack_sequence_number: i64,
    #[builder(setter(into))]
    pub tenant_id: String,
    #[builder(default)]
    pub supported_extensions: Vec<String>,
    pub client_time_zone: ClientTimeZone,
    pub role_center_interaction: InteractionEntry,
}

/// The `Invoke` request body, per spec.md §6 "Invoke payload shape".
#[derive(Debug, Clone, Serialize, TypedBuilder)]
pub struct InvokeRequest {
    pub open_form_ids: Vec<String>,
    #[builder(setter(into))]
    pub session_id: String,
    #[builder(setter(into))]
    pub session_key: String,
    #[builder(setter(into))]
    pub company: String,
    #[builder(setter(into))]
    pub sequence_no: String,
    pub last_client_ack_sequence_number: i64,
    #[builder(setter(into))]
    pub tenant_id: String,
    pub navigation_context: NavigationContext,
    #[builder(default)]
    pub supported_extensions: Vec<String>,
    pub interactions_to_invoke: Vec<InteractionEntry>,
    #[builder(setter(into))]
    pub telemetry_client_session_id: String,
    #[builder(default)]
    pub features: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_parameters_is_always_a_json_string_not_an_object() {
        let entry = Interaction::SaveValue {
            control_path: "server:c[2]/c[0]".to_string(),
            new_value: json!("Test"),
            commit: true,
        }
        .into_entry("cb-1");

        // must be a string in the serialized entry, not a nested object
        let serialized = serde_json::to_value(&entry).unwrap();
        assert!(serialized["namedParameters"].is_string());
    }

    #[test]
    fn filter_interaction_carries_column_id() {
        let entry = Interaction::Filter {
            control_path: "server:c[1]".to_string(),
            filter_column_id: "18_Customer.2".to_string(),
        }
        .into_entry("cb-2");
        assert!(entry.named_parameters.contains("18_Customer.2"));
    }
}
