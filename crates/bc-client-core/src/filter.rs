//! Caption → canonical-field-id resolution and the two-step Filter +
//! SaveValue interaction sequence. See spec.md §4.8.

use std::collections::HashMap;
use std::sync::RwLock;

use bc_protocol::handler::find_objects_with_keys;
use bc_protocol::{Handler, Interaction};
use serde_json::Value;
use tracing::instrument;

use crate::error::BcClientError;
use crate::session::SessionManager;

/// Canonical field ids look like `"18_Customer.2"`: a numeric table id, an
/// underscore, a record/field name, a dot, a numeric field id.
fn looks_like_canonical_field_id(s: &str) -> bool {
    let Some((table_part, rest)) = s.split_once('_') else { return false };
    if table_part.is_empty() || !table_part.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let Some((name_part, field_part)) = rest.rsplit_once('.') else { return false };
    !name_part.is_empty()
        && name_part.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !field_part.is_empty()
        && field_part.chars().all(|c| c.is_ascii_digit())
}

#[derive(Debug, Default, Clone)]
struct FormFilterMetadata {
    caption_to_id: HashMap<String, String>,
}

/// Per-form caption→canonical-field-id mapping, populated opportunistically
/// from any handler stream carrying column definitions.
#[derive(Default)]
pub struct FilterMetadataCache {
    forms: RwLock<HashMap<String, FormFilterMetadata>>,
}

impl FilterMetadataCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a handler batch for objects carrying both a canonical `Id` (or
    /// `ColumnBinderPath`) and a `Caption`, and record the mapping.
    pub fn ingest(&self, form_id: &str, handlers: &[Handler]) {
        let mut entries = Vec::new();
        for handler in handlers {
            for params in &handler.parameters {
                for obj in find_objects_with_keys(params, &["Caption"]) {
                    let Some(caption) = obj.get("Caption").and_then(Value::as_str) else { continue };
                    let id = obj
                        .get("Id")
                        .and_then(Value::as_str)
                        .filter(|s| looks_like_canonical_field_id(s))
                        .or_else(|| {
                            obj.get("ColumnBinderPath")
                                .and_then(Value::as_str)
                                .filter(|s| looks_like_canonical_field_id(s))
                        });
                    if let Some(id) = id {
                        entries.push((caption.to_string(), id.to_string()));
                    }
                }
            }
        }
        if entries.is_empty() {
            return;
        }
        let mut forms = self.forms.write().expect("filter cache lock poisoned");
        let metadata = forms.entry(form_id.to_string()).or_default();
        for (caption, id) in entries {
            metadata.caption_to_id.insert(caption, id);
        }
    }

    /// Resolve a caption to its canonical field id, if cached.
    #[must_use]
    pub fn resolve(&self, form_id: &str, caption: &str) -> Option<String> {
        self.forms
            .read()
            .expect("filter cache lock poisoned")
            .get(form_id)
            .and_then(|m| m.caption_to_id.get(caption))
            .cloned()
    }

    fn available_captions(&self, form_id: &str) -> Vec<String> {
        self.forms
            .read()
            .expect("filter cache lock poisoned")
            .get(form_id)
            .map(|m| m.caption_to_id.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn is_cached(&self, form_id: &str) -> bool {
        self.forms.read().expect("filter cache lock poisoned").contains_key(form_id)
    }

    /// Issue `Filter`, then (if `filter_value` is given) `SaveValue` at the
    /// list's derived filter-input sub-path, per spec.md §4.8.
    #[instrument(skip(self, session, filter_value))]
    pub async fn apply_filter(
        &self,
        session: &SessionManager,
        form_id: &str,
        list_control_path: &str,
        column_caption: &str,
        filter_value: Option<Value>,
    ) -> Result<Vec<Handler>, BcClientError> {
        if !self.is_cached(form_id) {
            return Err(BcClientError::Resolution {
                key: column_caption.to_string(),
                reason: format!("filter metadata for form {form_id} has not been cached; call ingest() with a handler batch for this form first"),
                available: Vec::new(),
            });
        }
        let Some(field_id) = self.resolve(form_id, column_caption) else {
            return Err(BcClientError::Resolution {
                key: column_caption.to_string(),
                reason: format!("column caption {column_caption:?} did not resolve to a canonical field id"),
                available: self.available_captions(form_id),
            });
        };

        let mut handlers = session
            .invoke(
                vec![Interaction::Filter {
                    control_path: list_control_path.to_string(),
                    filter_column_id: field_id,
                }],
                None,
                None,
            )
            .await?;

        if let Some(value) = filter_value {
            let filter_input_path = format!("{list_control_path}/c[2]/c[1]");
            handlers = session
                .invoke(
                    vec![Interaction::SaveValue {
                        control_path: filter_input_path,
                        new_value: value,
                        commit: true,
                    }],
                    None,
                    None,
                )
                .await?;
        }

        Ok(handlers)
    }
}
