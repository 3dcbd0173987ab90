//! Builds and maintains each open form's control tree and field indices
//! from its handler event stream, and resolves human-readable field keys
//! to control paths. See spec.md §4.7.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bc_protocol::handler::find_string_field;
use bc_protocol::Handler;
use serde_json::Value;
use unicode_normalization::char::canonical_combining_class;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Field,
    Action,
    Group,
    Repeater,
    RepeaterColumn,
    FastTab,
    DialogButton,
    Form,
    Other,
}

impl ControlKind {
    fn from_wire(s: &str) -> Self {
        match s {
            "Field" => Self::Field,
            "Action" => Self::Action,
            "Group" => Self::Group,
            "Repeater" => Self::Repeater,
            "RepeaterColumnControl" | "RepeaterColumn" => Self::RepeaterColumn,
            "FastTab" => Self::FastTab,
            "DialogButton" => Self::DialogButton,
            "LogicalForm" | "Form" => Self::Form,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlNode {
    pub path: String,
    pub name: Option<String>,
    pub caption: Option<String>,
    pub source_expr: Option<String>,
    pub kind: ControlKind,
    pub editable: bool,
    pub visible: bool,
    pub is_primary: bool,
    pub raw_value: Option<Value>,
    pub formatted_value: Option<String>,
}

/// Lowercase, trim, NFKD-decompose, strip combining marks. Used for every
/// field-key comparison so `"Navn"`, `"navn"`, and `"Náv n"` all resolve
/// the same control.
#[must_use]
pub fn normalize_key(input: &str) -> String {
    input
        .trim()
        .nfkd()
        .filter(|c| canonical_combining_class(*c) == 0)
        .collect::<String>()
        .to_lowercase()
}

#[derive(Debug, Default, Clone)]
pub struct FieldIndex {
    pub by_caption: HashMap<String, Vec<String>>,
    pub by_caption_scoped: HashMap<String, Vec<String>>,
    pub by_source_expr: HashMap<String, Vec<String>>,
    pub by_name: HashMap<String, Vec<String>>,
    pub duplicates: HashMap<String, Vec<String>>,
}

impl FieldIndex {
    fn insert_caption(&mut self, caption: &str, path: &str) {
        let key = normalize_key(caption);
        let entry = self.by_caption.entry(key.clone()).or_default();
        if !entry.contains(&path.to_string()) {
            entry.push(path.to_string());
        }
        if entry.len() > 1 {
            self.duplicates.insert(key, entry.clone());
        }
    }

    fn insert_scoped(&mut self, group_caption: &str, field_caption: &str, path: &str) {
        let key = normalize_key(&format!("{group_caption}>{field_caption}"));
        let entry = self.by_caption_scoped.entry(key).or_default();
        if !entry.contains(&path.to_string()) {
            entry.push(path.to_string());
        }
    }

    fn insert_source_expr(&mut self, expr: &str, path: &str) {
        let key = normalize_key(expr);
        let entry = self.by_source_expr.entry(key).or_default();
        if !entry.contains(&path.to_string()) {
            entry.push(path.to_string());
        }
    }

    fn insert_name(&mut self, name: &str, path: &str) {
        let key = normalize_key(name);
        let entry = self.by_name.entry(key).or_default();
        if !entry.contains(&path.to_string()) {
            entry.push(path.to_string());
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Form {
    pub form_id: String,
    pub page_id: Option<String>,
    pub cache_key: Option<String>,
    pub caption: Option<String>,
    pub path_index: HashMap<String, ControlNode>,
    pub field_index: FieldIndex,
    pub ready: bool,
}

impl Form {
    fn new(form_id: String) -> Self {
        Self {
            form_id,
            ..Self::default()
        }
    }

    /// Merge the control tree carried by a `FormToShow` payload (or a
    /// subsequent refresh carrying the same form id) into this form.
    fn ingest_tree(&mut self, root: &Value, group_caption: Option<&str>) {
        self.ingest_node(root, String::new(), 0, group_caption);
        self.ready = true;
    }

    fn ingest_node(&mut self, value: &Value, parent_path: String, index: usize, group_caption: Option<&str>) {
        let Some(obj) = value.as_object() else { return };

        let path = if parent_path.is_empty() {
            format!("server:c[{index}]")
        } else {
            format!("{parent_path}/c[{index}]")
        };

        let kind = obj
            .get("Kind")
            .or_else(|| obj.get("Type"))
            .and_then(Value::as_str)
            .map_or(ControlKind::Other, ControlKind::from_wire);
        let name = obj.get("Name").and_then(Value::as_str).map(str::to_string);
        let caption = obj.get("Caption").and_then(Value::as_str).map(str::to_string);
        let source_expr = obj
            .get("SourceExpr")
            .or_else(|| obj.get("Expression"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let editable = obj.get("Editable").and_then(Value::as_bool).unwrap_or(true);
        let visible = obj.get("Visible").and_then(Value::as_bool).unwrap_or(true);
        let is_primary = obj.get("IsPrimary").and_then(Value::as_bool).unwrap_or(false);
        let raw_value = obj.get("Value").cloned();
        let formatted_value = obj
            .get("FormattedValue")
            .or_else(|| obj.get("DisplayValue"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(caption) = &caption {
            self.field_index.insert_caption(caption, &path);
            if let Some(group) = group_caption {
                self.field_index.insert_scoped(group, caption, &path);
            }
        }
        if let Some(expr) = &source_expr {
            self.field_index.insert_source_expr(expr, &path);
        }
        if let Some(name) = &name {
            self.field_index.insert_name(name, &path);
        }

        let next_group_caption = if kind == ControlKind::Group || kind == ControlKind::FastTab {
            caption.clone().or_else(|| group_caption.map(str::to_string))
        } else {
            group_caption.map(str::to_string)
        };

        self.path_index.insert(
            path.clone(),
            ControlNode {
                path: path.clone(),
                name,
                caption,
                source_expr,
                kind,
                editable,
                visible,
                is_primary,
                raw_value,
                formatted_value,
            },
        );

        if let Some(children) = obj
            .get("Children")
            .or_else(|| obj.get("Controls"))
            .and_then(Value::as_array)
        {
            for (i, child) in children.iter().enumerate() {
                self.ingest_node(child, path.clone(), i, next_group_caption.as_deref());
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    pub prefer_editable: bool,
    pub prefer_visible: bool,
    pub require_scoped: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            prefer_editable: true,
            prefer_visible: true,
            require_scoped: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub control_path: Option<String>,
    pub ambiguous: bool,
    pub candidates: Vec<String>,
}

/// Per-form tree + indices, with LRU/TTL eviction across forms. See
/// spec.md §3 "Form" lifecycle.
pub struct FormStateIndex {
    forms: moka::sync::Cache<String, Arc<RwLock<Form>>>,
}

impl FormStateIndex {
    #[must_use]
    pub fn new(max_forms: u64, ttl: Duration) -> Self {
        Self {
            forms: moka::sync::Cache::builder()
                .max_capacity(max_forms)
                .time_to_live(ttl)
                .build(),
        }
    }

    fn form_handle(&self, form_id: &str) -> Arc<RwLock<Form>> {
        self.forms
            .get_with(form_id.to_string(), || Arc::new(RwLock::new(Form::new(form_id.to_string()))))
    }

    /// Ingest a handler batch, updating (or creating) whichever forms it
    /// mentions.
    pub fn ingest(&self, handlers: &[Handler]) {
        for handler in handlers {
            if handler.handler_type != "LogicalClientEventRaisingHandler" {
                continue;
            }
            if handler.first_parameter().and_then(Value::as_str) != Some("FormToShow") {
                continue;
            }
            let Some(params) = handler.parameters.get(1) else { continue };
            let Some(form_id) = find_string_field(params, "ServerId") else { continue };

            let handle = self.form_handle(form_id);
            let mut form = handle.write().expect("form lock poisoned");
            form.caption = find_string_field(params, "Caption").map(str::to_string).or(form.caption.clone());
            form.cache_key = find_string_field(params, "CacheKey").map(str::to_string).or(form.cache_key.clone());
            form.page_id = form
                .cache_key
                .as_deref()
                .and_then(extract_page_id_from_cache_key)
                .or(form.page_id.clone());
            form.ingest_tree(params, None);
        }
    }

    #[must_use]
    pub fn snapshot(&self, form_id: &str) -> Option<Form> {
        self.forms.get(form_id).map(|h| h.read().expect("form lock poisoned").clone())
    }

    /// Resolve a human-readable key against a form's field index, per
    /// spec.md §4.7 "Key resolution".
    #[must_use]
    pub fn resolve(&self, form_id: &str, key: &str, options: &ResolveOptions) -> ResolveOutcome {
        let Some(handle) = self.forms.get(form_id) else {
            return ResolveOutcome {
                control_path: None,
                ambiguous: false,
                candidates: Vec::new(),
            };
        };
        let form = handle.read().expect("form lock poisoned");

        let trimmed = key.trim();
        let candidates = if let Some(expr) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            lookup(&form.field_index.by_source_expr, expr)
        } else if let Some((scope, rest)) = split_scope(trimmed) {
            let scoped_key = normalize_key(&format!("{scope}>{rest}"));
            form.field_index.by_caption_scoped.get(&scoped_key).cloned().unwrap_or_default()
        } else if options.require_scoped {
            Vec::new()
        } else {
            let by_caption = lookup(&form.field_index.by_caption, trimmed);
            if !by_caption.is_empty() {
                by_caption
            } else {
                let by_expr = lookup(&form.field_index.by_source_expr, trimmed);
                if !by_expr.is_empty() {
                    by_expr
                } else {
                    lookup(&form.field_index.by_name, trimmed)
                }
            }
        };

        resolve_candidates(&form, candidates, options)
    }
}

fn lookup(index: &HashMap<String, Vec<String>>, key: &str) -> Vec<String> {
    index.get(&normalize_key(key)).cloned().unwrap_or_default()
}

fn split_scope(key: &str) -> Option<(&str, &str)> {
    key.split_once('>').or_else(|| key.split_once('/'))
}

fn resolve_candidates(form: &Form, candidates: Vec<String>, options: &ResolveOptions) -> ResolveOutcome {
    if candidates.is_empty() {
        return ResolveOutcome {
            control_path: None,
            ambiguous: false,
            candidates,
        };
    }
    if candidates.len() == 1 {
        return ResolveOutcome {
            control_path: Some(candidates[0].clone()),
            ambiguous: false,
            candidates,
        };
    }

    let mut narrowed = candidates.clone();
    if options.prefer_editable {
        let editable: Vec<String> = narrowed
            .iter()
            .filter(|p| form.path_index.get(*p).is_some_and(|n| n.editable))
            .cloned()
            .collect();
        if editable.len() == 1 {
            return ResolveOutcome {
                control_path: Some(editable[0].clone()),
                ambiguous: false,
                candidates,
            };
        }
        if !editable.is_empty() {
            narrowed = editable;
        }
    }
    if options.prefer_visible {
        let visible: Vec<String> = narrowed
            .iter()
            .filter(|p| form.path_index.get(*p).is_some_and(|n| n.visible))
            .cloned()
            .collect();
        if visible.len() == 1 {
            return ResolveOutcome {
                control_path: Some(visible[0].clone()),
                ambiguous: false,
                candidates,
            };
        }
        if !visible.is_empty() {
            narrowed = visible;
        }
    }
    let primary: Vec<String> = narrowed
        .iter()
        .filter(|p| form.path_index.get(*p).is_some_and(|n| n.is_primary))
        .cloned()
        .collect();
    if primary.len() == 1 {
        return ResolveOutcome {
            control_path: Some(primary[0].clone()),
            ambiguous: false,
            candidates,
        };
    }

    ResolveOutcome {
        control_path: None,
        ambiguous: true,
        candidates,
    }
}

fn extract_page_id_from_cache_key(cache_key: &str) -> Option<String> {
    cache_key.split_once(':').map(|(page_id, _)| page_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_form_tree() -> Value {
        json!({
            "ServerId": "3F",
            "Caption": "Customer Card",
            "CacheKey": "21:embedded(False)",
            "Children": [
                { "Kind": "Field", "Caption": "No.", "Editable": true, "SourceExpr": "Customer.\"No.\"" },
                { "Kind": "Field", "Caption": "Name", "Editable": true, "SourceExpr": "Customer.Name" },
                {
                    "Kind": "Group",
                    "Caption": "Address & Contact",
                    "Children": [
                        { "Kind": "Field", "Caption": "Name", "Editable": false, "SourceExpr": "Customer.\"Alt Name\"" }
                    ]
                }
            ]
        })
    }

    fn index_with_sample_form() -> FormStateIndex {
        let index = FormStateIndex::new(16, Duration::from_secs(60));
        let handlers = vec![Handler {
            handler_type: "LogicalClientEventRaisingHandler".to_string(),
            parameters: vec![json!("FormToShow"), sample_form_tree()],
        }];
        index.ingest(&handlers);
        index
    }

    #[test]
    fn cache_key_yields_page_id_and_embedded_flag() {
        let index = index_with_sample_form();
        let form = index.snapshot("3F").unwrap();
        assert_eq!(form.cache_key.as_deref(), Some("21:embedded(False)"));
        assert_eq!(form.page_id.as_deref(), Some("21"));
    }

    #[test]
    fn unscoped_caption_resolves_when_unambiguous() {
        let index = index_with_sample_form();
        let outcome = index.resolve("3F", "No.", &ResolveOptions::default());
        assert!(!outcome.ambiguous);
        assert!(outcome.control_path.is_some());
    }

    #[test]
    fn ambiguous_caption_prefers_editable_control() {
        let index = index_with_sample_form();
        // "Name" appears twice: top-level (editable) and nested under the
        // group (read-only) — prefer-editable tie-break should win.
        let outcome = index.resolve("3F", "Name", &ResolveOptions::default());
        assert!(!outcome.ambiguous);
        let path = outcome.control_path.unwrap();
        let form = index.snapshot("3F").unwrap();
        assert!(form.path_index.get(&path).unwrap().editable);
    }

    #[test]
    fn scoped_caption_resolves_the_nested_field() {
        let index = index_with_sample_form();
        let outcome = index.resolve("3F", "Address & Contact>Name", &ResolveOptions::default());
        assert!(!outcome.ambiguous);
        let path = outcome.control_path.unwrap();
        let form = index.snapshot("3F").unwrap();
        assert!(!form.path_index.get(&path).unwrap().editable);
    }

    #[test]
    fn accent_and_case_insensitive_normalization() {
        assert_eq!(normalize_key("Navn"), normalize_key("navn"));
        assert_eq!(normalize_key("Navn"), normalize_key("Náv n"));
    }

    #[test]
    fn resolved_paths_always_exist_in_path_index() {
        let index = index_with_sample_form();
        for key in ["No.", "Name", "Address & Contact>Name"] {
            let outcome = index.resolve("3F", key, &ResolveOptions::default());
            if let Some(path) = outcome.control_path {
                let form = index.snapshot("3F").unwrap();
                assert!(form.path_index.contains_key(&path));
            }
        }
    }
}
