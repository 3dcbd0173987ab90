//! Converts the handler batch from an `OpenForm` response into structured
//! page metadata. See spec.md §4.10.
//!
//! Traversal mirrors the control tree built by [`crate::form_state`]; this
//! module reads the same raw handler shapes directly rather than depending
//! on a materialized [`crate::form_state::Form`], so it can be used
//! standalone against a single response.

use bc_protocol::Handler;
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct FieldMetadata {
    pub name: Option<String>,
    pub caption: Option<String>,
    pub field_type: Option<String>,
    pub required: bool,
    pub editable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ActionMetadata {
    pub name: Option<String>,
    pub caption: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RepeaterColumnMetadata {
    pub name: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RepeaterMetadata {
    pub name: Option<String>,
    pub caption: Option<String>,
    pub control_path: String,
    pub source_form_id: Option<String>,
    /// Empty on first materialization; enriched by a later [`enrich_repeaters`]
    /// call once the lines grid has actually been opened.
    pub columns: Vec<RepeaterColumnMetadata>,
}

#[derive(Debug, Clone, Default)]
pub struct PageMetadata {
    pub caption: Option<String>,
    pub description: Option<String>,
    pub page_type: Option<String>,
    pub fields: Vec<FieldMetadata>,
    pub actions: Vec<ActionMetadata>,
    pub repeaters: Vec<RepeaterMetadata>,
}

/// Parse the `OpenForm`/`FormToShow` handler batch into [`PageMetadata`].
#[must_use]
pub fn parse_page_metadata(handlers: &[Handler]) -> PageMetadata {
    let mut metadata = PageMetadata::default();

    for handler in handlers {
        if handler.handler_type != "LogicalClientEventRaisingHandler" {
            continue;
        }
        if handler.first_parameter().and_then(Value::as_str) != Some("FormToShow") {
            continue;
        }
        let Some(root) = handler.parameters.get(1) else { continue };

        metadata.caption = root.get("Caption").and_then(Value::as_str).map(str::to_string).or(metadata.caption.take());
        metadata.description = root.get("Description").and_then(Value::as_str).map(str::to_string).or(metadata.description.take());
        metadata.page_type = root.get("PageType").and_then(Value::as_str).map(str::to_string).or(metadata.page_type.take());

        if let Some(children) = root.get("Children").and_then(Value::as_array) {
            walk_controls(children, "server", &mut metadata);
        }
    }

    metadata
}

fn walk_controls(children: &[Value], parent_path: &str, metadata: &mut PageMetadata) {
    for (i, child) in children.iter().enumerate() {
        let Some(obj) = child.as_object() else { continue };
        let path = if parent_path == "server" {
            format!("server:c[{i}]")
        } else {
            format!("{parent_path}/c[{i}]")
        };
        let kind = obj.get("Kind").or_else(|| obj.get("Type")).and_then(Value::as_str).unwrap_or("");

        match kind {
            "Field" => metadata.fields.push(FieldMetadata {
                name: obj.get("Name").and_then(Value::as_str).map(str::to_string),
                caption: obj.get("Caption").and_then(Value::as_str).map(str::to_string),
                field_type: obj.get("FieldType").or_else(|| obj.get("Type")).and_then(Value::as_str).map(str::to_string),
                required: obj.get("Required").and_then(Value::as_bool).unwrap_or(false),
                editable: obj.get("Editable").and_then(Value::as_bool).unwrap_or(true),
            }),
            "Action" => metadata.actions.push(ActionMetadata {
                name: obj.get("Name").and_then(Value::as_str).map(str::to_string),
                caption: obj.get("Caption").and_then(Value::as_str).map(str::to_string),
                enabled: obj.get("Enabled").and_then(Value::as_bool).unwrap_or(true),
            }),
            "Repeater" => {
                let columns = obj
                    .get("Columns")
                    .and_then(Value::as_array)
                    .map(|cols| {
                        cols.iter()
                            .filter_map(Value::as_object)
                            .map(|c| RepeaterColumnMetadata {
                                name: c.get("Name").and_then(Value::as_str).map(str::to_string),
                                caption: c.get("Caption").and_then(Value::as_str).map(str::to_string),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                metadata.repeaters.push(RepeaterMetadata {
                    name: obj.get("Name").and_then(Value::as_str).map(str::to_string),
                    caption: obj.get("Caption").and_then(Value::as_str).map(str::to_string),
                    control_path: path.clone(),
                    source_form_id: obj.get("SourceFormId").and_then(Value::as_str).map(str::to_string),
                    columns,
                });
            }
            _ => {}
        }

        if let Some(grandchildren) = obj.get("Children").or_else(|| obj.get("Controls")).and_then(Value::as_array) {
            walk_controls(grandchildren, &path, metadata);
        }
    }
}

/// Fill in a repeater's `columns` once a later handler batch (e.g. from
/// opening the lines grid) carries `Columns` for the same control path.
pub fn enrich_repeaters(metadata: &mut PageMetadata, handlers: &[Handler]) {
    for handler in handlers {
        for params in &handler.parameters {
            let Some(changes) = params.as_array() else { continue };
            for change in changes {
                let Some(control_path) = change.get("controlPath").or_else(|| change.get("ControlPath")).and_then(Value::as_str) else {
                    continue;
                };
                let Some(columns) = change.get("Columns").and_then(Value::as_array) else { continue };
                if let Some(repeater) = metadata.repeaters.iter_mut().find(|r| r.control_path == control_path) {
                    repeater.columns = columns
                        .iter()
                        .filter_map(Value::as_object)
                        .map(|c| RepeaterColumnMetadata {
                            name: c.get("Name").and_then(Value::as_str).map(str::to_string),
                            caption: c.get("Caption").and_then(Value::as_str).map(str::to_string),
                        })
                        .collect();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_handlers() -> Vec<Handler> {
        vec![Handler {
            handler_type: "LogicalClientEventRaisingHandler".to_string(),
            parameters: vec![
                json!("FormToShow"),
                json!({
                    "ServerId": "3F",
                    "Caption": "Customer List",
                    "PageType": "List",
                    "Children": [
                        { "Kind": "Field", "Name": "No", "Caption": "No.", "Required": true, "Editable": false },
                        { "Kind": "Action", "Name": "NewCustomer", "Caption": "New", "Enabled": true },
                        {
                            "Kind": "Repeater",
                            "Name": "Lines",
                            "Caption": "Lines",
                            "SourceFormId": "40",
                            "Columns": []
                        }
                    ]
                }),
            ],
        }]
    }

    #[test]
    fn extracts_caption_and_page_type() {
        let metadata = parse_page_metadata(&sample_handlers());
        assert_eq!(metadata.caption.as_deref(), Some("Customer List"));
        assert_eq!(metadata.page_type.as_deref(), Some("List"));
    }

    #[test]
    fn extracts_fields_actions_and_empty_repeater_columns() {
        let metadata = parse_page_metadata(&sample_handlers());
        assert_eq!(metadata.fields.len(), 1);
        assert_eq!(metadata.fields[0].caption.as_deref(), Some("No."));
        assert!(metadata.fields[0].required);
        assert_eq!(metadata.actions.len(), 1);
        assert_eq!(metadata.repeaters.len(), 1);
        assert!(metadata.repeaters[0].columns.is_empty());
    }

    #[test]
    fn enrich_repeaters_fills_columns_from_later_batch() {
        let mut metadata = parse_page_metadata(&sample_handlers());
        let repeater_path = metadata.repeaters[0].control_path.clone();

        let enrichment = vec![Handler {
            handler_type: "LogicalClientChangeHandler".to_string(),
            parameters: vec![json!([
                {
                    "controlPath": repeater_path,
                    "Columns": [{ "Name": "Qty", "Caption": "Quantity" }]
                }
            ])],
        }];
        enrich_repeaters(&mut metadata, &enrichment);

        assert_eq!(metadata.repeaters[0].columns.len(), 1);
        assert_eq!(metadata.repeaters[0].columns[0].caption.as_deref(), Some("Quantity"));
    }
}
