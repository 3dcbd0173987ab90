//! Converts a Tell-Me search-result handler batch into an ordered list of
//! page matches. See spec.md §4.9.

use bc_protocol::discriminator::CanonicalChange;
use bc_protocol::Handler;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static PAGE_NUMBER_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+):").unwrap());

const TELL_ME_CONTROL_PATH: &str = "server:c[1]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageType {
    List,
    Card,
    Document,
    Worksheet,
    Report,
    Other(String),
}

impl PageType {
    fn from_category(category: &str) -> Self {
        let lower = category.to_lowercase();
        if lower.contains("list") {
            Self::List
        } else if lower.contains("card") {
            Self::Card
        } else if lower.contains("document") {
            Self::Document
        } else if lower.contains("worksheet") {
            Self::Worksheet
        } else if lower.contains("report") {
            Self::Report
        } else {
            Self::Other(category.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TellMeMatch {
    pub page_id: String,
    pub caption: String,
    pub page_type: PageType,
}

/// Parse a Tell-Me response. Tries the BC27+ `DataRefreshChange` shape
/// first; if it yields zero rows, falls back to the legacy repeater-tuple
/// shape. Non-page rows (`objectType != "Page"`) are dropped from both.
#[must_use]
pub fn parse_tell_me_results(handlers: &[Handler]) -> Vec<TellMeMatch> {
    let modern = parse_bc27_plus(handlers);
    if !modern.is_empty() {
        return modern;
    }
    parse_legacy(handlers)
}

fn parse_bc27_plus(handlers: &[Handler]) -> Vec<TellMeMatch> {
    let mut out = Vec::new();
    for handler in handlers {
        if handler.handler_type != "LogicalClientChangeHandler" {
            continue;
        }
        for params in &handler.parameters {
            let Some(changes) = params.as_array() else { continue };
            for change in changes {
                let Some(control_path) = change.get("controlPath").or_else(|| change.get("ControlPath")).and_then(Value::as_str) else {
                    continue;
                };
                if control_path != TELL_ME_CONTROL_PATH {
                    continue;
                }
                let Some(discriminator) = change.get("t").and_then(Value::as_str) else { continue };
                if CanonicalChange::from_wire(discriminator) != Some(CanonicalChange::DataRefreshChange) {
                    continue;
                }
                let Some(row_changes) = change.get("RowChanges").and_then(Value::as_array) else { continue };
                for row in row_changes {
                    let Some(row_t) = row.get("t").and_then(Value::as_str) else { continue };
                    if CanonicalChange::from_wire(row_t) != Some(CanonicalChange::DataRowInserted) {
                        continue;
                    }
                    if let Some(m) = row_to_match(row) {
                        out.push(m);
                    }
                }
            }
        }
    }
    out
}

fn row_to_match(row: &Value) -> Option<TellMeMatch> {
    let cells = row.get("cells")?;
    let object_type = cells.get("ObjectType").and_then(Value::get_string_value);
    if object_type.as_deref() != Some("Page") {
        return None;
    }
    let caption = cells.get("Name").and_then(Value::get_string_value)?;
    let category = cells.get("DepartmentCategory").and_then(Value::get_string_value).unwrap_or_default();
    let cache_key = cells.get("CacheKey").and_then(Value::get_string_value)?;
    let page_id = PAGE_NUMBER_PREFIX.captures(&cache_key)?.get(1)?.as_str().to_string();

    Some(TellMeMatch {
        page_id,
        caption,
        page_type: PageType::from_category(&category),
    })
}

/// Legacy shape: a repeater control whose `Value` is an array of tuples
/// `[name, category, objectId, objectType, ...]`.
fn parse_legacy(handlers: &[Handler]) -> Vec<TellMeMatch> {
    let mut out = Vec::new();
    for handler in handlers {
        for params in &handler.parameters {
            let Some(obj) = params.as_object() else { continue };
            let Some(value) = obj.get("Value").and_then(Value::as_array) else { continue };
            for tuple in value {
                let Some(tuple) = tuple.as_array() else { continue };
                let (Some(name), Some(category), Some(object_type)) = (
                    tuple.first().and_then(Value::as_str),
                    tuple.get(1).and_then(Value::as_str),
                    tuple.get(3).and_then(Value::as_str),
                ) else {
                    continue;
                };
                if object_type != "Page" {
                    continue;
                }
                let page_id = tuple.get(2).map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
                let Some(page_id) = page_id else { continue };
                out.push(TellMeMatch {
                    page_id,
                    caption: name.to_string(),
                    page_type: PageType::from_category(category),
                });
            }
        }
    }
    out
}

/// Small extension to pull a `{ "stringValue": ... }` cell's payload, or a
/// bare JSON string, uniformly.
trait StringValueExt {
    fn get_string_value(&self) -> Option<String>;
}

impl StringValueExt for Value {
    fn get_string_value(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Object(_) => self.get("stringValue").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bc27_handlers() -> Vec<Handler> {
        vec![Handler {
            handler_type: "LogicalClientChangeHandler".to_string(),
            parameters: vec![json!([
                {
                    "t": "drch",
                    "controlPath": "server:c[1]",
                    "RowChanges": [
                        {
                            "t": "DataRowInserted",
                            "cells": {
                                "Name": { "stringValue": "Customer List" },
                                "DepartmentCategory": { "stringValue": "List" },
                                "CacheKey": { "stringValue": "22:embedded(False)" },
                                "ObjectType": { "stringValue": "Page" }
                            }
                        },
                        {
                            "t": "DataRowInserted",
                            "cells": {
                                "Name": { "stringValue": "Some Report" },
                                "DepartmentCategory": { "stringValue": "Report" },
                                "CacheKey": { "stringValue": "205:embedded(False)" },
                                "ObjectType": { "stringValue": "Report" }
                            }
                        }
                    ]
                }
            ])],
        }]
    }

    #[test]
    fn bc27_plus_extracts_page_rows_and_drops_non_pages() {
        let matches = parse_tell_me_results(&bc27_handlers());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].page_id, "22");
        assert_eq!(matches[0].caption, "Customer List");
        assert_eq!(matches[0].page_type, PageType::List);
    }

    #[test]
    fn legacy_tuple_shape_is_used_when_modern_shape_yields_nothing() {
        let handlers = vec![Handler {
            handler_type: "SomeLegacyHandler".to_string(),
            parameters: vec![json!({
                "Value": [
                    ["Customer Card", "Card", "21", "Page"],
                    ["Post Report", "Report", "206", "Report"]
                ]
            })],
        }];
        let matches = parse_tell_me_results(&handlers);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].page_id, "21");
        assert_eq!(matches[0].page_type, PageType::Card);
    }

    #[test]
    fn page_number_prefix_regex_stops_at_first_colon() {
        let caps = PAGE_NUMBER_PREFIX.captures("9302:embedded(True)").unwrap();
        assert_eq!(&caps[1], "9302");
    }
}
