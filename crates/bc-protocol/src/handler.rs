//! The opaque wire handler object and small tree-walking utilities shared by
//! every higher-level parser (session init, form-state index, filter cache).

use serde::Deserialize;
use serde_json::Value;

/// `{handlerType: string, parameters: any[]}` — transient input to the
/// protocol adapter. Never persisted past a single parse pass.
#[derive(Debug, Clone, Deserialize)]
pub struct Handler {
    #[serde(rename = "handlerType")]
    pub handler_type: String,
    #[serde(default)]
    pub parameters: Vec<Value>,
}

impl Handler {
    #[must_use]
    pub fn first_parameter(&self) -> Option<&Value> {
        self.parameters.first()
    }
}

/// Recursively search `root` for every object carrying all of `keys` (as
/// object keys), yielding each matching object by reference. Used to locate
/// session-info fields, filter-column metadata, and control subtrees without
/// assuming where in the nesting they live — the handler tree's shape is not
/// contractually stable across BC versions.
pub fn find_objects_with_keys<'a>(root: &'a Value, keys: &[&str]) -> Vec<&'a Value> {
    let mut out = Vec::new();
    walk(root, &mut |v| {
        if let Value::Object(map) = v {
            if keys.iter().all(|k| map.contains_key(*k)) {
                out.push(v);
            }
        }
    });
    out
}

/// Recursively search for the first string value found under the given
/// object key, anywhere in the tree.
#[must_use]
pub fn find_string_field<'a>(root: &'a Value, key: &str) -> Option<&'a str> {
    let mut found = None;
    walk(root, &mut |v| {
        if found.is_some() {
            return;
        }
        if let Value::Object(map) = v {
            if let Some(Value::String(s)) = map.get(key) {
                found = Some(s.as_str());
            }
        }
    });
    found
}

fn walk<'a, F: FnMut(&'a Value)>(v: &'a Value, f: &mut F) {
    f(v);
    match v {
        Value::Object(map) => {
            for child in map.values() {
                walk(child, f);
            }
        }
        Value::Array(arr) => {
            for child in arr {
                walk(child, f);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_nested_string_field() {
        let tree = json!({
            "Children": [
                { "Other": 1 },
                { "ServerSessionId": "abc-123" },
            ]
        });
        assert_eq!(find_string_field(&tree, "ServerSessionId"), Some("abc-123"));
    }

    #[test]
    fn finds_all_objects_with_both_keys() {
        let tree = json!({
            "Children": [
                { "Id": "18_Customer.2", "Caption": "Name" },
                { "Id": "19_Customer.3" },
            ]
        });
        let found = find_objects_with_keys(&tree, &["Id", "Caption"]);
        assert_eq!(found.len(), 1);
    }
}
