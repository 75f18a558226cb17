//! String templating for HTTP actions.
//!
//! Any string value may contain `${path.to.value}` placeholders. A
//! placeholder is resolved by walking the dotted path into a JSON scope
//! composed of the serialized execution state plus the caller-supplied
//! params; an unresolved path substitutes an empty string, never an error.
//! Rendering recurses through nested maps and arrays, and numeric path
//! segments index into arrays.

use crate::execution::Execution;
use crate::registry::FunctionParams;
use serde_json::Value as JsonValue;

/// Builds the templating scope for an HTTP action: the serialized
/// execution with the params attached under `"params"`.
#[must_use]
pub fn scope_for(execution: &Execution, params: Option<&FunctionParams>) -> JsonValue {
    let mut scope = serde_json::to_value(execution).unwrap_or(JsonValue::Null);
    if let JsonValue::Object(map) = &mut scope {
        let params = params
            .map(|p| JsonValue::Object(p.clone()))
            .unwrap_or(JsonValue::Null);
        map.insert("params".to_string(), params);
    }
    scope
}

/// Renders every placeholder in a JSON value, recursing through maps and
/// arrays. Non-string leaves pass through unchanged.
#[must_use]
pub fn render_value(template: &JsonValue, scope: &JsonValue) -> JsonValue {
    match template {
        JsonValue::String(s) => JsonValue::String(render_str(s, scope)),
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|item| render_value(item, scope)).collect())
        }
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), render_value(value, scope)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Renders `${...}` placeholders in a string against the scope.
#[must_use]
pub fn render_str(template: &str, scope: &JsonValue) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let path = &after[..end];
                if let Some(value) = resolve(scope, path) {
                    out.push_str(&scalar_to_string(value));
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated placeholder: emit the remainder verbatim.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Walks a dotted path into a JSON value. Numeric segments index arrays.
#[must_use]
pub fn resolve<'a>(scope: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = scope;
    for segment in path.split('.') {
        current = match current {
            JsonValue::Object(map) => map.get(segment)?,
            JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn scalar_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}
