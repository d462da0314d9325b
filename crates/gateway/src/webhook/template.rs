//! Mustache-style `{{dot.path}}` template expansion against a JSON
//! payload.
//!
//! No code evaluation — just recursive descent into the value. Array
//! elements are addressed with numeric segments (`{{items.0.id}}`).
//! Missing paths expand to the empty string so internal field names are
//! never surfaced; objects and arrays render as JSON.

use serde_json::Value;

/// Expand every `{{path}}` occurrence in `template` against `payload`.
pub fn expand(template: &str, payload: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let path = after_open[..end].trim();
                out.push_str(&render(lookup(payload, path)));
                rest = &after_open[end + 2..];
            }
            None => {
                // Unterminated marker: emit it verbatim.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Walk a dot path through a JSON value. Numeric segments index arrays.
fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut current = payload;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}
