//! Minimal JSON-schema validation for tool inputs.
//!
//! Covers the subset the builtin and MCP tool schemas actually use:
//! `type`, `required`, `properties`, `enum`, `items`. Unknown keywords are
//! ignored so richer schemas still pass through.

use serde_json::Value;

/// Validate `value` against `schema`. Returns human-readable violations;
/// empty means valid.
pub fn validate(schema: &Value, value: &Value) -> Vec<String> {
    let mut violations = Vec::new();
    validate_at(schema, value, "$", &mut violations);
    violations
}

fn validate_at(schema: &Value, value: &Value, path: &str, out: &mut Vec<String>) {
    let Some(schema_obj) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema_obj.get("type").and_then(|t| t.as_str()) {
        if !type_matches(expected, value) {
            out.push(format!("{path}: expected {expected}, got {}", type_name(value)));
            return;
        }
    }

    if let Some(allowed) = schema_obj.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            out.push(format!("{path}: value not in enum"));
        }
    }

    if let Some(obj) = value.as_object() {
        if let Some(required) = schema_obj.get("required").and_then(|r| r.as_array()) {
            for req in required.iter().filter_map(|r| r.as_str()) {
                if !obj.contains_key(req) {
                    out.push(format!("{path}: missing required property '{req}'"));
                }
            }
        }
        if let Some(props) = schema_obj.get("properties").and_then(|p| p.as_object()) {
            for (key, prop_schema) in props {
                if let Some(v) = obj.get(key) {
                    validate_at(prop_schema, v, &format!("{path}.{key}"), out);
                }
            }
        }
    }

    if let (Some(items), Some(arr)) = (schema_obj.get("items"), value.as_array()) {
        for (i, item) in arr.iter().enumerate() {
            validate_at(items, item, &format!("{path}[{i}]"), out);
        }
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn calculator_schema() -> Value {
        json!({
            "type": "object",
            "required": ["expression"],
            "properties": {
                "expression": {"type": "string"}
            }
        })
    }

    #[test]
    fn valid_input_passes() {
        let v = validate(&calculator_schema(), &json!({"expression": "2+2"}));
        assert!(v.is_empty(), "{v:?}");
    }

    #[test]
    fn missing_required_property_is_reported() {
        let v = validate(&calculator_schema(), &json!({}));
        assert_eq!(v.len(), 1);
        assert!(v[0].contains("expression"));
    }

    #[test]
    fn wrong_type_is_reported() {
        let v = validate(&calculator_schema(), &json!({"expression": 42}));
        assert!(v[0].contains("expected string"));
    }

    #[test]
    fn top_level_type_mismatch() {
        let v = validate(&calculator_schema(), &json!("not an object"));
        assert!(v[0].contains("expected object"));
    }

    #[test]
    fn enum_constraint() {
        let schema = json!({
            "type": "object",
            "properties": {"unit": {"type": "string", "enum": ["C", "F"]}}
        });
        assert!(validate(&schema, &json!({"unit": "C"})).is_empty());
        assert!(!validate(&schema, &json!({"unit": "K"})).is_empty());
    }

    #[test]
    fn array_items_validated() {
        let schema = json!({
            "type": "object",
            "properties": {"ids": {"type": "array", "items": {"type": "integer"}}}
        });
        assert!(validate(&schema, &json!({"ids": [1, 2, 3]})).is_empty());
        let v = validate(&schema, &json!({"ids": [1, "two"]}));
        assert!(v[0].contains("[1]"));
    }

    #[test]
    fn unknown_keywords_ignored() {
        let schema = json!({
            "type": "object",
            "additionalProperties": false,
            "minProperties": 3,
        });
        assert!(validate(&schema, &json!({})).is_empty());
    }
}
