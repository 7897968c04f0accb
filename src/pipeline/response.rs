//! Normalized tool response shape and coercion.
//!
//! Transformers are external collaborators; whatever they return is coerced
//! field-by-field into `NormalizedToolResponse`. Malformed output is never
//! propagated as an error — invalid fields are replaced by defaults and the
//! substitution is logged.

use std::collections::HashMap;

use serde::Serialize;

// ─── NormalizedToolResponse ──────────────────────────────────────────────────

/// The one shape every transformed tool result takes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedToolResponse {
    /// Human-readable summary; empty when the transformer supplied none.
    pub message: String,
    /// Logical artifact name → storage location.
    pub paths: HashMap<String, String>,
    /// Opaque payload carried through untouched.
    pub raw_content: serde_json::Value,
}

impl Default for NormalizedToolResponse {
    fn default() -> Self {
        Self {
            message: String::new(),
            paths: HashMap::new(),
            raw_content: serde_json::Value::Null,
        }
    }
}

impl NormalizedToolResponse {
    /// JSON form used for model-bound messages. Round-trips through
    /// `validate_tool_response` unchanged.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

// ─── Coercion ────────────────────────────────────────────────────────────────

/// Coerce an arbitrary transformer return value into the normalized shape.
///
/// Valid fields are kept; missing or wrongly-typed fields become defaults.
/// Validating an already-valid response is idempotent.
pub fn validate_tool_response(value: serde_json::Value) -> NormalizedToolResponse {
    let mut normalized = NormalizedToolResponse::default();

    let serde_json::Value::Object(mut fields) = value else {
        if !value.is_null() {
            tracing::warn!(
                got = %value_kind(&value),
                "transformer returned a non-object response; substituting defaults"
            );
        }
        return normalized;
    };

    match fields.remove("message") {
        Some(serde_json::Value::String(message)) => normalized.message = message,
        Some(other) => {
            tracing::warn!(
                got = %value_kind(&other),
                "transformer 'message' field is not a string; substituting default"
            );
        }
        None => {}
    }

    match fields.remove("paths") {
        Some(serde_json::Value::Object(entries)) => {
            for (name, location) in entries {
                match location {
                    serde_json::Value::String(location) => {
                        normalized.paths.insert(name, location);
                    }
                    other => {
                        tracing::warn!(
                            path = %name,
                            got = %value_kind(&other),
                            "transformer path entry is not a string; dropping it"
                        );
                    }
                }
            }
        }
        Some(other) => {
            tracing::warn!(
                got = %value_kind(&other),
                "transformer 'paths' field is not a mapping; substituting default"
            );
        }
        None => {}
    }

    if let Some(raw_content) = fields.remove("raw_content") {
        normalized.raw_content = raw_content;
    }

    normalized
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_response_kept() {
        let value = serde_json::json!({
            "message": "saved two files",
            "paths": {"report": "/data/report.pdf"},
            "raw_content": {"bytes": 1024},
        });
        let normalized = validate_tool_response(value);

        assert_eq!(normalized.message, "saved two files");
        assert_eq!(
            normalized.paths.get("report").map(String::as_str),
            Some("/data/report.pdf")
        );
        assert_eq!(normalized.raw_content, serde_json::json!({"bytes": 1024}));
    }

    #[test]
    fn test_missing_fields_become_defaults() {
        let normalized = validate_tool_response(serde_json::json!({}));
        assert_eq!(normalized, NormalizedToolResponse::default());
    }

    #[test]
    fn test_null_becomes_defaults() {
        let normalized = validate_tool_response(serde_json::Value::Null);
        assert_eq!(normalized, NormalizedToolResponse::default());
    }

    #[test]
    fn test_non_object_becomes_defaults() {
        assert_eq!(
            validate_tool_response(serde_json::json!("just a string")),
            NormalizedToolResponse::default()
        );
        assert_eq!(
            validate_tool_response(serde_json::json!([1, 2, 3])),
            NormalizedToolResponse::default()
        );
    }

    #[test]
    fn test_wrong_types_coerced_field_by_field() {
        let value = serde_json::json!({
            "message": 42,
            "paths": "not-a-map",
            "raw_content": "kept",
        });
        let normalized = validate_tool_response(value);

        assert_eq!(normalized.message, "");
        assert!(normalized.paths.is_empty());
        assert_eq!(normalized.raw_content, serde_json::json!("kept"));
    }

    #[test]
    fn test_valid_fields_survive_next_to_invalid_ones() {
        let value = serde_json::json!({
            "message": "partial",
            "paths": {"good": "/a", "bad": 7},
        });
        let normalized = validate_tool_response(value);

        assert_eq!(normalized.message, "partial");
        assert_eq!(normalized.paths.len(), 1);
        assert_eq!(normalized.paths.get("good").map(String::as_str), Some("/a"));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let value = serde_json::json!({
            "message": "done",
            "paths": {"out": "/tmp/out"},
            "raw_content": [1, 2],
        });
        let once = validate_tool_response(value);
        let twice = validate_tool_response(once.to_json());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_default_round_trips() {
        let once = validate_tool_response(serde_json::Value::Null);
        let twice = validate_tool_response(once.to_json());
        assert_eq!(once, twice);
    }
}
