pub mod fs_read;
pub mod fs_write;
pub mod range_edit;

use crate::errors::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// Decodes tool arguments. Failures carry serde's field-level message and happen before any I/O.
pub fn parse_args<T: DeserializeOwned>(params: Value) -> AppResult<T> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| AppError::SchemaInvalid(e.to_string()))
}

pub fn object_schema(required: &[&str], properties: Value) -> Value {
    json!({"type": "object", "required": required, "properties": properties, "additionalProperties": false})
}

pub fn text_range_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "description": description,
        "required": ["beforeText", "afterText"],
        "properties": {
            "beforeText": {"type": "string", "description": "Text immediately before the region"},
            "afterText": {"type": "string", "description": "Text immediately after the region"}
        },
        "additionalProperties": false
    })
}

pub fn string_prop(description: &str) -> Value {
    json!({"type": "string", "description": description})
}
