//! Shared keys and small helpers over the raw tree.

use serde_json::Value;

/// Key of an internal or external reference wrapper.
pub const REF_KEY: &str = "$ref";

/// Reserved key holding a node's trait list.
pub const TRAITS_KEY: &str = "traits";

/// Annotation carrying a message's derived display name.
pub const MESSAGE_NAME_KEY: &str = "x-parser-message-name";

/// Returns the JSON type name for diagnostic messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Escape a map key for use as a JSON Pointer segment.
pub fn escape_segment(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Append a key to a diagnostic path.
pub fn child_path(path: &str, key: &str) -> String {
    format!("{}/{}", path, escape_segment(key))
}
