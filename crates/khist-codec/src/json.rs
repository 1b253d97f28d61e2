//! JSON decoding and encoding via `serde_json`.
//!
//! Maps keep their source order on the way in and their insertion order on
//! the way out. JSON has no timestamp type, so timestamps are written as
//! RFC 3339 strings and read back as strings.

use khist_node::Node;

use crate::error::{CodecError, CodecResult};

/// Parse exactly one JSON value. Trailing values are an error.
pub fn from_json_str(text: &str) -> CodecResult<Node> {
    serde_json::from_str(text).map_err(|e| CodecError::Json(e.to_string()))
}

/// Compact JSON rendering.
pub fn to_json_string(node: &Node) -> CodecResult<String> {
    serde_json::to_string(node).map_err(|e| CodecError::Emit(e.to_string()))
}

/// Indented JSON rendering, for humans.
pub fn to_json_string_pretty(node: &Node) -> CodecResult<String> {
    serde_json::to_string_pretty(node).map_err(|e| CodecError::Emit(e.to_string()))
}
