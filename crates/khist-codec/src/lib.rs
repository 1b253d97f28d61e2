//! Text round-trip for khist node trees.
//!
//! Decodes a single YAML or JSON document into a [`Node`] and renders a node
//! back to YAML (block style) or JSON (compact). Map key order is preserved in
//! both directions.
//!
//! # Key Types
//!
//! - [`Format`] -- Text format selector, with content sniffing
//! - [`CodecError`] -- Malformed input, multiple documents, aliases, emit failures

pub mod error;
pub mod json;
pub mod yaml;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use khist_node::Node;

pub use error::{CodecError, CodecResult};
pub use json::{from_json_str, to_json_string, to_json_string_pretty};
pub use yaml::{from_yaml_str, to_yaml_string};

/// Supported text formats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Format {
    #[default]
    Yaml,
    Json,
}

impl Format {
    /// Guess the format from content: a leading `{` or `[` means JSON.
    pub fn sniff(text: &str) -> Self {
        match text.trim_start().chars().next() {
            Some('{') | Some('[') => Format::Json,
            _ => Format::Yaml,
        }
    }

    /// Format implied by a file extension, if any.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(Format::Json),
            Some("yaml") | Some("yml") => Some(Format::Yaml),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Yaml => f.write_str("yaml"),
            Format::Json => f.write_str("json"),
        }
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Format::Yaml),
            "json" => Ok(Format::Json),
            other => Err(format!("unknown format `{other}`")),
        }
    }
}

/// Decode `text` in the given format.
pub fn decode(text: &str, format: Format) -> CodecResult<Node> {
    match format {
        Format::Yaml => from_yaml_str(text),
        Format::Json => from_json_str(text),
    }
}

/// Decode `text`, sniffing the format. JSON is a subset of YAML 1.2, but the
/// JSON path is stricter and faster, so it is preferred when it applies.
pub fn decode_any(text: &str) -> CodecResult<Node> {
    decode(text, Format::sniff(text))
}

/// Render `node` in the given format.
pub fn encode(node: &Node, format: Format) -> CodecResult<String> {
    match format {
        Format::Yaml => to_yaml_string(node),
        Format::Json => to_json_string(node),
    }
}
