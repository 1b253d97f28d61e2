//! Error types for the codec crate.

/// Errors that can occur while decoding or encoding node trees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The YAML scanner or parser rejected the input.
    #[error("malformed YAML: {0}")]
    Yaml(String),

    /// serde_json rejected the input (includes trailing documents).
    #[error("malformed JSON: {0}")]
    Json(String),

    /// More than one YAML document in a stream that must hold exactly one.
    #[error("expected a single YAML document, found more than one")]
    MultipleDocuments,

    /// An alias (`*name`) was found. Trees are never shared, so aliases are
    /// refused instead of being expanded.
    #[error("YAML alias nodes are not supported (anchor id {anchor})")]
    AliasNotSupported { anchor: usize },

    #[error("duplicate map key `{key}`")]
    DuplicateKey { key: String },

    #[error("map keys must be scalars")]
    NonScalarKey,

    /// Serialization back to text failed.
    #[error("emit error: {0}")]
    Emit(String),
}

/// Convenience alias for codec results.
pub type CodecResult<T> = Result<T, CodecError>;
