use thiserror::Error;

use crate::node::NodeType;

/// Errors produced by node access and path navigation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("not a scalar: node is a {actual}")]
    NotScalar { actual: NodeType },

    #[error("field not found: {path}")]
    FieldNotFound { path: String },

    #[error("type mismatch at {path}: expected {expected}, found {actual}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        actual: String,
    },

    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },
}

/// Convenience alias for node results.
pub type NodeResult<T> = Result<T, NodeError>;
