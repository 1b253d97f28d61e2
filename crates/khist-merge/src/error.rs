use khist_node::FieldPath;

/// Broad error classes. Callers use these to decide whether a failure is a
/// malformed patch, malformed data, or a configuration mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Sequence elements of inconsistent types.
    Structural,
    /// Unknown or malformed `$`-directive.
    Directive,
    /// A merge-key array element lacks its key.
    Key,
    /// A value cannot be used as a hash key.
    Encoding,
}

/// Errors produced by the merge engine. Every variant carries the field path
/// at which it was raised (`<root>` for the document itself).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error("element type mismatch at {path}: {reason}")]
    ElementTypeMismatch { path: String, reason: String },

    #[error("unknown $patch directive `{value}` at {path}")]
    UnknownPatchDirective { path: String, value: String },

    #[error("invalid directive {directive} at {path}: expected {expected}, got {actual}")]
    InvalidDirective {
        path: String,
        directive: String,
        expected: &'static str,
        actual: String,
    },

    #[error("element at {path} is missing merge key `{key}`")]
    MissingMergeKey { path: String, key: String },

    #[error("merge key `{key}` at {path} has a non-hashable {actual} value")]
    NotHashable {
        path: String,
        key: String,
        actual: String,
    },
}

impl MergeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MergeError::ElementTypeMismatch { .. } => ErrorKind::Structural,
            MergeError::UnknownPatchDirective { .. } | MergeError::InvalidDirective { .. } => {
                ErrorKind::Directive
            }
            MergeError::MissingMergeKey { .. } => ErrorKind::Key,
            MergeError::NotHashable { .. } => ErrorKind::Encoding,
        }
    }

    /// The rendered field path the error was raised at.
    pub fn path(&self) -> &str {
        match self {
            MergeError::ElementTypeMismatch { path, .. }
            | MergeError::UnknownPatchDirective { path, .. }
            | MergeError::InvalidDirective { path, .. }
            | MergeError::MissingMergeKey { path, .. }
            | MergeError::NotHashable { path, .. } => path,
        }
    }
}

/// Render a path for an error message.
pub(crate) fn display_path(path: &FieldPath) -> String {
    if path.is_root() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}

/// Convenience alias for merge results.
pub type MergeResult<T> = Result<T, MergeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let err = MergeError::MissingMergeKey {
            path: "spec.containers".into(),
            key: "name".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Key);
        assert_eq!(err.path(), "spec.containers");
        assert_eq!(
            err.to_string(),
            "element at spec.containers is missing merge key `name`"
        );

        let err = MergeError::UnknownPatchDirective {
            path: "<root>".into(),
            value: "bogus".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Directive);
    }

    #[test]
    fn root_path_is_named() {
        assert_eq!(display_path(&FieldPath::root()), "<root>");
        assert_eq!(display_path(&FieldPath::parse("a.b").unwrap()), "a.b");
    }
}
