//! Error types for timeline replay.

use std::path::PathBuf;

use khist_codec::CodecError;
use khist_merge::MergeError;

/// Errors that can occur while loading audit logs or replaying timelines.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line of an audit log is not a valid audit event.
    #[error("{source_name}:{line}: malformed audit event: {message}")]
    Decode {
        source_name: String,
        line: usize,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Merging one audit entry into its timeline failed.
    #[error("audit entry {audit_id} on {resource}: {source}")]
    Merge {
        audit_id: String,
        resource: String,
        #[source]
        source: MergeError,
    },

    /// An audit entry lacks the object its verb needs.
    #[error("audit entry {audit_id} on {resource}: {reason}")]
    Entry {
        audit_id: String,
        resource: String,
        reason: String,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A history store invariant was violated.
    #[error("store error: {0}")]
    Store(String),

    /// A replay worker panicked or was cancelled.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl TimelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TimelineError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias for timeline results.
pub type TimelineResult<T> = Result<T, TimelineError>;
