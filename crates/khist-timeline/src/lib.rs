//! Audit-log replay for khist.
//!
//! Reads Kubernetes audit logs, groups the write entries by resource, and
//! replays each resource's entries through the strategic merge engine to
//! rebuild its manifest history.
//!
//! # Key Types
//!
//! - [`AuditEvent`] -- One audit log entry, with request and response objects as nodes
//! - [`ResourceKey`] -- Identity of a timeline: group, resource, namespace, name
//! - [`ReplayConfig`] -- Worker count, error policy and merge-key rules, loaded from TOML
//! - [`ManifestRevision`] -- One state of a resource with its digest
//! - [`replay_log`] / [`ReplayReport`] -- Concurrent replay of a whole log into a store
//! - [`HistoryStore`] / [`InMemoryHistoryStore`] -- Revision storage per resource
//! - [`RevisionDiff`] -- Line diff between two revisions

pub mod audit;
pub mod config;
pub mod diff;
pub mod error;
pub mod key;
pub mod pool;
pub mod replay;
pub mod resolver;
pub mod store;

pub use audit::{parse_audit_lines, read_audit_path, AuditEvent, ObjectReference};
pub use config::{ErrorPolicy, MergeRule, ReplayConfig};
pub use diff::{diff_manifests, diff_revisions, DiffHunk, DiffLine, RevisionDiff};
pub use error::{TimelineError, TimelineResult};
pub use key::ResourceKey;
pub use pool::{replay_log, ReplayReport};
pub use replay::{
    digest, group_events, is_replayable, replay_timeline, EntryFailure, ManifestRevision,
    TimelineReplay,
};
pub use resolver::{builtin_resolver, LoggingResolver};
pub use store::{HistoryStore, InMemoryHistoryStore};
