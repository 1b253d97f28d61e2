//! Foundation types for khist.
//!
//! This crate provides the ordered tree value that manifests, patches and
//! merge results are expressed in. Every other khist crate depends on
//! `khist-node`.
//!
//! # Key Types
//!
//! - [`Node`] -- Immutable ordered tree: scalar, sequence or map
//! - [`Scalar`] -- Leaf value (null, bool, int, float, string, timestamp)
//! - [`MapNode`] -- Insertion-ordered association list with unique keys
//! - [`FieldPath`] -- Dot-separated field path with `\.` escapes
//! - [`Reader`] -- Path navigation and typed extraction over a node

pub mod error;
pub mod hash;
pub mod node;
pub mod path;
pub mod reader;
pub mod serialization;

pub use error::{NodeError, NodeResult};
pub use hash::HashKey;
pub use node::{ChildKey, Children, MapNode, Node, NodeType, Scalar};
pub use path::FieldPath;
pub use reader::Reader;
