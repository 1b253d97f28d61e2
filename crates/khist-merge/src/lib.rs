//! Strategic merge patch engine for khist.
//!
//! Applies Kubernetes-style strategic merge patches to ordered node trees:
//! maps merge key by key, lists of maps merge element by element on a
//! configured merge key, and `$`-directives in the patch steer deletion,
//! replacement, retention and ordering.
//!
//! ```
//! use khist_merge::{merge, MergeConfig, MergeConfiguration, StaticResolver};
//! use khist_node::{FieldPath, MapNode, Node};
//!
//! let resolver = StaticResolver::new()
//!     .with_rule(FieldPath::parse("containers").unwrap(), MergeConfig::merge_on("name"));
//! let config = MergeConfiguration::new(resolver);
//!
//! let container = |name: &str, image: &str| {
//!     let mut map = MapNode::new();
//!     map.insert("name", Node::from(name));
//!     map.insert("image", Node::from(image));
//!     Node::Map(map)
//! };
//! let doc = |items: Vec<Node>| {
//!     let mut map = MapNode::new();
//!     map.insert("containers", Node::Sequence(items));
//!     Node::Map(map)
//! };
//!
//! let prev = doc(vec![container("app", "app:1"), container("proxy", "envoy:1")]);
//! let patch = doc(vec![container("app", "app:2")]);
//! let merged = merge(Some(&prev), Some(&patch), &config).unwrap().unwrap();
//!
//! let items = merged.get("containers").unwrap().as_sequence().unwrap();
//! assert_eq!(items[0].get("name").unwrap().as_str(), Some("proxy"));
//! assert_eq!(items[1].get("image").unwrap().as_str(), Some("app:2"));
//! ```
//!
//! # Key Types
//!
//! - [`merge`] -- Entry point: `(prev, patch, config) -> result`
//! - [`MergeConfiguration`] -- Resolver, key-order strategy and null handling
//! - [`MergeConfigResolver`] / [`StaticResolver`] -- Field path to strategy and merge key
//! - [`PatchLevel`] / [`Directives`] -- A patch map split into data and directives
//! - [`reconcile::plan`] / [`Slot`] -- Element order for lists merged by key
//! - [`MergeError`] / [`ErrorKind`] -- Failures, grouped into structural, directive, key and encoding

pub mod config;
pub mod directive;
pub mod engine;
pub mod error;
pub mod reconcile;

pub use config::{
    MapKeyOrderStrategy, MergeConfig, MergeConfigResolver, MergeConfiguration, MergeStrategy,
    PrevThenPatchOrder, StaticResolver,
};
pub use directive::{Directives, PatchDirective, PatchLevel, Scope};
pub use engine::merge;
pub use error::{ErrorKind, MergeError, MergeResult};
pub use reconcile::Slot;
