//! Merge configuration: per-path strategies, map key ordering, and the
//! top-level [`MergeConfiguration`] handed to [`crate::merge`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use khist_node::FieldPath;

/// How a list of maps is combined with its patch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// The patch list replaces the previous list wholesale.
    #[default]
    Replace,
    /// Elements are matched by merge key and merged pairwise.
    Merge,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStrategy::Replace => f.write_str("replace"),
            MergeStrategy::Merge => f.write_str("merge"),
        }
    }
}

/// Strategy and merge key for one field path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    pub strategy: MergeStrategy,
    #[serde(default)]
    pub merge_key: Option<String>,
}

impl MergeConfig {
    pub fn replace() -> Self {
        Self::default()
    }

    /// Merge-by-key on `key`.
    pub fn merge_on(key: impl Into<String>) -> Self {
        Self {
            strategy: MergeStrategy::Merge,
            merge_key: Some(key.into()),
        }
    }

    /// The merge key to reconcile on, or `None` when the list is replaced.
    /// `Merge` without a key behaves as `Replace`.
    pub fn effective_merge_key(&self) -> Option<&str> {
        match self.strategy {
            MergeStrategy::Merge => self.merge_key.as_deref().filter(|k| !k.is_empty()),
            MergeStrategy::Replace => None,
        }
    }
}

/// Maps a field path to its merge configuration.
///
/// Paths are built from map keys only: elements of a list share the path of
/// the list field, so `spec.template.spec.containers.ports` names the ports
/// list inside every container. A `None` answer means `Replace`.
pub trait MergeConfigResolver: Send + Sync {
    fn resolve(&self, path: &FieldPath) -> Option<MergeConfig>;
}

impl<R: MergeConfigResolver + ?Sized> MergeConfigResolver for Arc<R> {
    fn resolve(&self, path: &FieldPath) -> Option<MergeConfig> {
        (**self).resolve(path)
    }
}

impl<R: MergeConfigResolver + ?Sized> MergeConfigResolver for Box<R> {
    fn resolve(&self, path: &FieldPath) -> Option<MergeConfig> {
        (**self).resolve(path)
    }
}

/// Exact-path rule table with an optional parent consulted on a miss.
///
/// Chaining lets callers layer local overrides over a shared base table.
#[derive(Clone, Default)]
pub struct StaticResolver {
    rules: HashMap<FieldPath, MergeConfig>,
    parent: Option<Arc<dyn MergeConfigResolver>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`StaticResolver::insert`].
    pub fn with_rule(mut self, path: FieldPath, config: MergeConfig) -> Self {
        self.insert(path, config);
        self
    }

    pub fn with_parent(mut self, parent: Arc<dyn MergeConfigResolver>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Add or replace the rule for `path`. Returns the previous rule.
    pub fn insert(&mut self, path: FieldPath, config: MergeConfig) -> Option<MergeConfig> {
        self.rules.insert(path, config)
    }

    /// Number of local rules, not counting the parent's.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl MergeConfigResolver for StaticResolver {
    fn resolve(&self, path: &FieldPath) -> Option<MergeConfig> {
        match self.rules.get(path) {
            Some(config) => Some(config.clone()),
            None => self.parent.as_ref().and_then(|p| p.resolve(path)),
        }
    }
}

impl fmt::Debug for StaticResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticResolver")
            .field("rules", &self.rules.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// Decides the key order of a merged map.
///
/// Implementations receive the previous map's keys, the patch's data keys
/// (directives removed), and keys referenced only by a `$setElementOrder`
/// directive. Keys missing from the answer are appended in default order;
/// unknown or repeated keys are ignored.
pub trait MapKeyOrderStrategy: Send + Sync {
    fn order(&self, prev: &[&str], patch: &[&str], directive_only: &[&str]) -> Vec<String>;
}

/// Previous keys in previous order, then keys new in the patch in patch
/// order, then directive-only keys.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrevThenPatchOrder;

impl MapKeyOrderStrategy for PrevThenPatchOrder {
    fn order(&self, prev: &[&str], patch: &[&str], directive_only: &[&str]) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(prev.len() + patch.len());
        let mut out = Vec::with_capacity(prev.len() + patch.len() + directive_only.len());
        for key in prev.iter().chain(patch).chain(directive_only) {
            if seen.insert(*key) {
                out.push((*key).to_string());
            }
        }
        out
    }
}

/// Everything the engine needs besides the two trees.
#[derive(Clone)]
pub struct MergeConfiguration {
    pub(crate) resolver: Arc<dyn MergeConfigResolver>,
    pub(crate) key_order: Arc<dyn MapKeyOrderStrategy>,
    pub(crate) null_removes_field: bool,
}

impl MergeConfiguration {
    pub fn new(resolver: impl MergeConfigResolver + 'static) -> Self {
        Self::from_shared(Arc::new(resolver))
    }

    pub fn from_shared(resolver: Arc<dyn MergeConfigResolver>) -> Self {
        Self {
            resolver,
            key_order: Arc::new(PrevThenPatchOrder),
            null_removes_field: false,
        }
    }

    pub fn with_key_order(mut self, strategy: impl MapKeyOrderStrategy + 'static) -> Self {
        self.key_order = Arc::new(strategy);
        self
    }

    /// When set, a `null` patch value removes the field instead of storing a
    /// null.
    pub fn with_null_removes_field(mut self, enabled: bool) -> Self {
        self.null_removes_field = enabled;
        self
    }

    pub fn resolver(&self) -> &dyn MergeConfigResolver {
        self.resolver.as_ref()
    }

    pub fn null_removes_field(&self) -> bool {
        self.null_removes_field
    }

    /// Resolved configuration for `path`, `Replace` when unresolved.
    pub fn resolve(&self, path: &FieldPath) -> MergeConfig {
        self.resolver.resolve(path).unwrap_or_default()
    }
}

impl Default for MergeConfiguration {
    fn default() -> Self {
        Self::new(StaticResolver::new())
    }
}

impl fmt::Debug for MergeConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeConfiguration")
            .field("null_removes_field", &self.null_removes_field)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(text: &str) -> FieldPath {
        FieldPath::parse(text).unwrap()
    }

    #[test]
    fn merge_without_key_is_replace() {
        let config = MergeConfig {
            strategy: MergeStrategy::Merge,
            merge_key: None,
        };
        assert_eq!(config.effective_merge_key(), None);
        assert_eq!(MergeConfig::merge_on("name").effective_merge_key(), Some("name"));
        assert_eq!(MergeConfig::replace().effective_merge_key(), None);
    }

    #[test]
    fn parent_chain_fallback() {
        let base = StaticResolver::new()
            .with_rule(path("spec.containers"), MergeConfig::merge_on("name"))
            .with_rule(path("spec.volumes"), MergeConfig::merge_on("name"));
        let local = StaticResolver::new()
            .with_rule(path("spec.volumes"), MergeConfig::replace())
            .with_parent(Arc::new(base));

        assert_eq!(
            local.resolve(&path("spec.containers")),
            Some(MergeConfig::merge_on("name"))
        );
        assert_eq!(local.resolve(&path("spec.volumes")), Some(MergeConfig::replace()));
        assert_eq!(local.resolve(&path("spec.tolerations")), None);
        assert_eq!(local.len(), 1);
    }

    #[test]
    fn unresolved_defaults_to_replace() {
        let config = MergeConfiguration::default();
        assert_eq!(config.resolve(&path("anything")), MergeConfig::replace());
        assert!(!config.null_removes_field());
    }

    #[test]
    fn default_key_order() {
        let order = PrevThenPatchOrder.order(&["b", "a"], &["c", "a"], &["d"]);
        assert_eq!(order, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn strategy_names() {
        assert_eq!(MergeStrategy::Merge.to_string(), "merge");
        assert_eq!(MergeStrategy::default(), MergeStrategy::Replace);
    }
}
