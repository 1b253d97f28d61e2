//! The recursive strategic merge.
//!
//! Every call builds a fresh tree. Unchanged subtrees are cloned, never
//! borrowed, so the result shares no node with either input and merges on
//! independent trees can run concurrently without coordination.

use std::collections::HashSet;

use khist_node::{FieldPath, HashKey, MapNode, Node, NodeType};
use tracing::{debug, trace};

use crate::config::MergeConfiguration;
use crate::directive::{element_patch_directive, is_list_marker, PatchDirective, PatchLevel, Scope};
use crate::error::{display_path, MergeError, MergeResult};
use crate::reconcile::{self, Slot};

/// Apply `patch` to `prev`.
///
/// Returns `None` when the result is absent: both inputs absent, a
/// `$patch: delete` at the top level, or a `null` patch with
/// [`MergeConfiguration::with_null_removes_field`] enabled.
pub fn merge(
    prev: Option<&Node>,
    patch: Option<&Node>,
    config: &MergeConfiguration,
) -> MergeResult<Option<Node>> {
    Engine { config }.merge_at(&FieldPath::root(), prev, patch, Scope::default())
}

struct Engine<'c> {
    config: &'c MergeConfiguration,
}

impl Engine<'_> {
    fn merge_at<'a>(
        &self,
        path: &FieldPath,
        prev: Option<&'a Node>,
        patch: Option<&'a Node>,
        scope: Scope<'a>,
    ) -> MergeResult<Option<Node>> {
        let Some(patch) = patch else {
            return self.keep(path, prev, scope);
        };

        if let Some(old) = prev {
            if old.node_type() != patch.node_type() {
                debug!(
                    path = %path,
                    from = %old.node_type(),
                    to = %patch.node_type(),
                    "type changed, taking patch"
                );
                return self.merge_at(path, None, Some(patch), Scope::default());
            }
        }

        match patch {
            Node::Scalar(scalar) => {
                if scalar.is_null() && self.config.null_removes_field {
                    trace!(path = %path, "null patch removes field");
                    return Ok(None);
                }
                Ok(Some(patch.clone()))
            }
            Node::Map(map) => {
                let level = PatchLevel::extract(path, map)?;
                if level.directives.is_delete() {
                    trace!(path = %path, "$patch: delete");
                    return Ok(None);
                }
                let merged = self.merge_maps(path, prev.and_then(Node::as_map), &level)?;
                Ok(Some(merged))
            }
            Node::Sequence(items) => {
                self.merge_sequences(
                    path,
                    prev.and_then(Node::as_sequence),
                    Some(items.as_slice()),
                    scope,
                )
            }
        }
    }

    /// No patch data at this field.
    fn keep<'a>(
        &self,
        path: &FieldPath,
        prev: Option<&'a Node>,
        scope: Scope<'a>,
    ) -> MergeResult<Option<Node>> {
        match prev {
            None if scope.set_element_order.is_some() => {
                self.merge_sequences(path, None, None, scope)
            }
            None => Ok(None),
            Some(Node::Sequence(items)) if !scope.is_empty() => {
                self.merge_sequences(path, Some(items.as_slice()), None, scope)
            }
            Some(node) => Ok(Some(node.clone())),
        }
    }

    fn merge_maps(
        &self,
        path: &FieldPath,
        prev: Option<&MapNode>,
        level: &PatchLevel<'_>,
    ) -> MergeResult<Node> {
        let replace = level.directives.is_replace();
        let prev = if replace { None } else { prev };

        let prev_keys: Vec<&str> = prev.map(|m| m.keys().collect()).unwrap_or_default();
        let patch_keys: Vec<&str> = level.keys().collect();
        let directive_only: Vec<&str> = if replace {
            Vec::new()
        } else {
            level
                .directives
                .ordered_fields()
                .filter(|f| !prev_keys.contains(f) && !patch_keys.contains(f))
                .collect()
        };

        let order = self
            .config
            .key_order
            .order(&prev_keys, &patch_keys, &directive_only);
        let known = |k: &str| {
            prev_keys.contains(&k) || patch_keys.contains(&k) || directive_only.contains(&k)
        };
        let mut keys: Vec<&str> = Vec::with_capacity(order.len());
        for key in order.iter().map(String::as_str) {
            if known(key) && !keys.contains(&key) {
                keys.push(key);
            }
        }
        for &key in prev_keys.iter().chain(&patch_keys).chain(&directive_only) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let mut out = MapNode::with_capacity(keys.len());
        for key in keys {
            let child = path.child(key);
            let merged = self.merge_at(
                &child,
                prev.and_then(|m| m.get(key)),
                level.get(key),
                level.directives.scope_for(key),
            )?;
            if let Some(value) = merged {
                out.insert(key, value);
            }
        }

        if let Some(retain) = &level.directives.retain_keys {
            out.retain(|key, _| retain.contains(&key));
        }
        Ok(Node::Map(out))
    }

    fn merge_sequences<'a>(
        &self,
        path: &FieldPath,
        prev: Option<&'a [Node]>,
        patch: Option<&'a [Node]>,
        scope: Scope<'a>,
    ) -> MergeResult<Option<Node>> {
        let prev_kind = element_kind(path, "previous", prev.unwrap_or(&[]))?;
        let patch_kind = element_kind(path, "patch", patch.unwrap_or(&[]))?;
        if let (Some(old), Some(new)) = (prev_kind, patch_kind) {
            if old != new {
                return Err(MergeError::ElementTypeMismatch {
                    path: display_path(path),
                    reason: format!("previous elements are {old}s but patch elements are {new}s"),
                });
            }
        }

        match patch_kind.or(prev_kind).or_else(|| self.directive_kind(path, scope)) {
            Some(NodeType::Map) => self.merge_map_list(path, prev, patch, scope),
            Some(NodeType::Sequence) => self.merge_nested_lists(path, prev, patch).map(Some),
            Some(NodeType::Scalar) | None => merge_scalar_list(path, prev, patch, scope).map(Some),
        }
    }

    /// Element kind implied by `$setElementOrder` when neither side has data.
    fn directive_kind(&self, path: &FieldPath, scope: Scope<'_>) -> Option<NodeType> {
        let order = scope.set_element_order?;
        let keyed = order.iter().any(|item| item.as_map().is_some())
            || self.config.resolve(path).effective_merge_key().is_some();
        Some(if keyed { NodeType::Map } else { NodeType::Scalar })
    }

    /// Lists of lists have no identity; take the patch wholesale.
    fn merge_nested_lists(
        &self,
        path: &FieldPath,
        prev: Option<&[Node]>,
        patch: Option<&[Node]>,
    ) -> MergeResult<Node> {
        let Some(items) = patch else {
            return Ok(Node::Sequence(prev.unwrap_or(&[]).to_vec()));
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if let Some(node) = self.merge_at(path, None, Some(item), Scope::default())? {
                out.push(node);
            }
        }
        Ok(Node::Sequence(out))
    }

    fn merge_map_list<'a>(
        &self,
        path: &FieldPath,
        prev: Option<&'a [Node]>,
        patch: Option<&'a [Node]>,
        scope: Scope<'a>,
    ) -> MergeResult<Option<Node>> {
        let config = self.config.resolve(path);
        let replace_list = patch.unwrap_or(&[]).iter().any(|item| {
            is_list_marker(item) && element_patch_directive(item) == Some(PatchDirective::Replace)
        });
        let merge_key = config.effective_merge_key().filter(|_| !replace_list);

        let Some(merge_key) = merge_key else {
            trace!(path = %path, replace_list, "replacing list of maps");
            let Some(items) = patch else {
                return Ok(prev.map(|items| Node::Sequence(items.to_vec())));
            };
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter().filter(|item| !is_list_marker(item)) {
                if let Some(node) = self.merge_at(path, None, Some(item), Scope::default())? {
                    out.push(node);
                }
            }
            return Ok(Some(Node::Sequence(out)));
        };

        let slots = reconcile::plan(
            path,
            merge_key,
            prev.unwrap_or(&[]),
            patch.unwrap_or(&[]),
            scope,
        )?;
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            let merged = match slot {
                Slot::Both { prev, patch } => {
                    self.merge_at(path, Some(prev), Some(patch), Scope::default())?
                }
                Slot::PatchOnly(patch) => self.merge_at(path, None, Some(patch), Scope::default())?,
                Slot::PrevOnly(prev) => Some(prev.clone()),
                Slot::Stub(value) => Some(stub(merge_key, &value)),
            };
            if let Some(node) = merged {
                out.push(node);
            }
        }
        Ok(Some(Node::Sequence(out)))
    }
}

/// Lists of scalars are governed by directives only.
fn merge_scalar_list(
    path: &FieldPath,
    prev: Option<&[Node]>,
    patch: Option<&[Node]>,
    scope: Scope<'_>,
) -> MergeResult<Node> {
    if let Some(order) = scope.set_element_order {
        if let Some(bad) = order.iter().find(|item| item.as_scalar().is_none()) {
            return Err(MergeError::ElementTypeMismatch {
                path: display_path(path),
                reason: format!("$setElementOrder lists a {} in a list of scalars", bad.describe()),
            });
        }
        return Ok(Node::Sequence(order.to_vec()));
    }

    let mut removed: HashSet<HashKey> = HashSet::new();
    for item in scope.delete_from_primitive_list.unwrap_or(&[]) {
        let scalar = item.as_scalar().ok_or_else(|| MergeError::ElementTypeMismatch {
            path: display_path(path),
            reason: format!(
                "$deleteFromPrimitiveList lists a {} in a list of scalars",
                item.describe()
            ),
        })?;
        removed.insert(scalar.hash_key());
    }

    let base = patch.or(prev).unwrap_or(&[]);
    let items = base
        .iter()
        .filter(|item| {
            item.as_scalar()
                .map_or(true, |s| !removed.contains(&s.hash_key()))
        })
        .cloned()
        .collect();
    Ok(Node::Sequence(items))
}

fn element_kind(path: &FieldPath, side: &str, items: &[Node]) -> MergeResult<Option<NodeType>> {
    let mut kinds = items.iter().map(Node::node_type);
    let Some(first) = kinds.next() else {
        return Ok(None);
    };
    if let Some(other) = kinds.find(|kind| *kind != first) {
        return Err(MergeError::ElementTypeMismatch {
            path: display_path(path),
            reason: format!("{side} sequence mixes {first} and {other} elements"),
        });
    }
    Ok(Some(first))
}

fn stub(merge_key: &str, value: &HashKey) -> Node {
    let mut map = MapNode::with_capacity(1);
    map.insert(merge_key, Node::Scalar(value.to_scalar()));
    Node::Map(map)
}
