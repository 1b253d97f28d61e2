//! Order reconciliation for lists of maps merged by key.
//!
//! [`plan`] decides which elements survive and in what order; it does not
//! merge element contents. Each [`Slot`] of the plan says where the element's
//! data comes from, and the engine materialises it.
//!
//! Ordering rules:
//! 1. Deletions first. A key named in `$deleteFromPrimitiveList` or carried by
//!    a `$patch: delete` element is dropped everywhere.
//! 2. Previous elements whose key is neither in the patch nor in the
//!    `$setElementOrder` list are *live-only*. They are emitted first, in
//!    previous order.
//! 3. All remaining keys form the main block, sorted by a priority
//!    comparator: directive index, else patch index, else previous index,
//!    else previous keys before new ones.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use khist_node::{FieldPath, HashKey, Node};
use tracing::trace;

use crate::directive::{element_patch_directive, is_list_marker, PatchDirective, Scope};
use crate::error::{display_path, MergeError, MergeResult};

/// Source of one output element.
#[derive(Clone, Debug, PartialEq)]
pub enum Slot<'a> {
    /// Present on both sides; merge the pair.
    Both { prev: &'a Node, patch: &'a Node },
    PrevOnly(&'a Node),
    PatchOnly(&'a Node),
    /// Named only by `$setElementOrder`; becomes `{merge_key: value}`.
    Stub(HashKey),
}

/// Merge-key value of a list element.
pub fn element_key(path: &FieldPath, merge_key: &str, element: &Node) -> MergeResult<HashKey> {
    let map = element.as_map().ok_or_else(|| MergeError::ElementTypeMismatch {
        path: display_path(path),
        reason: format!("expected map elements, found {}", element.describe()),
    })?;
    let value = map.get(merge_key).ok_or_else(|| MergeError::MissingMergeKey {
        path: display_path(path),
        key: merge_key.to_string(),
    })?;
    value
        .as_scalar()
        .and_then(|s| s.merge_key())
        .ok_or_else(|| MergeError::NotHashable {
            path: display_path(path),
            key: merge_key.to_string(),
            actual: value.describe(),
        })
}

/// Key named by a directive item: either the bare value or a map carrying
/// the merge key.
fn directive_key(path: &FieldPath, merge_key: &str, item: &Node) -> MergeResult<HashKey> {
    match item {
        Node::Scalar(scalar) => scalar.merge_key().ok_or_else(|| MergeError::NotHashable {
            path: display_path(path),
            key: merge_key.to_string(),
            actual: item.describe(),
        }),
        Node::Map(_) => element_key(path, merge_key, item),
        Node::Sequence(_) => Err(MergeError::NotHashable {
            path: display_path(path),
            key: merge_key.to_string(),
            actual: item.describe(),
        }),
    }
}

/// Compute the output plan for a list of maps merged on `merge_key`.
///
/// List markers in `patch` (`{$patch: replace}`, `{$patch: merge}`) are
/// skipped; acting on them is the caller's job.
pub fn plan<'a>(
    path: &FieldPath,
    merge_key: &str,
    prev: &'a [Node],
    patch: &'a [Node],
    scope: Scope<'a>,
) -> MergeResult<Vec<Slot<'a>>> {
    let mut deleted: HashSet<HashKey> = HashSet::new();
    for item in scope.delete_from_primitive_list.unwrap_or(&[]) {
        deleted.insert(directive_key(path, merge_key, item)?);
    }

    // Previous elements, first occurrence wins.
    let mut prev_keys: Vec<HashKey> = Vec::with_capacity(prev.len());
    let mut prev_data: HashMap<HashKey, &'a Node> = HashMap::with_capacity(prev.len());
    for element in prev {
        let key = element_key(path, merge_key, element)?;
        if prev_data.contains_key(&key) {
            trace!(path = %path, key = %key, "duplicate merge key in previous list");
            continue;
        }
        prev_data.insert(key.clone(), element);
        prev_keys.push(key);
    }

    // Patch elements: a repeated key keeps its first position, later data wins.
    let mut patch_keys: Vec<HashKey> = Vec::with_capacity(patch.len());
    let mut patch_data: HashMap<HashKey, &'a Node> = HashMap::with_capacity(patch.len());
    for element in patch.iter().filter(|e| !is_list_marker(e)) {
        let key = element_key(path, merge_key, element)?;
        if element_patch_directive(element) == Some(PatchDirective::Delete) {
            deleted.insert(key);
            continue;
        }
        if patch_data.insert(key.clone(), element).is_none() {
            patch_keys.push(key);
        }
    }

    let mut order_keys: Vec<HashKey> = Vec::new();
    for item in scope.set_element_order.unwrap_or(&[]) {
        let key = directive_key(path, merge_key, item)?;
        if !order_keys.contains(&key) {
            order_keys.push(key);
        }
    }

    prev_keys.retain(|k| !deleted.contains(k));
    patch_keys.retain(|k| !deleted.contains(k));
    order_keys.retain(|k| !deleted.contains(k));

    let order_index = index_of(&order_keys);
    let patch_index = index_of(&patch_keys);

    let (live, live_only): (Vec<HashKey>, Vec<HashKey>) = prev_keys
        .into_iter()
        .partition(|k| patch_index.contains_key(k) || order_index.contains_key(k));
    let live_index = index_of(&live);

    let mut main: Vec<HashKey> = live;
    for key in patch_keys.iter().chain(&order_keys) {
        if !live_index.contains_key(key) && !main.contains(key) {
            main.push(key.clone());
        }
    }

    let compare = |a: &HashKey, b: &HashKey| -> Ordering {
        if let (Some(x), Some(y)) = (order_index.get(a), order_index.get(b)) {
            return x.cmp(y);
        }
        if let (Some(x), Some(y)) = (patch_index.get(a), patch_index.get(b)) {
            return x.cmp(y);
        }
        match (live_index.get(a), live_index.get(b)) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    };
    stable_sort_by(&mut main, compare);
    rank_directive_keys(&mut main, &order_index);

    trace!(
        path = %path,
        live_only = live_only.len(),
        main = main.len(),
        deleted = deleted.len(),
        "reconciled merge-key list"
    );

    let slots = live_only
        .into_iter()
        .chain(main)
        .map(|key| match (prev_data.get(&key), patch_data.get(&key)) {
            (Some(&prev), Some(&patch)) => Slot::Both { prev, patch },
            (Some(&prev), None) => Slot::PrevOnly(prev),
            (None, Some(&patch)) => Slot::PatchOnly(patch),
            (None, None) => Slot::Stub(key),
        })
        .collect();
    Ok(slots)
}

/// Rewrite the positions held by directive-named keys so those keys follow
/// directive order. The insertion sort only compares neighbours, so two
/// directive keys separated by an unranked key may otherwise stay inverted.
fn rank_directive_keys(main: &mut [HashKey], order_index: &HashMap<HashKey, usize>) {
    let positions: Vec<usize> = main
        .iter()
        .enumerate()
        .filter(|(_, k)| order_index.contains_key(*k))
        .map(|(i, _)| i)
        .collect();
    let mut ranked: Vec<HashKey> = positions.iter().map(|&i| main[i].clone()).collect();
    ranked.sort_by_key(|k| order_index.get(k).copied().unwrap_or(usize::MAX));
    for (slot, key) in positions.into_iter().zip(ranked) {
        main[slot] = key;
    }
}

fn index_of(keys: &[HashKey]) -> HashMap<HashKey, usize> {
    keys.iter()
        .enumerate()
        .map(|(i, k)| (k.clone(), i))
        .collect()
}

/// Insertion sort. The comparator need not be a total order; the sort still
/// terminates, keeps equal elements in place, and never panics.
fn stable_sort_by<T>(items: &mut [T], mut compare: impl FnMut(&T, &T) -> Ordering) {
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && compare(&items[j - 1], &items[j]) == Ordering::Greater {
            items.swap(j - 1, j);
            j -= 1;
        }
    }
}
