//! Directive processing.
//!
//! A patch map may carry reserved keys that steer the merge instead of
//! contributing data:
//!
//! | Key                               | Value                | Effect                              |
//! |-----------------------------------|----------------------|-------------------------------------|
//! | `$patch`                          | `replace`/`delete`/`merge` | Replace or delete this map     |
//! | `$retainKeys`                     | list of strings      | Keep only these keys in the result  |
//! | `$deleteFromPrimitiveList/<f>`    | list                 | Remove values from list field `f`   |
//! | `$setElementOrder/<f>`            | list                 | Final order of list field `f`       |
//!
//! [`PatchLevel::extract`] splits a patch map into its data entries and a
//! [`Directives`] value. Nothing is cloned; both borrow from the patch.

use khist_node::{FieldPath, MapNode, Node};

use crate::error::{display_path, MergeError, MergeResult};

pub const PATCH: &str = "$patch";
pub const RETAIN_KEYS: &str = "$retainKeys";
pub const DELETE_FROM_PRIMITIVE_LIST: &str = "$deleteFromPrimitiveList/";
pub const SET_ELEMENT_ORDER: &str = "$setElementOrder/";

/// Decoded `$patch` value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchDirective {
    Replace,
    Delete,
    Merge,
}

impl PatchDirective {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "replace" => Some(PatchDirective::Replace),
            "delete" => Some(PatchDirective::Delete),
            "merge" => Some(PatchDirective::Merge),
            _ => None,
        }
    }
}

/// Directives found at one patch level.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Directives<'a> {
    pub patch: Option<PatchDirective>,
    pub retain_keys: Option<Vec<&'a str>>,
    /// `(field, values)` in patch order.
    pub delete_from_primitive_list: Vec<(&'a str, &'a [Node])>,
    /// `(field, order)` in patch order.
    pub set_element_order: Vec<(&'a str, &'a [Node])>,
}

impl<'a> Directives<'a> {
    pub fn is_empty(&self) -> bool {
        self.patch.is_none()
            && self.retain_keys.is_none()
            && self.delete_from_primitive_list.is_empty()
            && self.set_element_order.is_empty()
    }

    pub fn is_delete(&self) -> bool {
        self.patch == Some(PatchDirective::Delete)
    }

    pub fn is_replace(&self) -> bool {
        self.patch == Some(PatchDirective::Replace)
    }

    /// The list directives aimed at child field `field`.
    pub fn scope_for(&self, field: &str) -> Scope<'a> {
        Scope {
            delete_from_primitive_list: lookup(&self.delete_from_primitive_list, field),
            set_element_order: lookup(&self.set_element_order, field),
        }
    }

    /// Fields named by `$setElementOrder`, in directive order.
    pub fn ordered_fields(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.set_element_order.iter().map(|(field, _)| *field)
    }
}

fn lookup<'a>(entries: &[(&'a str, &'a [Node])], field: &str) -> Option<&'a [Node]> {
    entries
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, values)| *values)
}

/// List directives forwarded from a parent map to one child field.
///
/// A scope is created fresh for every child; siblings never see each
/// other's directives.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Scope<'a> {
    pub delete_from_primitive_list: Option<&'a [Node]>,
    pub set_element_order: Option<&'a [Node]>,
}

impl Scope<'_> {
    pub fn is_empty(&self) -> bool {
        self.delete_from_primitive_list.is_none() && self.set_element_order.is_none()
    }
}

/// A patch map split into data and directives.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatchLevel<'a> {
    pub entries: Vec<(&'a str, &'a Node)>,
    pub directives: Directives<'a>,
}

impl<'a> PatchLevel<'a> {
    /// Split `patch` at `path`, validating directive payloads.
    pub fn extract(path: &FieldPath, patch: &'a MapNode) -> MergeResult<Self> {
        let mut level = PatchLevel {
            entries: Vec::with_capacity(patch.len()),
            directives: Directives::default(),
        };

        for (key, value) in patch.iter() {
            if key == PATCH {
                let text = value.as_str().ok_or_else(|| invalid(path, key, "string", value))?;
                let directive =
                    PatchDirective::parse(text).ok_or_else(|| MergeError::UnknownPatchDirective {
                        path: display_path(path),
                        value: text.to_string(),
                    })?;
                level.directives.patch = Some(directive);
            } else if key == RETAIN_KEYS {
                let items = sequence(path, key, value, "sequence of strings")?;
                let names = items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .ok_or_else(|| invalid(path, key, "sequence of strings", item))
                    })
                    .collect::<MergeResult<Vec<_>>>()?;
                level.directives.retain_keys = Some(names);
            } else if let Some(field) = key.strip_prefix(DELETE_FROM_PRIMITIVE_LIST) {
                let field = field_name(path, key, field)?;
                let items = sequence(path, key, value, "sequence")?;
                level.directives.delete_from_primitive_list.push((field, items));
            } else if let Some(field) = key.strip_prefix(SET_ELEMENT_ORDER) {
                let field = field_name(path, key, field)?;
                let items = sequence(path, key, value, "sequence")?;
                level.directives.set_element_order.push((field, items));
            } else {
                level.entries.push((key, value));
            }
        }

        Ok(level)
    }

    pub fn get(&self, key: &str) -> Option<&'a Node> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }
}

/// `$patch` value of a map element without validating the rest of it.
/// Used by list handling to spot `{$patch: replace}` markers and
/// `$patch: delete` elements.
pub fn element_patch_directive(element: &Node) -> Option<PatchDirective> {
    element
        .get(PATCH)
        .and_then(Node::as_str)
        .and_then(PatchDirective::parse)
}

/// Whether `element` is a bare list marker: a map whose only key is
/// `$patch` set to `replace` or `merge`.
pub fn is_list_marker(element: &Node) -> bool {
    match element.as_map() {
        Some(map) if map.len() == 1 => matches!(
            element_patch_directive(element),
            Some(PatchDirective::Replace | PatchDirective::Merge)
        ),
        _ => false,
    }
}

fn sequence<'a>(
    path: &FieldPath,
    directive: &str,
    value: &'a Node,
    expected: &'static str,
) -> MergeResult<&'a [Node]> {
    value
        .as_sequence()
        .ok_or_else(|| invalid(path, directive, expected, value))
}

fn field_name<'a>(path: &FieldPath, directive: &str, field: &'a str) -> MergeResult<&'a str> {
    if field.is_empty() {
        return Err(MergeError::InvalidDirective {
            path: display_path(path),
            directive: directive.to_string(),
            expected: "a field name after the slash",
            actual: "nothing".to_string(),
        });
    }
    Ok(field)
}

fn invalid(path: &FieldPath, directive: &str, expected: &'static str, actual: &Node) -> MergeError {
    MergeError::InvalidDirective {
        path: display_path(path),
        directive: directive.to_string(),
        expected,
        actual: actual.describe(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use khist_codec::from_yaml_str;

    fn map(yaml: &str) -> MapNode {
        match from_yaml_str(yaml).unwrap() {
            Node::Map(map) => map,
            other => panic!("expected a map, got {}", other.describe()),
        }
    }

    #[test]
    fn splits_data_from_directives() {
        let patch = map(
            "name: web\n$patch: replace\n$retainKeys: [name, image]\n$deleteFromPrimitiveList/args: [--a]\n$setElementOrder/ports: [{containerPort: 80}]\nimage: nginx\n",
        );
        let level = PatchLevel::extract(&FieldPath::root(), &patch).unwrap();

        assert_eq!(level.keys().collect::<Vec<_>>(), vec!["name", "image"]);
        assert!(level.directives.is_replace());
        assert_eq!(level.directives.retain_keys, Some(vec!["name", "image"]));

        let args = level.directives.scope_for("args");
        assert_eq!(args.delete_from_primitive_list.map(<[Node]>::len), Some(1));
        assert!(args.set_element_order.is_none());

        let ports = level.directives.scope_for("ports");
        assert!(ports.set_element_order.is_some());
        assert!(level.directives.scope_for("image").is_empty());
        assert_eq!(level.directives.ordered_fields().collect::<Vec<_>>(), vec!["ports"]);
    }

    #[test]
    fn plain_map_has_no_directives() {
        let patch = map("a: 1\nb: 2\n");
        let level = PatchLevel::extract(&FieldPath::root(), &patch).unwrap();
        assert!(level.directives.is_empty());
        assert_eq!(level.entries.len(), 2);
    }

    #[test]
    fn unknown_patch_value() {
        let patch = map("$patch: squash\n");
        let path = FieldPath::parse("spec.template").unwrap();
        assert_eq!(
            PatchLevel::extract(&path, &patch),
            Err(MergeError::UnknownPatchDirective {
                path: "spec.template".into(),
                value: "squash".into(),
            })
        );
    }

    #[test]
    fn wrong_payload_types() {
        let err = PatchLevel::extract(&FieldPath::root(), &map("$retainKeys: name\n")).unwrap_err();
        assert!(matches!(
            err,
            MergeError::InvalidDirective { ref directive, expected: "sequence of strings", .. }
                if directive == "$retainKeys"
        ));

        let err = PatchLevel::extract(&FieldPath::root(), &map("$retainKeys: [1]\n")).unwrap_err();
        assert!(matches!(err, MergeError::InvalidDirective { .. }));

        let err = PatchLevel::extract(&FieldPath::root(), &map("$patch: [delete]\n")).unwrap_err();
        assert!(matches!(err, MergeError::InvalidDirective { expected: "string", .. }));

        let err =
            PatchLevel::extract(&FieldPath::root(), &map("$setElementOrder/foo: {a: 1}\n"))
                .unwrap_err();
        assert!(matches!(err, MergeError::InvalidDirective { expected: "sequence", .. }));

        let err = PatchLevel::extract(&FieldPath::root(), &map("$setElementOrder/: []\n"))
            .unwrap_err();
        assert!(matches!(err, MergeError::InvalidDirective { .. }));
    }

    #[test]
    fn other_dollar_keys_are_data() {
        let patch = map("$schema: x\n");
        let level = PatchLevel::extract(&FieldPath::root(), &patch).unwrap();
        assert_eq!(level.get("$schema"), Some(&Node::from("x")));
    }

    #[test]
    fn list_markers() {
        assert!(is_list_marker(&Node::Map(map("$patch: replace\n"))));
        assert!(is_list_marker(&Node::Map(map("$patch: merge\n"))));
        assert!(!is_list_marker(&Node::Map(map("$patch: delete\n"))));
        assert!(!is_list_marker(&Node::Map(map("$patch: replace\nname: a\n"))));
        assert_eq!(
            element_patch_directive(&Node::Map(map("name: a\n$patch: delete\n"))),
            Some(PatchDirective::Delete)
        );
    }
}
