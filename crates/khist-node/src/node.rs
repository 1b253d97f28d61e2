//! The ordered tree value.
//!
//! A [`Node`] is one of three kinds:
//! - **Scalar**: a leaf value ([`Scalar`])
//! - **Sequence**: an ordered list of child nodes
//! - **Map**: an ordered list of `(key, node)` entries ([`MapNode`])
//!
//! # Invariants
//!
//! - Map keys are unique within a map.
//! - Map insertion order is significant and is preserved by every operation
//!   in this crate (and by merge and serialization above it).
//! - A node owns its children. Two trees can never share a subtree instance;
//!   `Clone` is always deep.

use std::fmt;

use chrono::{DateTime, FixedOffset, SecondsFormat};

use crate::error::{NodeError, NodeResult};
use crate::hash::HashKey;

/// The kind of a [`Node`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeType {
    Scalar,
    Sequence,
    Map,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Scalar => "scalar",
            NodeType::Sequence => "sequence",
            NodeType::Map => "map",
        };
        f.write_str(name)
    }
}

/// A leaf value.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<FixedOffset>),
}

impl Scalar {
    /// Short lowercase name of the scalar's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::String(_) => "string",
            Scalar::Timestamp(_) => "timestamp",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    /// Value-hash of this scalar. Every scalar is hashable by value.
    pub fn hash_key(&self) -> HashKey {
        HashKey::from_scalar(self)
    }

    /// Hash usable as an array merge key. Only strings, integers and
    /// booleans qualify.
    pub fn merge_key(&self) -> Option<HashKey> {
        match self {
            Scalar::String(_) | Scalar::Int(_) | Scalar::Bool(_) => Some(self.hash_key()),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::String(s) => f.write_str(s),
            Scalar::Timestamp(ts) => f.write_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }
}

/// An ordered association list with unique string keys.
///
/// Lookups are linear; maps in manifests are small and order matters more
/// than lookup speed. Callers that look up many keys should build their own
/// index over [`MapNode::keys`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapNode {
    entries: Vec<(String, Node)>,
}

impl MapNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Position of `key` in insertion order.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Insert or replace an entry.
    ///
    /// A new key is appended; an existing key keeps its position and the
    /// previous value is returned.
    pub fn insert(&mut self, key: impl Into<String>, value: Node) -> Option<Node> {
        let key = key.into();
        match self.position(&key) {
            Some(idx) => Some(std::mem::replace(&mut self.entries[idx].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Node> {
        let idx = self.position(key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Keep only the entries for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Node) -> bool) {
        self.entries.retain(|(k, v)| keep(k, v));
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Node> + '_ {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Node)> for MapNode {
    /// Later duplicates overwrite earlier values but keep the first position.
    fn from_iter<I: IntoIterator<Item = (String, Node)>>(iter: I) -> Self {
        let mut map = MapNode::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for MapNode {
    type Item = (String, Node);
    type IntoIter = std::vec::IntoIter<(String, Node)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Identifies a child within its parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildKey<'a> {
    /// Zero-based position inside a sequence.
    Index(usize),
    /// Key inside a map.
    Key(&'a str),
}

impl fmt::Display for ChildKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildKey::Index(i) => write!(f, "{i}"),
            ChildKey::Key(k) => f.write_str(k),
        }
    }
}

/// Iterator over the ordered children of a node.
pub struct Children<'a> {
    inner: ChildrenInner<'a>,
}

enum ChildrenInner<'a> {
    Empty,
    Sequence(std::iter::Enumerate<std::slice::Iter<'a, Node>>),
    Map(std::slice::Iter<'a, (String, Node)>),
}

impl<'a> Iterator for Children<'a> {
    type Item = (ChildKey<'a>, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            ChildrenInner::Empty => None,
            ChildrenInner::Sequence(it) => it.next().map(|(i, n)| (ChildKey::Index(i), n)),
            ChildrenInner::Map(it) => it.next().map(|(k, n)| (ChildKey::Key(k.as_str()), n)),
        }
    }
}

/// An ordered, semi-structured tree value.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Scalar(Scalar),
    Sequence(Vec<Node>),
    Map(MapNode),
}

impl Node {
    pub fn null() -> Self {
        Node::Scalar(Scalar::Null)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Node::Scalar(Scalar::String(value.into()))
    }

    pub fn empty_map() -> Self {
        Node::Map(MapNode::new())
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Scalar(_) => NodeType::Scalar,
            Node::Sequence(_) => NodeType::Sequence,
            Node::Map(_) => NodeType::Map,
        }
    }

    /// Number of direct children. Scalars have none.
    pub fn len(&self) -> usize {
        match self {
            Node::Scalar(_) => 0,
            Node::Sequence(items) => items.len(),
            Node::Map(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordered children: indices for sequences, keys for maps.
    pub fn children(&self) -> Children<'_> {
        let inner = match self {
            Node::Scalar(_) => ChildrenInner::Empty,
            Node::Sequence(items) => ChildrenInner::Sequence(items.iter().enumerate()),
            Node::Map(map) => ChildrenInner::Map(map.entries.iter()),
        };
        Children { inner }
    }

    /// The scalar value, or [`NodeError::NotScalar`] for maps and sequences.
    pub fn scalar_value(&self) -> NodeResult<&Scalar> {
        match self {
            Node::Scalar(s) => Ok(s),
            other => Err(NodeError::NotScalar {
                actual: other.node_type(),
            }),
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapNode> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Scalar(Scalar::Null))
    }

    /// Map lookup; `None` for non-maps.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Human-readable type description: the scalar type for scalars,
    /// otherwise the node kind.
    pub fn describe(&self) -> String {
        match self {
            Node::Scalar(s) => s.type_name().to_string(),
            other => other.node_type().to_string(),
        }
    }

    /// Visit this node and every descendant in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        visit(self);
        for (_, child) in self.children() {
            child.walk(visit);
        }
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn size(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }
}

impl From<Scalar> for Node {
    fn from(value: Scalar) -> Self {
        Node::Scalar(value)
    }
}

impl From<MapNode> for Node {
    fn from(value: MapNode) -> Self {
        Node::Map(value)
    }
}

impl From<Vec<Node>> for Node {
    fn from(value: Vec<Node>) -> Self {
        Node::Sequence(value)
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Scalar(Scalar::Bool(value))
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Scalar(Scalar::Int(value))
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Node::Scalar(Scalar::Float(value))
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::string(value)
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::string(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Node {
        let mut inner = MapNode::new();
        inner.insert("quux", Node::from(42i64));
        let mut root = MapNode::new();
        root.insert("foo", Node::from("bar"));
        root.insert("qux", Node::Map(inner));
        root.insert(
            "list",
            Node::Sequence(vec![Node::from(1i64), Node::from(2i64)]),
        );
        Node::Map(root)
    }

    #[test]
    fn map_preserves_insertion_order() {
        let mut map = MapNode::new();
        map.insert("zeta", Node::null());
        map.insert("alpha", Node::null());
        map.insert("mid", Node::null());
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn insert_existing_key_keeps_position() {
        let mut map = MapNode::new();
        map.insert("a", Node::from(1i64));
        map.insert("b", Node::from(2i64));
        let old = map.insert("a", Node::from(3i64));
        assert_eq!(old, Some(Node::from(1i64)));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map.get("a"), Some(&Node::from(3i64)));
    }

    #[test]
    fn remove_and_retain() {
        let mut map: MapNode = vec![
            ("a".to_string(), Node::from(1i64)),
            ("b".to_string(), Node::from(2i64)),
            ("c".to_string(), Node::from(3i64)),
        ]
        .into_iter()
        .collect();
        assert_eq!(map.remove("b"), Some(Node::from(2i64)));
        assert_eq!(map.remove("b"), None);
        map.retain(|k, _| k != "c");
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn node_type_and_len() {
        let node = sample();
        assert_eq!(node.node_type(), NodeType::Map);
        assert_eq!(node.len(), 3);
        assert_eq!(Node::from("x").len(), 0);
        assert_eq!(Node::Sequence(vec![Node::null()]).node_type(), NodeType::Sequence);
    }

    #[test]
    fn children_report_keys_and_indices() {
        let node = sample();
        let keys: Vec<String> = node.children().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["foo", "qux", "list"]);

        let list = node.get("list").unwrap();
        let idx: Vec<ChildKey<'_>> = list.children().map(|(k, _)| k).collect();
        assert_eq!(idx, vec![ChildKey::Index(0), ChildKey::Index(1)]);
        assert_eq!(Node::null().children().count(), 0);
    }

    #[test]
    fn scalar_value_rejects_containers() {
        let node = sample();
        assert_eq!(
            node.scalar_value(),
            Err(NodeError::NotScalar {
                actual: NodeType::Map
            })
        );
        assert_eq!(
            node.get("foo").unwrap().scalar_value(),
            Ok(&Scalar::String("bar".into()))
        );
    }

    #[test]
    fn clone_is_deep() {
        let node = sample();
        let copy = node.clone();
        assert_eq!(node, copy);

        let mut originals = Vec::new();
        node.walk(&mut |n| originals.push(n as *const Node));
        let mut copies = Vec::new();
        copy.walk(&mut |n| copies.push(n as *const Node));
        assert!(copies.iter().all(|p| !originals.contains(p)));
    }

    #[test]
    fn size_counts_all_nodes() {
        assert_eq!(sample().size(), 7);
    }

    #[test]
    fn merge_key_only_for_string_int_bool() {
        assert!(Scalar::String("a".into()).merge_key().is_some());
        assert!(Scalar::Int(1).merge_key().is_some());
        assert!(Scalar::Bool(true).merge_key().is_some());
        assert!(Scalar::Float(1.5).merge_key().is_none());
        assert!(Scalar::Null.merge_key().is_none());
    }

    #[test]
    fn scalar_display() {
        let ts = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z").unwrap();
        assert_eq!(Scalar::Timestamp(ts).to_string(), "2024-03-01T10:00:00Z");
        assert_eq!(Scalar::Null.to_string(), "null");
        assert_eq!(Scalar::Bool(false).to_string(), "false");
    }
}
