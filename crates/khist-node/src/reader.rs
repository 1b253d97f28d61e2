//! Path-based navigation and typed reads over a [`Node`].
//!
//! Paths use the [`FieldPath`] syntax. When navigating into a sequence the
//! segment must be a zero-based index:
//!
//! ```
//! use khist_node::{MapNode, Node, Reader};
//!
//! let mut container = MapNode::new();
//! container.insert("name", Node::from("app"));
//! let mut spec = MapNode::new();
//! spec.insert("containers", Node::Sequence(vec![Node::Map(container)]));
//! let mut root = MapNode::new();
//! root.insert("spec", Node::Map(spec));
//! let root = Node::Map(root);
//!
//! let reader = Reader::new(&root);
//! assert_eq!(reader.read_string("spec.containers.0.name").unwrap(), "app");
//! assert_eq!(reader.read_int_or_default("spec.replicas", 1), 1);
//! ```

use chrono::{DateTime, FixedOffset};

use crate::error::{NodeError, NodeResult};
use crate::node::{Node, Scalar};
use crate::path::FieldPath;

/// Read-only view over a node tree.
#[derive(Clone, Copy, Debug)]
pub struct Reader<'a> {
    root: &'a Node,
}

impl<'a> Reader<'a> {
    pub fn new(root: &'a Node) -> Self {
        Self { root }
    }

    pub fn node(&self) -> &'a Node {
        self.root
    }

    /// Resolve a textual path.
    pub fn get(&self, path: &str) -> NodeResult<&'a Node> {
        let parsed = FieldPath::parse(path)?;
        self.get_path(&parsed)
    }

    /// Resolve a parsed path.
    pub fn get_path(&self, path: &FieldPath) -> NodeResult<&'a Node> {
        let mut current = self.root;
        for (depth, segment) in path.segments().iter().enumerate() {
            let next = match current {
                Node::Map(map) => map.get(segment),
                Node::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                Node::Scalar(_) => None,
            };
            current = next.ok_or_else(|| NodeError::FieldNotFound {
                path: FieldPath::from_segments(path.segments()[..=depth].iter().cloned())
                    .to_string(),
            })?;
        }
        Ok(current)
    }

    /// Whether `path` resolves to a node.
    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    /// A reader rooted at `path`.
    pub fn sub(&self, path: &str) -> NodeResult<Reader<'a>> {
        Ok(Reader::new(self.get(path)?))
    }

    fn scalar(&self, path: &str, expected: &'static str) -> NodeResult<&'a Scalar> {
        let node = self.get(path)?;
        node.as_scalar().ok_or_else(|| NodeError::TypeMismatch {
            path: path.to_string(),
            expected,
            actual: node.describe(),
        })
    }

    fn mismatch(path: &str, expected: &'static str, actual: &Scalar) -> NodeError {
        NodeError::TypeMismatch {
            path: path.to_string(),
            expected,
            actual: actual.type_name().to_string(),
        }
    }

    pub fn read_bool(&self, path: &str) -> NodeResult<bool> {
        match self.scalar(path, "bool")? {
            Scalar::Bool(b) => Ok(*b),
            other => Err(Self::mismatch(path, "bool", other)),
        }
    }

    pub fn read_int(&self, path: &str) -> NodeResult<i64> {
        match self.scalar(path, "int")? {
            Scalar::Int(i) => Ok(*i),
            other => Err(Self::mismatch(path, "int", other)),
        }
    }

    /// Integers widen to floats.
    pub fn read_float(&self, path: &str) -> NodeResult<f64> {
        match self.scalar(path, "float")? {
            Scalar::Float(f) => Ok(*f),
            Scalar::Int(i) => Ok(*i as f64),
            other => Err(Self::mismatch(path, "float", other)),
        }
    }

    pub fn read_string(&self, path: &str) -> NodeResult<&'a str> {
        match self.scalar(path, "string")? {
            Scalar::String(s) => Ok(s),
            other => Err(Self::mismatch(path, "string", other)),
        }
    }

    /// Accepts timestamp scalars and RFC 3339 strings (JSON has no
    /// timestamp type, so manifests decoded from JSON carry strings).
    pub fn read_timestamp(&self, path: &str) -> NodeResult<DateTime<FixedOffset>> {
        match self.scalar(path, "timestamp")? {
            Scalar::Timestamp(ts) => Ok(*ts),
            Scalar::String(s) => {
                DateTime::parse_from_rfc3339(s).map_err(|_| NodeError::TypeMismatch {
                    path: path.to_string(),
                    expected: "timestamp",
                    actual: "string".into(),
                })
            }
            other => Err(Self::mismatch(path, "timestamp", other)),
        }
    }

    pub fn read_bool_or_default(&self, path: &str, default: bool) -> bool {
        self.read_bool(path).unwrap_or(default)
    }

    pub fn read_int_or_default(&self, path: &str, default: i64) -> i64 {
        self.read_int(path).unwrap_or(default)
    }

    pub fn read_float_or_default(&self, path: &str, default: f64) -> f64 {
        self.read_float(path).unwrap_or(default)
    }

    pub fn read_string_or_default(&self, path: &str, default: &'a str) -> &'a str {
        self.read_string(path).unwrap_or(default)
    }

    pub fn read_timestamp_or_default(
        &self,
        path: &str,
        default: DateTime<FixedOffset>,
    ) -> DateTime<FixedOffset> {
        self.read_timestamp(path).unwrap_or(default)
    }
}
