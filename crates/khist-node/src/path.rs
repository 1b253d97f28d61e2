//! Field paths.
//!
//! A path is a list of map keys rendered with `.` separators. A literal dot
//! inside a key is written `\.` and a literal backslash `\\`, so keys such as
//! `app.kubernetes.io/name` survive the round trip:
//!
//! ```
//! use khist_node::FieldPath;
//!
//! let path = FieldPath::parse(r"metadata.labels.app\.kubernetes\.io/name").unwrap();
//! assert_eq!(path.segments(), ["metadata", "labels", "app.kubernetes.io/name"]);
//! assert_eq!(path.to_string(), r"metadata.labels.app\.kubernetes\.io/name");
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{NodeError, NodeResult};

/// An owned, dot-separated field path. The empty path is the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse the escaped textual form.
    ///
    /// Fails on empty segments (`a..b`, leading or trailing dots) and on a
    /// dangling or unknown escape.
    pub fn parse(text: &str) -> NodeResult<Self> {
        if text.is_empty() {
            return Ok(Self::root());
        }

        let invalid = |reason: &str| NodeError::InvalidPath {
            path: text.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = text.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => match chars.next() {
                    Some(escaped @ ('.' | '\\')) => current.push(escaped),
                    Some(other) => {
                        return Err(invalid(&format!("unknown escape '\\{other}'")));
                    }
                    None => return Err(invalid("dangling escape at end of path")),
                },
                '.' => {
                    if current.is_empty() {
                        return Err(invalid("empty path segment"));
                    }
                    segments.push(std::mem::take(&mut current));
                }
                other => current.push(other),
            }
        }
        if current.is_empty() {
            return Err(invalid("empty path segment"));
        }
        segments.push(current);

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// A new path with `key` appended.
    pub fn child(&self, key: &str) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push(key.to_string());
        Self { segments }
    }

    /// The enclosing path, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            for ch in segment.chars() {
                match ch {
                    '.' => f.write_str("\\.")?,
                    '\\' => f.write_str("\\\\")?,
                    other => write!(f, "{other}")?,
                }
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple() {
        let path = FieldPath::parse("spec.template.spec").unwrap();
        assert_eq!(path.segments(), ["spec", "template", "spec"]);
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn empty_is_root() {
        let path = FieldPath::parse("").unwrap();
        assert!(path.is_root());
        assert_eq!(path.to_string(), "");
    }

    #[test]
    fn escaped_dots_and_backslashes() {
        let path = FieldPath::parse(r"a\.b.c\\d").unwrap();
        assert_eq!(path.segments(), ["a.b", r"c\d"]);
        assert_eq!(path.to_string(), r"a\.b.c\\d");
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse(".a").is_err());
        assert!(FieldPath::parse("a.").is_err());
    }

    #[test]
    fn rejects_bad_escapes() {
        assert!(FieldPath::parse(r"a\").is_err());
        assert!(FieldPath::parse(r"a\x").is_err());
    }

    #[test]
    fn child_and_parent() {
        let path = FieldPath::root().child("spec").child("containers");
        assert_eq!(path.to_string(), "spec.containers");
        assert_eq!(path.last(), Some("containers"));
        assert_eq!(path.parent().unwrap().to_string(), "spec");
        assert_eq!(FieldPath::root().parent(), None);
    }

    #[test]
    fn display_round_trip_with_dotted_key() {
        let path = FieldPath::from_segments(["metadata", "annotations", "a.b/c"]);
        let reparsed: FieldPath = path.to_string().parse().unwrap();
        assert_eq!(reparsed, path);
    }
}
