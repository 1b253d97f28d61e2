//! Line diffs between manifest revisions.
//!
//! Both sides are rendered as YAML and compared with the `similar` crate
//! (Myers), grouped into hunks with three lines of context.

use similar::{Change, ChangeTag, DiffOp, DiffTag, TextDiff};

use khist_codec::to_yaml_string;
use khist_node::Node;

use crate::error::TimelineResult;
use crate::replay::ManifestRevision;

const CONTEXT_LINES: usize = 3;

/// The result of diffing two manifests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionDiff {
    pub hunks: Vec<DiffHunk>,
    pub old_lines: usize,
    pub new_lines: usize,
}

impl RevisionDiff {
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn additions(&self) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| &h.lines)
            .filter(|l| matches!(l, DiffLine::Added(_)))
            .count()
    }

    pub fn deletions(&self) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| &h.lines)
            .filter(|l| matches!(l, DiffLine::Removed(_)))
            .count()
    }
}

/// A contiguous region of changes. Starts are 1-based.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffHunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<DiffLine>,
}

impl DiffHunk {
    /// Unified-diff style header, e.g. `@@ -3,4 +3,5 @@`.
    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffLine {
    Context(String),
    Added(String),
    Removed(String),
}

/// Diff two manifests. An absent manifest renders as no lines.
pub fn diff_manifests(old: Option<&Node>, new: Option<&Node>) -> TimelineResult<RevisionDiff> {
    let old_text = render(old)?;
    let new_text = render(new)?;
    Ok(diff_text(&old_text, &new_text))
}

pub fn diff_revisions(
    old: &ManifestRevision,
    new: &ManifestRevision,
) -> TimelineResult<RevisionDiff> {
    if old.digest == new.digest {
        let lines = render(new.manifest.as_ref())?.lines().count();
        return Ok(RevisionDiff {
            hunks: Vec::new(),
            old_lines: lines,
            new_lines: lines,
        });
    }
    diff_manifests(old.manifest.as_ref(), new.manifest.as_ref())
}

fn render(manifest: Option<&Node>) -> TimelineResult<String> {
    Ok(match manifest {
        Some(node) => to_yaml_string(node)?,
        None => String::new(),
    })
}

fn diff_text(old: &str, new: &str) -> RevisionDiff {
    let text_diff = TextDiff::from_lines(old, new);
    let hunks = text_diff
        .grouped_ops(CONTEXT_LINES)
        .iter()
        .filter(|group| group.iter().any(|op| op.tag() != DiffTag::Equal))
        .filter_map(|group| hunk(&text_diff, group))
        .collect();
    RevisionDiff {
        hunks,
        old_lines: old.lines().count(),
        new_lines: new.lines().count(),
    }
}

/// One hunk per op group. The ranges span from the first op to the last, so
/// the counts include leading and trailing context.
fn hunk(text_diff: &TextDiff<'_, '_, '_, str>, group: &[DiffOp]) -> Option<DiffHunk> {
    let (first, last) = (group.first()?, group.last()?);
    let old = first.old_range().start..last.old_range().end;
    let new = first.new_range().start..last.new_range().end;
    Some(DiffHunk {
        old_start: old.start + 1,
        old_count: old.len(),
        new_start: new.start + 1,
        new_count: new.len(),
        lines: group
            .iter()
            .flat_map(|op| text_diff.iter_changes(op))
            .map(DiffLine::from)
            .collect(),
    })
}

impl From<Change<&str>> for DiffLine {
    fn from(change: Change<&str>) -> Self {
        let text = change.value().trim_end_matches('\n').to_string();
        match change.tag() {
            ChangeTag::Equal => DiffLine::Context(text),
            ChangeTag::Delete => DiffLine::Removed(text),
            ChangeTag::Insert => DiffLine::Added(text),
        }
    }
}
