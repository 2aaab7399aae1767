//! Word-level diff for single-line edits

use super::{Hunk, LineKind};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Unchanged,
    Removed,
    Added,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordDiffSegment {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: SegmentKind,
}

/// Segments for the old line (unchanged/removed) and the new line
/// (unchanged/added). Concatenating a side's segments yields that line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WordDiff {
    pub old: Vec<WordDiffSegment>,
    pub new: Vec<WordDiffSegment>,
}

/// A deletion and the addition that replaced it, by index into `Hunk::lines`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinePair {
    pub deletion: usize,
    pub addition: usize,
    pub diff: WordDiff,
}

/// Token-level alignment of two lines, splitting on word boundaries.
pub fn word_diff(old: &str, new: &str) -> WordDiff {
    let diff = TextDiff::from_words(old, new);
    let mut result = WordDiff::default();

    for change in diff.iter_all_changes() {
        let text = change.value();
        match change.tag() {
            ChangeTag::Equal => {
                push_segment(&mut result.old, text, SegmentKind::Unchanged);
                push_segment(&mut result.new, text, SegmentKind::Unchanged);
            }
            ChangeTag::Delete => push_segment(&mut result.old, text, SegmentKind::Removed),
            ChangeTag::Insert => push_segment(&mut result.new, text, SegmentKind::Added),
        }
    }

    result
}

fn push_segment(side: &mut Vec<WordDiffSegment>, text: &str, kind: SegmentKind) {
    if text.is_empty() {
        return;
    }
    match side.last_mut() {
        Some(last) if last.kind == kind => last.text.push_str(text),
        _ => side.push(WordDiffSegment {
            text: text.to_string(),
            kind,
        }),
    }
}

/// Word diffs for every change block in the hunk made of exactly one
/// deletion followed by exactly one addition. Larger blocks get none.
pub fn line_pairs(hunk: &Hunk) -> Vec<LinePair> {
    let lines = &hunk.lines;
    let mut pairs = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if lines[i].kind != LineKind::Deletion {
            i += 1;
            continue;
        }

        let deletions_start = i;
        while i < lines.len() && lines[i].kind == LineKind::Deletion {
            i += 1;
        }
        let additions_start = i;
        while i < lines.len() && lines[i].kind == LineKind::Addition {
            i += 1;
        }

        let deletions = additions_start - deletions_start;
        let additions = i - additions_start;
        if deletions == 1 && additions == 1 {
            pairs.push(LinePair {
                deletion: deletions_start,
                addition: additions_start,
                diff: word_diff(&lines[deletions_start].content, &lines[additions_start].content),
            });
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::parse_diff;

    fn segments(side: &[WordDiffSegment]) -> Vec<(&str, SegmentKind)> {
        side.iter().map(|s| (s.text.as_str(), s.kind)).collect()
    }

    #[test]
    fn test_single_token_change() {
        let diff = word_diff("const x = 1", "const x = 2");
        assert_eq!(
            segments(&diff.old),
            vec![("const x = ", SegmentKind::Unchanged), ("1", SegmentKind::Removed)]
        );
        assert_eq!(
            segments(&diff.new),
            vec![("const x = ", SegmentKind::Unchanged), ("2", SegmentKind::Added)]
        );
    }

    #[test]
    fn test_sides_reassemble_lines() {
        let old = "let total = items.iter().sum();";
        let new = "let total: u32 = items.iter().copied().sum();";
        let diff = word_diff(old, new);
        let old_text: String = diff.old.iter().map(|s| s.text.as_str()).collect();
        let new_text: String = diff.new.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(old_text, old);
        assert_eq!(new_text, new);
        assert!(diff.old.iter().all(|s| s.kind != SegmentKind::Added));
        assert!(diff.new.iter().all(|s| s.kind != SegmentKind::Removed));
    }

    #[test]
    fn test_only_one_to_one_blocks_are_paired() {
        let text = "\
diff --git a/f.txt b/f.txt
--- a/f.txt
+++ b/f.txt
@@ -1,5 +1,5 @@
 keep
-const x = 1
+const x = 2
 keep
-a
-b
+c
+d
";
        let files = parse_diff(text);
        let pairs = line_pairs(&files[0].hunks[0]);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].deletion, 2);
        assert_eq!(pairs[0].addition, 3);
        assert_eq!(pairs[0].diff.new.last().map(|s| s.text.as_str()), Some("2"));
    }

    #[test]
    fn test_deletion_without_addition_not_paired() {
        let text = "\
diff --git a/f.txt b/f.txt
--- a/f.txt
+++ b/f.txt
@@ -1,2 +1,1 @@
-gone
 keep
";
        let files = parse_diff(text);
        assert!(line_pairs(&files[0].hunks[0]).is_empty());
    }
}
