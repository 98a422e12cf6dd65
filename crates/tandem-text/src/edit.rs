//! Text edits and edit batches.
//!
//! An [`EditBatch`] is the protocol unit a response streams into a file. All
//! of its ranges are expressed against the text as it was immediately before
//! the batch, and [`apply_edits`] resolves them as one atomic multi-range
//! replace.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TextError};
use crate::range::{byte_index, char_len, TextRange};

/// A single `(range, replacement)` operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextEdit {
    pub range: TextRange,
    pub text: String,
}

impl TextEdit {
    #[must_use]
    pub fn new(range: TextRange, text: impl Into<String>) -> Self {
        TextEdit {
            range,
            text: text.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::new(TextRange::point(offset), text)
    }

    #[inline]
    #[must_use]
    pub fn delete(range: TextRange) -> Self {
        Self::new(range, String::new())
    }

    /// True when the edit neither removes nor inserts anything.
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.range.is_empty() && self.text.is_empty()
    }
}

/// An ordered group of edits submitted atomically.
///
/// `done` marks the last batch a response intends to post for a file during
/// one turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditBatch {
    pub edits: Vec<TextEdit>,
    #[serde(default)]
    pub done: bool,
}

impl EditBatch {
    #[must_use]
    pub fn new(edits: Vec<TextEdit>, done: bool) -> Self {
        EditBatch { edits, done }
    }

    /// A batch carrying a single edit.
    #[must_use]
    pub fn single(edit: TextEdit, done: bool) -> Self {
        EditBatch {
            edits: vec![edit],
            done,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.iter().all(TextEdit::is_noop)
    }
}

/// Applies `edits` to `text` as one atomic multi-range replace.
///
/// Every range refers to `text` as given, not to the result of earlier edits
/// in the slice. Edits are ordered by `(start, end)` with a stable sort, so
/// several insertions at the identical empty range land in slice order.
/// Non-empty ranges may touch but not overlap.
pub fn apply_edits(text: &str, edits: &[TextEdit]) -> Result<String> {
    let len = char_len(text);
    for edit in edits {
        edit.range.check_bounds(len)?;
    }

    let mut ordered: Vec<&TextEdit> = edits.iter().collect();
    ordered.sort_by_key(|e| (e.range.start, e.range.end));

    for pair in ordered.windows(2) {
        if pair[0].range.end > pair[1].range.start {
            return Err(TextError::OverlappingEdits {
                first: pair[0].range,
                second: pair[1].range,
            });
        }
    }

    let extra: usize = ordered.iter().map(|e| e.text.len()).sum();
    let mut out = String::with_capacity(text.len() + extra);
    let mut cursor = 0;
    for edit in ordered {
        let start = byte_index(text, edit.range.start);
        let end = byte_index(text, edit.range.end);
        out.push_str(&text[cursor..start]);
        out.push_str(&edit.text);
        cursor = end;
    }
    out.push_str(&text[cursor..]);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_single_replace() {
        let out = apply_edits("hello world", &[TextEdit::new(TextRange::new(6, 11), "there")])
            .unwrap();
        assert_eq!(out, "hello there");
    }

    #[test]
    fn test_ranges_resolve_against_original() {
        // The second edit refers to "world" in the original text even though the
        // first edit shifts it.
        let edits = vec![
            TextEdit::insert(0, ">> "),
            TextEdit::new(TextRange::new(6, 11), "rust"),
        ];
        assert_eq!(apply_edits("hello world", &edits).unwrap(), ">> hello rust");
    }

    #[test]
    fn test_same_point_insertions_keep_batch_order() {
        let edits = vec![TextEdit::insert(0, "a"), TextEdit::insert(0, "b")];
        assert_eq!(apply_edits("xyz", &edits).unwrap(), "abxyz");
    }

    #[test]
    fn test_separate_batches_reverse_same_point_order() {
        let first = apply_edits("xyz", &[TextEdit::insert(0, "a")]).unwrap();
        let second = apply_edits(&first, &[TextEdit::insert(0, "b")]).unwrap();
        assert_eq!(second, "baxyz");
    }

    #[test]
    fn test_insert_before_replace_at_same_start() {
        let edits = vec![
            TextEdit::new(TextRange::new(0, 3), "XYZ"),
            TextEdit::insert(0, "-"),
        ];
        assert_eq!(apply_edits("abcdef", &edits).unwrap(), "-XYZdef");
    }

    #[test]
    fn test_overlap_rejected() {
        let edits = vec![
            TextEdit::delete(TextRange::new(0, 4)),
            TextEdit::delete(TextRange::new(2, 6)),
        ];
        let err = apply_edits("abcdefgh", &edits).unwrap_err();
        assert!(matches!(err, TextError::OverlappingEdits { .. }));
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let err = apply_edits("abc", &[TextEdit::insert(4, "x")]).unwrap_err();
        assert!(matches!(err, TextError::RangeOutOfBounds { len: 3, .. }));
    }

    #[test]
    fn test_multibyte_offsets_are_chars() {
        let out = apply_edits("añb", &[TextEdit::new(TextRange::new(1, 2), "n")]).unwrap();
        assert_eq!(out, "anb");
    }

    #[test]
    fn test_batch_serde_defaults_done() {
        let batch: EditBatch = serde_json::from_str(
            r#"{"edits":[{"range":{"start":0,"end":0},"text":"hi"}]}"#,
        )
        .unwrap();
        assert!(!batch.done);
        assert_eq!(batch.edits[0], TextEdit::insert(0, "hi"));
    }

    #[test]
    fn test_empty_batch() {
        assert!(EditBatch::default().is_empty());
        assert!(EditBatch::single(TextEdit::insert(3, ""), true).is_empty());
        assert!(!EditBatch::single(TextEdit::insert(3, "x"), true).is_empty());
    }
}
