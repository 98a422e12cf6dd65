//! Mirroring decisions.
//!
//! The diff between baseline and working splits the working text into two
//! kinds of region: spans the assistant introduced, and the *equal segments*
//! between them, which exist verbatim in the baseline. A user edit that lands
//! in an equal segment is replayed into the baseline at the corresponding
//! offset; one that lands in assistant text is left out of it.
//!
//! An edit that straddles both kinds is split. Whatever it deletes inside
//! equal segments is deleted from the baseline too, and its replacement text
//! follows only when the edit starts inside an equal segment.

use serde::{Deserialize, Serialize};
use tandem_text::{DiffSpan, TextEdit, TextError, TextRange};

/// How a user edit was reflected into the baseline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorOutcome {
    /// The whole edit was replayed into the baseline.
    Mirrored,
    /// Only the baseline-equivalent part of a straddling edit was replayed.
    Partial,
    /// The edit touched assistant-introduced text only.
    Skipped,
    /// The entry is attributed to a streaming response, so nothing is mirrored.
    Attributed,
}

impl MirrorOutcome {
    #[inline]
    #[must_use]
    pub fn touched_baseline(self) -> bool {
        matches!(self, MirrorOutcome::Mirrored | MirrorOutcome::Partial)
    }
}

/// The baseline edits that mirror one user edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorPlan {
    pub outcome: MirrorOutcome,
    /// Ordered, disjoint, expressed against the baseline text.
    pub baseline_edits: Vec<TextEdit>,
}

impl MirrorPlan {
    fn skipped() -> Self {
        MirrorPlan {
            outcome: MirrorOutcome::Skipped,
            baseline_edits: Vec::new(),
        }
    }
}

/// A run of working text that also exists verbatim in the baseline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Segment {
    pub working: TextRange,
    pub baseline_start: usize,
}

impl Segment {
    #[inline]
    fn to_baseline(self, offset: usize) -> usize {
        self.baseline_start + (offset - self.working.start)
    }
}

/// Complement of `spans` in working coordinates.
///
/// Fails when the spans are unordered, out of bounds, or inconsistent with
/// the two text lengths. Every equal segment must have the same length on
/// both sides.
pub(crate) fn equal_segments(
    spans: &[DiffSpan],
    baseline_len: usize,
    working_len: usize,
) -> Result<Vec<Segment>, TextError> {
    let malformed = |why: &str| TextError::Oracle(format!("malformed diff: {}", why));

    let mut segments = Vec::with_capacity(spans.len() + 1);
    let mut w = 0;
    let mut b = 0;

    for span in spans {
        if span.original.start > span.original.end || span.modified.start > span.modified.end {
            return Err(malformed("inverted range"));
        }
        if span.modified.start < w || span.original.start < b {
            return Err(malformed("spans out of order"));
        }
        if span.modified.start - w != span.original.start - b {
            return Err(malformed("equal runs differ in length"));
        }
        segments.push(Segment {
            working: TextRange::new(w, span.modified.start),
            baseline_start: b,
        });
        w = span.modified.end;
        b = span.original.end;
    }

    if w > working_len || b > baseline_len {
        return Err(malformed("span past end of text"));
    }
    if working_len - w != baseline_len - b {
        return Err(malformed("trailing equal run differs in length"));
    }
    segments.push(Segment {
        working: TextRange::new(w, working_len),
        baseline_start: b,
    });
    Ok(segments)
}

/// Decides how `edit`, expressed against the working text, maps onto the
/// baseline given the current `diff(baseline, working)`.
pub fn plan(
    spans: &[DiffSpan],
    baseline_len: usize,
    working_len: usize,
    edit: &TextEdit,
) -> Result<MirrorPlan, TextError> {
    edit.range.check_bounds(working_len)?;
    let segments = equal_segments(spans, baseline_len, working_len)?;

    if edit.is_noop() {
        return Ok(MirrorPlan::skipped());
    }

    if edit.range.is_empty() {
        return Ok(plan_insert(&segments, spans, edit));
    }

    let (s, e) = (edit.range.start, edit.range.end);
    let pieces: Vec<(Segment, usize, usize)> = segments
        .iter()
        .filter_map(|seg| {
            let start = s.max(seg.working.start);
            let end = e.min(seg.working.end);
            (start < end).then_some((*seg, start, end))
        })
        .collect();

    let Some(&(_, first_start, _)) = pieces.first() else {
        return Ok(MirrorPlan::skipped());
    };

    if let [(seg, start, end)] = pieces.as_slice() {
        if *start == s && *end == e {
            return Ok(MirrorPlan {
                outcome: MirrorOutcome::Mirrored,
                baseline_edits: vec![TextEdit::new(
                    TextRange::new(seg.to_baseline(s), seg.to_baseline(e)),
                    edit.text.clone(),
                )],
            });
        }
    }

    let carries_text = first_start == s;
    let baseline_edits = pieces
        .iter()
        .enumerate()
        .map(|(i, (seg, start, end))| {
            let range = TextRange::new(seg.to_baseline(*start), seg.to_baseline(*end));
            if i == 0 && carries_text {
                TextEdit::new(range, edit.text.clone())
            } else {
                TextEdit::delete(range)
            }
        })
        .collect();

    Ok(MirrorPlan {
        outcome: MirrorOutcome::Partial,
        baseline_edits,
    })
}

fn plan_insert(segments: &[Segment], spans: &[DiffSpan], edit: &TextEdit) -> MirrorPlan {
    let p = edit.range.start;
    // Segment `i` is followed by `spans[i]`. Its end point is baseline text
    // only when that span inserts nothing or when it is the end of the text.
    let hit = segments.iter().enumerate().find(|(i, seg)| {
        seg.working.contains(p)
            || (p == seg.working.end && spans.get(*i).map_or(true, |s| s.modified.is_empty()))
    });

    match hit {
        Some((_, seg)) => MirrorPlan {
            outcome: MirrorOutcome::Mirrored,
            baseline_edits: vec![TextEdit::insert(seg.to_baseline(p), edit.text.clone())],
        },
        None => MirrorPlan::skipped(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_text::{apply_edits, char_len, LineDiffOracle};

    fn mirror(baseline: &str, working: &str, edit: TextEdit) -> (MirrorOutcome, String) {
        let spans = LineDiffOracle::diff(baseline, working);
        let plan = plan(&spans, char_len(baseline), char_len(working), &edit).unwrap();
        let mirrored = apply_edits(baseline, &plan.baseline_edits).unwrap();
        (plan.outcome, mirrored)
    }

    #[test]
    fn test_segments_of_top_insert() {
        let spans = vec![DiffSpan::new(TextRange::point(0), TextRange::new(0, 7))];
        let segments = equal_segments(&spans, 40, 47).unwrap();
        assert_eq!(
            segments,
            vec![
                Segment {
                    working: TextRange::new(0, 0),
                    baseline_start: 0
                },
                Segment {
                    working: TextRange::new(7, 47),
                    baseline_start: 0
                },
            ]
        );
    }

    #[test]
    fn test_no_diff_is_identity() {
        let (outcome, baseline) = mirror("one\ntwo\n", "one\ntwo\n", TextEdit::insert(4, "X"));
        assert_eq!(outcome, MirrorOutcome::Mirrored);
        assert_eq!(baseline, "one\nXtwo\n");
    }

    #[test]
    fn test_insert_after_assistant_text_is_mirrored() {
        let base = "abc\n".repeat(10);
        let working = format!("FarBoo\n{}", base);
        let (outcome, baseline) = mirror(&base, &working, TextEdit::insert(11, "USER_TYPE\n"));
        assert_eq!(outcome, MirrorOutcome::Mirrored);
        assert_eq!(baseline, format!("abc\nUSER_TYPE\n{}", "abc\n".repeat(9)));
    }

    #[test]
    fn test_edit_inside_assistant_text_is_skipped() {
        let base = "abc\n".repeat(10);
        let working = format!("FarBoo\n{}", base);
        let edit = TextEdit::new(TextRange::new(1, 6), "ooBar");
        let (outcome, baseline) = mirror(&base, &working, edit);
        assert_eq!(outcome, MirrorOutcome::Skipped);
        assert_eq!(baseline, base);

        let (outcome, _) = mirror(&base, &working, TextEdit::insert(3, "!"));
        assert_eq!(outcome, MirrorOutcome::Skipped);
    }

    #[test]
    fn test_insert_at_start_of_assistant_text_is_skipped() {
        // working: "a\n" + "NEW\n" + "b\n"; offset 2 is where "NEW\n" begins.
        let (outcome, baseline) = mirror("a\nb\n", "a\nNEW\nb\n", TextEdit::insert(2, "Y"));
        assert_eq!(outcome, MirrorOutcome::Skipped);
        assert_eq!(baseline, "a\nb\n");

        // Offset 6 is the first character of "b\n", which the baseline has.
        let (outcome, baseline) = mirror("a\nb\n", "a\nNEW\nb\n", TextEdit::insert(6, "X"));
        assert_eq!(outcome, MirrorOutcome::Mirrored);
        assert_eq!(baseline, "a\nXb\n");
    }

    #[test]
    fn test_insert_before_assistant_line_is_skipped() {
        let base = "abc\n".repeat(3);
        let working = format!("abc\nFarBoo\n{}", "abc\n".repeat(2));
        let (outcome, baseline) = mirror(&base, &working, TextEdit::insert(4, "F"));
        assert_eq!(outcome, MirrorOutcome::Skipped);
        assert_eq!(baseline, base);

        // Same at the very top of the file.
        let working = format!("FarBoo\n{}", base);
        let (outcome, baseline) = mirror(&base, &working, TextEdit::insert(0, "F"));
        assert_eq!(outcome, MirrorOutcome::Skipped);
        assert_eq!(baseline, base);
    }

    #[test]
    fn test_insert_at_deletion_or_end_is_mirrored() {
        // "b\n" was deleted; offset 2 in working is still baseline text.
        let (outcome, baseline) = mirror("a\nb\nc\n", "a\nc\n", TextEdit::insert(2, "X"));
        assert_eq!(outcome, MirrorOutcome::Mirrored);
        assert_eq!(baseline, "a\nXb\nc\n");

        // Appending after trailing assistant text lands at the end of the baseline.
        let (outcome, baseline) = mirror("a\n", "a\nNEW\n", TextEdit::insert(6, "Z"));
        assert_eq!(outcome, MirrorOutcome::Mirrored);
        assert_eq!(baseline, "a\nZ");
    }

    #[test]
    fn test_straddle_starting_in_baseline_text() {
        // Delete from inside "a\n" through the start of the assistant line.
        let (outcome, baseline) = mirror(
            "aa\nb\n",
            "aa\nNEW\nb\n",
            TextEdit::new(TextRange::new(1, 5), "Z"),
        );
        assert_eq!(outcome, MirrorOutcome::Partial);
        assert_eq!(baseline, "aZb\n");
    }

    #[test]
    fn test_straddle_starting_in_assistant_text() {
        // Replace "W\nb" where "W\n" is assistant text and "b" is baseline text.
        let (outcome, baseline) = mirror(
            "aa\nb\n",
            "aa\nNEW\nb\n",
            TextEdit::new(TextRange::new(5, 8), "Q"),
        );
        assert_eq!(outcome, MirrorOutcome::Partial);
        assert_eq!(baseline, "aa\n\n");
    }

    #[test]
    fn test_noop_edit_is_skipped() {
        let (outcome, baseline) = mirror("x\n", "x\n", TextEdit::insert(0, ""));
        assert_eq!(outcome, MirrorOutcome::Skipped);
        assert_eq!(baseline, "x\n");
    }

    #[test]
    fn test_malformed_diff_rejected() {
        let spans = vec![DiffSpan::new(TextRange::new(0, 2), TextRange::new(0, 5))];
        let err = plan(&spans, 4, 4, &TextEdit::insert(0, "x")).unwrap_err();
        assert!(matches!(err, TextError::Oracle(_)));
    }

    #[test]
    fn test_out_of_bounds_edit_rejected() {
        let err = plan(&[], 3, 3, &TextEdit::insert(4, "x")).unwrap_err();
        assert!(matches!(err, TextError::RangeOutOfBounds { .. }));
    }
}
