//! Text diff oracles.
//!
//! A diff oracle turns two full texts into an ordered list of changed
//! regions. The session engine treats it as a black box and derives all
//! provenance from its output, so any implementation works as long as the
//! spans are ordered, disjoint and cover every difference.

use std::sync::Arc;

use async_trait::async_trait;
use dissimilar::Chunk;
use serde::{Deserialize, Serialize};
use similar::{Algorithm, DiffTag, TextDiff};
use tracing::trace;

use crate::error::Result;
use crate::range::{char_len, TextRange};

/// What a changed region does to the original text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Delete,
    Replace,
}

/// One changed region: `original` in the first text maps to `modified` in the
/// second. Everything between spans is identical in both texts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiffSpan {
    pub original: TextRange,
    pub modified: TextRange,
}

impl DiffSpan {
    #[inline]
    #[must_use]
    pub fn new(original: TextRange, modified: TextRange) -> Self {
        DiffSpan { original, modified }
    }

    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        match (self.original.is_empty(), self.modified.is_empty()) {
            (true, _) => ChangeKind::Insert,
            (false, true) => ChangeKind::Delete,
            (false, false) => ChangeKind::Replace,
        }
    }
}

/// Computes the changed regions between two texts.
#[async_trait]
pub trait DiffOracle: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn compute_diff(&self, original: &str, modified: &str) -> Result<Vec<DiffSpan>>;
}

/// Which built-in oracle to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffGranularity {
    #[default]
    Line,
    Char,
}

impl DiffGranularity {
    #[must_use]
    pub fn oracle(self) -> Arc<dyn DiffOracle> {
        match self {
            DiffGranularity::Line => Arc::new(LineDiffOracle),
            DiffGranularity::Char => Arc::new(CharDiffOracle),
        }
    }
}

/// Accumulates adjacent non-equal runs into single spans.
#[derive(Default)]
struct SpanBuilder {
    spans: Vec<DiffSpan>,
    pending: Option<DiffSpan>,
}

impl SpanBuilder {
    fn change(&mut self, original: TextRange, modified: TextRange) {
        match &mut self.pending {
            Some(span) => {
                span.original.end = original.end;
                span.modified.end = modified.end;
            }
            None => self.pending = Some(DiffSpan::new(original, modified)),
        }
    }

    fn equal(&mut self) {
        if let Some(span) = self.pending.take() {
            self.spans.push(span);
        }
    }

    fn finish(mut self) -> Vec<DiffSpan> {
        self.equal();
        self.spans
    }
}

/// Line-granular oracle backed by `similar` (Myers).
#[derive(Debug, Clone, Copy, Default)]
pub struct LineDiffOracle;

impl LineDiffOracle {
    /// Synchronous core, exposed for callers that are not async.
    #[must_use]
    pub fn diff(original: &str, modified: &str) -> Vec<DiffSpan> {
        let diff = TextDiff::configure()
            .algorithm(Algorithm::Myers)
            .diff_lines(original, modified);

        let old_offsets = line_offsets(diff.old_slices());
        let new_offsets = line_offsets(diff.new_slices());

        let mut builder = SpanBuilder::default();
        for op in diff.ops() {
            if op.tag() == DiffTag::Equal {
                builder.equal();
                continue;
            }
            let old = op.old_range();
            let new = op.new_range();
            builder.change(
                TextRange::new(old_offsets[old.start], old_offsets[old.end]),
                TextRange::new(new_offsets[new.start], new_offsets[new.end]),
            );
        }
        builder.finish()
    }
}

/// Char offset at which each line starts, plus a final entry for the end.
fn line_offsets(lines: &[&str]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(lines.len() + 1);
    let mut pos = 0;
    offsets.push(pos);
    for line in lines {
        pos += char_len(line);
        offsets.push(pos);
    }
    offsets
}

#[async_trait]
impl DiffOracle for LineDiffOracle {
    fn name(&self) -> &str {
        "line"
    }

    async fn compute_diff(&self, original: &str, modified: &str) -> Result<Vec<DiffSpan>> {
        let spans = Self::diff(original, modified);
        trace!("[Diff] line oracle found {} region(s)", spans.len());
        Ok(spans)
    }
}

/// Char-granular oracle backed by `dissimilar`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharDiffOracle;

impl CharDiffOracle {
    #[must_use]
    pub fn diff(original: &str, modified: &str) -> Vec<DiffSpan> {
        let mut builder = SpanBuilder::default();
        let mut old_pos = 0;
        let mut new_pos = 0;

        for chunk in dissimilar::diff(original, modified) {
            match chunk {
                Chunk::Equal(text) => {
                    builder.equal();
                    let n = char_len(text);
                    old_pos += n;
                    new_pos += n;
                }
                Chunk::Delete(text) => {
                    let end = old_pos + char_len(text);
                    builder.change(
                        TextRange::new(old_pos, end),
                        TextRange::point(new_pos),
                    );
                    old_pos = end;
                }
                Chunk::Insert(text) => {
                    let end = new_pos + char_len(text);
                    builder.change(
                        TextRange::point(old_pos),
                        TextRange::new(new_pos, end),
                    );
                    new_pos = end;
                }
            }
        }
        builder.finish()
    }
}

#[async_trait]
impl DiffOracle for CharDiffOracle {
    fn name(&self) -> &str {
        "char"
    }

    async fn compute_diff(&self, original: &str, modified: &str) -> Result<Vec<DiffSpan>> {
        let spans = Self::diff(original, modified);
        trace!("[Diff] char oracle found {} region(s)", spans.len());
        Ok(spans)
    }
}
