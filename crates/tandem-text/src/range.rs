//! Char-offset ranges and line/character positions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TextError};

/// Half-open range `[start, end)` measured in chars (Unicode scalar values).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    #[inline]
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        TextRange { start, end }
    }

    /// An empty range at `offset`, i.e. a pure insertion point.
    #[inline]
    #[must_use]
    pub fn point(offset: usize) -> Self {
        TextRange {
            start: offset,
            end: offset,
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// True when `offset` lies inside the range. The end is exclusive.
    #[inline]
    #[must_use]
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// True when both ranges share at least one char.
    #[inline]
    #[must_use]
    pub fn intersects(&self, other: &TextRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Fails unless the range is well formed and fits a text of `len` chars.
    pub fn check_bounds(&self, len: usize) -> Result<()> {
        if self.start > self.end || self.end > len {
            return Err(TextError::RangeOutOfBounds { range: *self, len });
        }
        Ok(())
    }
}

impl fmt::Display for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.start, self.end)
    }
}

impl FromStr for TextRange {
    type Err = TextError;

    /// Parses the bracketed `[start:end]` form used for text patches.
    fn from_str(s: &str) -> Result<Self> {
        let inner = s
            .trim()
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| TextError::InvalidRange(s.to_string()))?;

        let (start, end) = inner
            .split_once(':')
            .ok_or_else(|| TextError::InvalidRange(s.to_string()))?;

        let start: usize = start
            .trim()
            .parse()
            .map_err(|_| TextError::InvalidRange(s.to_string()))?;
        let end: usize = end
            .trim()
            .parse()
            .map_err(|_| TextError::InvalidRange(s.to_string()))?;

        if start > end {
            return Err(TextError::InvalidRange(s.to_string()));
        }
        Ok(TextRange { start, end })
    }
}

/// Zero-based line/character position. Lines are split on `\n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

impl Position {
    #[inline]
    #[must_use]
    pub fn new(line: usize, character: usize) -> Self {
        Position { line, character }
    }
}

/// Number of chars in `text`.
#[inline]
#[must_use]
pub fn char_len(text: &str) -> usize {
    str_indices::chars::count(text)
}

/// Byte index of the char at `offset`; past-the-end offsets clamp to `text.len()`.
#[inline]
pub(crate) fn byte_index(text: &str, offset: usize) -> usize {
    str_indices::chars::to_byte_idx(text, offset)
}

/// The substring covered by `range`.
pub fn slice(text: &str, range: TextRange) -> Result<&str> {
    range.check_bounds(char_len(text))?;
    Ok(&text[byte_index(text, range.start)..byte_index(text, range.end)])
}

/// Converts a line/character position into a char offset.
pub fn offset_at(text: &str, pos: Position) -> Result<usize> {
    let invalid = || TextError::InvalidPosition {
        line: pos.line,
        character: pos.character,
    };

    let line_count = str_indices::lines_lf::count_breaks(text) + 1;
    if pos.line >= line_count {
        return Err(invalid());
    }

    let line_start = str_indices::lines_lf::to_byte_idx(text, pos.line);
    let rest = &text[line_start..];
    let line = match rest.find('\n') {
        Some(i) => &rest[..i],
        None => rest,
    };
    if pos.character > char_len(line) {
        return Err(invalid());
    }

    Ok(str_indices::chars::from_byte_idx(text, line_start) + pos.character)
}

/// Converts a char offset into a line/character position.
pub fn position_at(text: &str, offset: usize) -> Result<Position> {
    let len = char_len(text);
    if offset > len {
        return Err(TextError::RangeOutOfBounds {
            range: TextRange::point(offset),
            len,
        });
    }

    let byte = byte_index(text, offset);
    let line = str_indices::lines_lf::from_byte_idx(text, byte);
    let line_start = str_indices::lines_lf::to_byte_idx(text, line);
    Ok(Position {
        line,
        character: char_len(&text[line_start..byte]),
    })
}
