//! tandem-text: text ranges, edit batches and diff oracles.
//!
//! - **range**: char-offset ranges and line/character positions.
//! - **edit**: edits, edit batches and atomic multi-range application.
//! - **diff**: the diff oracle interface and its line/char implementations.

pub mod diff;
pub mod edit;
pub mod error;
pub mod range;

pub use diff::{
    ChangeKind, CharDiffOracle, DiffGranularity, DiffOracle, DiffSpan, LineDiffOracle,
};
pub use edit::{apply_edits, EditBatch, TextEdit};
pub use error::{Result, TextError};
pub use range::{char_len, offset_at, position_at, slice, Position, TextRange};
