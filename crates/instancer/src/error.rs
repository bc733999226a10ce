use std::result;

use read_fonts::{
    ReadError,
    types::{GlyphId, Tag},
};
use write_fonts::{BuilderError, error};

/// Error types for the variation evaluator.
///
/// These abort an instance build. Conditions that are recoverable at the
/// glyph or tuple level are reported as [`Diagnostic`] values instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse font: {0}")]
    Parse(#[from] ReadError),

    #[error("not a variable font (no fvar table)")]
    NotVariableFont,

    #[error("missing variation table: {0}")]
    MissingVariationTable(Tag),

    #[error("malformed {table} table: {reason}")]
    MalformedTable { table: Tag, reason: String },

    #[error("unknown axis tag: {0}")]
    UnknownAxis(Tag),

    #[error("invalid coordinate {value} for axis {tag}")]
    InvalidCoordinate { tag: Tag, value: f64 },

    #[error("no named instance at index {0}")]
    NoSuchInstance(usize),

    #[error("failed to rewrite {table} table: {reason}")]
    TableRewrite { table: Tag, reason: String },

    #[error("failed to build font: {0}")]
    Build(#[from] BuilderError),

    #[error("failed to write table: {0}")]
    Write(#[from] error::Error),
}

pub type Result<T> = result::Result<T, Error>;

/// A recoverable condition recorded while building an instance.
///
/// Diagnostics never abort a build: a tuple with malformed deltas is
/// skipped, a glyph with a broken CharString is emitted empty, and so on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Diagnostic {
    #[error("glyph {glyph}: malformed deltas: {reason}")]
    MalformedDeltas { glyph: GlyphId, reason: String },

    #[error("missing glyph {glyph}; emitted unvaried")]
    MissingGlyph { glyph: GlyphId },

    #[error("glyph {glyph}: operand underflow in CharString; emitted empty")]
    OperandUnderflow { glyph: GlyphId },

    #[error("glyph {glyph}: vsindex {vsindex} out of range; emitted empty")]
    VsindexOutOfRange { glyph: GlyphId, vsindex: u16 },

    #[error("axis {tag}: coordinate {value} out of range, clamped to {clamped}")]
    OutOfRangeCoordinate { tag: Tag, value: f64, clamped: f64 },
}
