//! Error taxonomy (spec §7).
//!
//! Grounded on `exception_private.rs`'s `ExcType`: a closed, `strum`-derived
//! enum of error kinds, plus a single concrete error struct that always
//! carries a source location. Every fallible operation in the crate returns
//! `Result<T> = Result<T, CompileError>`.

use std::fmt;

use strum::{Display, EnumString};

use crate::ast::Loc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum ErrorKind {
    ParseError,
    UndefinedVariable,
    UndefinedFunction,
    ArityMismatch,
    TypeError,
    NullUsage,
    IndexOutOfBounds,
    AngleUnitMismatch,
    RangeError,
    LayerError,
    PathBlockRestriction,
    AssignmentError,
    ArgumentError,
}

/// A single structured compile-time or run-time failure (spec §6, §7).
///
/// Compilation aborts immediately on the first `CompileError`; no partial
/// output is ever returned alongside one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, loc: Loc) -> Self {
        Self {
            kind,
            message: message.into(),
            line: loc.line,
            column: loc.column,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (line {}, column {})",
            self.kind, self.message, self.line, self.column
        )
    }
}

impl std::error::Error for CompileError {}

pub type Result<T> = std::result::Result<T, CompileError>;
