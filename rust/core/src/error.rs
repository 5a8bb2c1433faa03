// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types
//!
//! Parse-time defects are all reported as [`ValidationError`], whichever
//! component found them. Query-time misses on [`FileModel::by_id`] use the
//! unrelated [`NotFoundError`].
//!
//! [`FileModel::by_id`]: crate::FileModel::by_id

use std::fmt;
use thiserror::Error;

/// Result type for parse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by [`parse`](crate::parse) and [`open`](crate::open)
#[derive(Debug, Error)]
pub enum Error {
    /// The input is not a well-formed STEP physical file
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The input could not be read (missing file, permission denied, ...)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested combination of parse options has no defined meaning
    #[error("Invalid parse options: {0}")]
    InvalidOptions(&'static str),
}

impl Error {
    /// The validation error, if this is one
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(err) => Some(err),
            _ => None,
        }
    }

    /// Validation kind shortcut, `None` for I/O and option errors
    pub fn kind(&self) -> Option<ValidationErrorKind> {
        self.as_validation().map(|err| err.kind)
    }
}

/// Kinds of structural defects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ValidationErrorKind {
    /// Two data records declare the same `#N`
    DuplicateId,
    /// A header statement has the wrong name, arity or value shape
    MalformedHeader,
    /// Stray, doubled or unclosed punctuation
    UnbalancedPunctuation,
    /// The envelope (`ISO-10303-21;`, `HEADER;`, `DATA;`, `ENDSEC;`, ...) is incomplete
    MissingRequiredSection,
    /// A reference points to an id never defined (tree mode only)
    UnresolvedReference,
    /// Any other lexical or grammatical error
    Syntax,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorKind::DuplicateId => "duplicate-id",
            ValidationErrorKind::MalformedHeader => "malformed-header",
            ValidationErrorKind::UnbalancedPunctuation => "unbalanced-punctuation",
            ValidationErrorKind::MissingRequiredSection => "missing-required-section",
            ValidationErrorKind::UnresolvedReference => "unresolved-reference",
            ValidationErrorKind::Syntax => "syntax-error-at-offset",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structural defect in the input, with its location when known
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    /// Absolute byte offset into the input
    pub offset: Option<usize>,
    /// 1-based line of `offset`
    pub line: Option<usize>,
    /// 1-based column (in bytes) of `offset`
    pub column: Option<usize>,
    pub message: String,
    /// Raised because the input ran out, not because of bad content
    #[cfg_attr(feature = "serde", serde(skip))]
    truncated: bool,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, offset: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            offset: Some(offset),
            line: None,
            column: None,
            message: message.into(),
            truncated: false,
        }
    }

    /// Syntax error at a given offset
    pub fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::new(ValidationErrorKind::Syntax, offset, message)
    }

    pub(crate) fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }

    /// True when the error was caused by hitting the end of the input.
    /// Incremental readers use this to decide whether to read more.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Fill in line/column from the source text the offset refers to
    pub(crate) fn locate(mut self, source: &str) -> Self {
        if let Some(offset) = self.offset {
            let (line, column) = line_col(source.as_bytes(), offset);
            self.line = Some(line);
            self.column = Some(column);
        }
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column, self.offset) {
            (Some(line), Some(column), _) => write!(
                f,
                "{} at line {}, column {}: {}",
                self.kind, line, column, self.message
            ),
            (_, _, Some(offset)) => {
                write!(f, "{} at offset {}: {}", self.kind, offset, self.message)
            }
            _ => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Query-time miss on [`FileModel::by_id`](crate::FileModel::by_id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Entity #{id} not found")]
pub struct NotFoundError {
    pub id: u32,
}

/// 1-based (line, column) of a byte offset
fn line_col(bytes: &[u8], offset: usize) -> (usize, usize) {
    let offset = offset.min(bytes.len());
    let before = &bytes[..offset];
    let line = memchr::memchr_iter(b'\n', before).count() + 1;
    let column = match memchr::memrchr(b'\n', before) {
        Some(newline) => offset - newline,
        None => offset + 1,
    };
    (line, column)
}
