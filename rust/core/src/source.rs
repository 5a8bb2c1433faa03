// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parse entry points
//!
//! [`parse`] accepts text, a path or any reader. The input is owned by the
//! call and dropped on every exit path.

use std::borrow::Cow;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, ValidationError};
use crate::model::FileModel;
use crate::parser::parse_text;

/// Read size for header-only probes
const CHUNK_SIZE: usize = 64 * 1024;

/// Parse configuration
///
/// | only_header | with_header | behaviour |
/// |---|---|---|
/// | false | true | full parse, every defect raises |
/// | false | false | full parse, header syntax-checked but not decoded |
/// | true | true | header only, the data section is never read |
/// | true | false | [`Error::InvalidOptions`] |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Resolve references into links after the data section is read
    pub with_tree: bool,
    /// Stop right after the header's `ENDSEC;`
    pub only_header: bool,
    /// Decode and validate the header statements
    pub with_header: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            with_tree: false,
            only_header: false,
            with_header: true,
        }
    }
}

impl ParseOptions {
    pub fn with_tree(mut self, with_tree: bool) -> Self {
        self.with_tree = with_tree;
        self
    }

    pub fn only_header(mut self, only_header: bool) -> Self {
        self.only_header = only_header;
        self
    }

    pub fn with_header(mut self, with_header: bool) -> Self {
        self.with_header = with_header;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.only_header && !self.with_header {
            return Err(Error::InvalidOptions(
                "only_header requires with_header: nothing would be parsed",
            ));
        }
        Ok(())
    }
}

/// Input of a parse
pub enum Source<'a> {
    Text(Cow<'a, str>),
    Path(Cow<'a, Path>),
    Reader(Box<dyn Read + 'a>),
}

impl<'a> Source<'a> {
    /// Wrap any reader
    pub fn reader(reader: impl Read + 'a) -> Self {
        Source::Reader(Box::new(reader))
    }
}

impl<'a> From<&'a str> for Source<'a> {
    fn from(text: &'a str) -> Self {
        Source::Text(Cow::Borrowed(text))
    }
}

impl From<String> for Source<'static> {
    fn from(text: String) -> Self {
        Source::Text(Cow::Owned(text))
    }
}

impl<'a> From<&'a Path> for Source<'a> {
    fn from(path: &'a Path) -> Self {
        Source::Path(Cow::Borrowed(path))
    }
}

impl<'a> From<&'a PathBuf> for Source<'a> {
    fn from(path: &'a PathBuf) -> Self {
        Source::Path(Cow::Borrowed(path.as_path()))
    }
}

impl From<PathBuf> for Source<'static> {
    fn from(path: PathBuf) -> Self {
        Source::Path(Cow::Owned(path))
    }
}

/// Parse a STEP physical file
///
/// Fails fast on the first defect; no partial model is returned.
pub fn parse<'a>(source: impl Into<Source<'a>>, options: ParseOptions) -> Result<FileModel> {
    options.validate()?;
    match source.into() {
        Source::Text(text) => {
            tracing::debug!(
                bytes = text.len(),
                with_tree = options.with_tree,
                only_header = options.only_header,
                "parsing STEP text"
            );
            Ok(parse_text(&text, &options)?)
        }
        Source::Path(path) => {
            tracing::debug!(path = %path.display(), "opening STEP file");
            let file = File::open(&path)?;
            parse_reader(file, &options)
        }
        Source::Reader(reader) => parse_reader(reader, &options),
    }
}

/// Open and parse a file, same contract as [`parse`]
pub fn open(path: impl AsRef<Path>, options: ParseOptions) -> Result<FileModel> {
    parse(path.as_ref(), options)
}

fn parse_reader<R: Read>(mut reader: R, options: &ParseOptions) -> Result<FileModel> {
    if options.only_header {
        return parse_header_incrementally(reader, options);
    }

    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    tracing::debug!(bytes = bytes.len(), with_tree = options.with_tree, "parsing STEP input");
    let text = String::from_utf8(bytes).map_err(|err| {
        let at = err.utf8_error().valid_up_to();
        invalid_utf8(at, String::from_utf8_lossy(err.as_bytes()).as_ref())
    })?;
    Ok(parse_text(&text, options)?)
}

/// Read chunks until the header section parses, never touching the rest
fn parse_header_incrementally<R: Read>(mut reader: R, options: &ParseOptions) -> Result<FileModel> {
    let mut buffer = Vec::with_capacity(CHUNK_SIZE);
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut searched = 0;
    let mut terminator_seen = false;

    loop {
        let read = match reader.read(&mut chunk) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        buffer.extend_from_slice(&chunk[..read]);
        let at_eof = read == 0;

        // Nothing to try until the header terminator could be present
        if !terminator_seen {
            terminator_seen = memchr::memmem::find(&buffer[searched..], b"ENDSEC").is_some();
            searched = buffer.len().saturating_sub(b"ENDSEC".len());
            if !terminator_seen && !at_eof {
                continue;
            }
        }

        let (text, invalid_at) = match std::str::from_utf8(&buffer) {
            Ok(text) => (text, None),
            Err(err) => {
                let valid = err.valid_up_to();
                let text = std::str::from_utf8(&buffer[..valid]).unwrap_or_default();
                (text, err.error_len().map(|_| valid))
            }
        };

        match parse_text(text, options) {
            Ok(model) => {
                tracing::debug!(bytes_read = buffer.len(), "header probe complete");
                return Ok(model);
            }
            Err(err) if err.is_truncated() || (!at_eof && cut_by_buffer_end(text, &err)) => {
                if let Some(at) = invalid_at {
                    return Err(invalid_utf8(at, text).into());
                }
                if at_eof {
                    return Err(err.into());
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// True if the offending token runs up to the end of a partial buffer
fn cut_by_buffer_end(text: &str, err: &ValidationError) -> bool {
    err.offset
        .and_then(|offset| text.get(offset..))
        .map_or(false, |rest| {
            !rest.contains(|c: char| c.is_whitespace() || matches!(c, ';' | ',' | '(' | ')'))
        })
}

fn invalid_utf8(offset: usize, text: &str) -> ValidationError {
    ValidationError::syntax(offset, "invalid UTF-8").locate(text)
}
