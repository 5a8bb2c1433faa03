// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Header section
//!
//! The header holds exactly three statements, in this order:
//!
//! ```text
//! FILE_DESCRIPTION(description: LIST OF STRING, implementation_level: STRING);
//! FILE_NAME(name, time_stamp, (author), (organization),
//!           preprocessor_version, originating_system, authorization);
//! FILE_SCHEMA(schema_identifiers: LIST OF STRING);
//! ```
//!
//! Any other name, arity or value shape is a malformed header.

use crate::error::{ValidationError, ValidationErrorKind};
use crate::lexer::TokenKind;
use crate::mvd::MvdInfo;
use crate::parser::Parser;
use crate::value::Value;

type PResult<T> = std::result::Result<T, ValidationError>;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FileDescription {
    pub description: Vec<String>,
    pub implementation_level: String,
}

impl FileDescription {
    pub const KEYWORD: &'static str = "FILE_DESCRIPTION";
    pub const ARITY: usize = 2;

    fn from_args(args: &[Value], offset: usize) -> PResult<Self> {
        let fields = Fields::new(Self::KEYWORD, args, Self::ARITY, offset)?;
        Ok(Self {
            description: fields.strings(0, "description")?,
            implementation_level: fields.string(1, "implementation_level")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FileName {
    pub name: String,
    pub time_stamp: String,
    pub author: Vec<String>,
    pub organization: Vec<String>,
    pub preprocessor_version: String,
    pub originating_system: String,
    pub authorization: String,
}

impl FileName {
    pub const KEYWORD: &'static str = "FILE_NAME";
    pub const ARITY: usize = 7;

    fn from_args(args: &[Value], offset: usize) -> PResult<Self> {
        let fields = Fields::new(Self::KEYWORD, args, Self::ARITY, offset)?;
        Ok(Self {
            name: fields.string(0, "name")?,
            time_stamp: fields.string(1, "time_stamp")?,
            author: fields.strings(2, "author")?,
            organization: fields.strings(3, "organization")?,
            preprocessor_version: fields.string(4, "preprocessor_version")?,
            originating_system: fields.string(5, "originating_system")?,
            authorization: fields.string(6, "authorization")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FileSchema {
    pub schema_identifiers: Vec<String>,
}

impl FileSchema {
    pub const KEYWORD: &'static str = "FILE_SCHEMA";
    pub const ARITY: usize = 1;

    fn from_args(args: &[Value], offset: usize) -> PResult<Self> {
        let fields = Fields::new(Self::KEYWORD, args, Self::ARITY, offset)?;
        Ok(Self {
            schema_identifiers: fields.strings(0, "schema_identifiers")?,
        })
    }
}

/// Decoded `HEADER;` section
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HeaderSection {
    pub file_description: FileDescription,
    pub file_name: FileName,
    pub file_schema: FileSchema,
    /// MVD annotations found in `file_description.description`
    pub mvd: Option<MvdInfo>,
}

/// Positional argument access with header-specific errors
struct Fields<'v> {
    keyword: &'static str,
    args: &'v [Value],
    offset: usize,
}

impl<'v> Fields<'v> {
    fn new(keyword: &'static str, args: &'v [Value], arity: usize, offset: usize) -> PResult<Self> {
        if args.len() != arity {
            return Err(malformed(
                offset,
                format!(
                    "{} takes {} arguments, found {}",
                    keyword,
                    arity,
                    args.len()
                ),
            ));
        }
        Ok(Self {
            keyword,
            args,
            offset,
        })
    }

    fn string(&self, index: usize, field: &str) -> PResult<String> {
        self.args[index]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.wrong_shape(field, "a string"))
    }

    fn strings(&self, index: usize, field: &str) -> PResult<Vec<String>> {
        let items = self.args[index]
            .as_list()
            .ok_or_else(|| self.wrong_shape(field, "a list of strings"))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.wrong_shape(field, "a list of strings"))
            })
            .collect()
    }

    fn wrong_shape(&self, field: &str, expected: &str) -> ValidationError {
        malformed(
            self.offset,
            format!("{}.{} must be {}", self.keyword, field, expected),
        )
    }
}

fn malformed(offset: usize, message: impl Into<String>) -> ValidationError {
    ValidationError::new(ValidationErrorKind::MalformedHeader, offset, message)
}

/// Header states, each consuming exactly one statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderState {
    ExpectDescription,
    ExpectName,
    ExpectSchema,
    ExpectEndsec,
}

impl HeaderState {
    fn keyword(self) -> &'static str {
        match self {
            HeaderState::ExpectDescription => FileDescription::KEYWORD,
            HeaderState::ExpectName => FileName::KEYWORD,
            HeaderState::ExpectSchema => FileSchema::KEYWORD,
            HeaderState::ExpectEndsec => "ENDSEC",
        }
    }
}

/// Consume the statement a state expects and return its arguments and offset
fn expect_statement(parser: &mut Parser<'_>, state: HeaderState) -> PResult<(Vec<Value>, usize)> {
    let token = parser.next_or(ValidationErrorKind::MalformedHeader, state.keyword())?;
    let name = match token.kind {
        TokenKind::Keyword(name) => name,
        _ => return Err(parser.unexpected(&token, state.keyword())),
    };

    if !name.eq_ignore_ascii_case(state.keyword()) {
        let message = if name.eq_ignore_ascii_case("ENDSEC") {
            format!("header ends before {}", state.keyword())
        } else {
            format!("expected {}, found header entity {}", state.keyword(), name)
        };
        return Err(malformed(token.offset, message));
    }

    let args = match state {
        HeaderState::ExpectEndsec => Vec::new(),
        _ => parser.arguments()?,
    };
    parser.end_of_record()?;
    Ok((args, token.offset))
}

/// Parse the header statements through `ENDSEC;`, `HEADER;` already consumed
pub(crate) fn parse_header(parser: &mut Parser<'_>) -> PResult<HeaderSection> {
    let (args, offset) = expect_statement(parser, HeaderState::ExpectDescription)?;
    let file_description = FileDescription::from_args(&args, offset)?;

    let (args, offset) = expect_statement(parser, HeaderState::ExpectName)?;
    let file_name = FileName::from_args(&args, offset)?;

    let (args, offset) = expect_statement(parser, HeaderState::ExpectSchema)?;
    let file_schema = FileSchema::from_args(&args, offset)?;

    expect_statement(parser, HeaderState::ExpectEndsec)?;

    let mvd = MvdInfo::parse(&file_description.description);
    tracing::debug!(
        schema = ?file_schema.schema_identifiers,
        has_mvd = mvd.is_some(),
        "header parsed"
    );

    Ok(HeaderSection {
        file_description,
        file_name,
        file_schema,
        mvd,
    })
}

/// Syntax-check header statements without interpreting them
pub(crate) fn skip_header(parser: &mut Parser<'_>) -> PResult<()> {
    loop {
        let token = parser.next_or(ValidationErrorKind::MissingRequiredSection, "ENDSEC")?;
        match token.kind {
            TokenKind::Keyword(name) if name.eq_ignore_ascii_case("ENDSEC") => {
                return parser.end_of_record();
            }
            TokenKind::Keyword(_) => {
                parser.arguments()?;
                parser.end_of_record()?;
            }
            _ => return Err(parser.unexpected(&token, "header entity or ENDSEC")),
        }
    }
}
