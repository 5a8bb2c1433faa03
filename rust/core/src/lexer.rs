// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STEP Tokenizer
//!
//! Lazy, zero-copy tokenization of ISO-10303-21 text. Whitespace and
//! `/* ... */` comments are skipped here so the grammar never sees them.

use std::borrow::Cow;

use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit0, digit1, one_of, satisfy},
    combinator::{opt, recognize},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::error::ValidationError;

/// Token payload
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    /// Instance reference: #123
    Reference(u32),
    /// Keyword or type name: IFCWALL, FILE_NAME, END-ISO-10303-21
    Keyword(&'a str),
    /// Decoded string literal: 'text'
    String(Cow<'a, str>),
    /// Binary literal (hex digits, first one is the unused bit count): "0FF"
    Binary(&'a str),
    /// Real: 3.14, -1.E-5, 0.
    Real(f64),
    /// Integer: 42, -42
    Integer(i64),
    /// Enumeration without the dots: .ELEMENT. -> ELEMENT
    Enum(&'a str),
    LParen,
    RParen,
    Comma,
    /// End of record
    Semicolon,
    Equals,
    /// Omitted value: $
    Dollar,
    /// Derived value: *
    Star,
}

impl TokenKind<'_> {
    /// True for `( ) , ;`
    pub fn is_punctuation(&self) -> bool {
        matches!(
            self,
            TokenKind::LParen | TokenKind::RParen | TokenKind::Comma | TokenKind::Semicolon
        )
    }

    /// Short human-readable description for error messages
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Reference(id) => format!("reference #{}", id),
            TokenKind::Keyword(k) => format!("keyword {}", k),
            TokenKind::String(_) => "string".to_string(),
            TokenKind::Binary(_) => "binary".to_string(),
            TokenKind::Real(_) => "real".to_string(),
            TokenKind::Integer(_) => "integer".to_string(),
            TokenKind::Enum(e) => format!("enumeration .{}.", e),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Semicolon => "';'".to_string(),
            TokenKind::Equals => "'='".to_string(),
            TokenKind::Dollar => "'$'".to_string(),
            TokenKind::Star => "'*'".to_string(),
        }
    }
}

/// A lexical token with its raw text and absolute offset
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub text: &'a str,
    pub offset: usize,
}

/// Parse instance reference: #123
fn reference(input: &str) -> IResult<&str, &str> {
    preceded(char('#'), digit1)(input)
}

/// Parse keyword: IFCWALL, FILE_SCHEMA, ISO-10303-21, !USER_DEFINED
fn keyword(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_' || c == '!'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
    ))(input)
}

/// Parse number: 42, -42, 3.14, 0., 1.5E-10
/// STEP allows reals like "0." without fraction digits
fn number(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(one_of("+-")),
        digit1,
        opt(pair(char('.'), digit0)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)
}

/// Parse enum: .T., .ELEMENT.
fn enumeration(input: &str) -> IResult<&str, &str> {
    delimited(
        char('.'),
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        char('.'),
    )(input)
}

/// Parse binary: "0FF"
fn binary(input: &str) -> IResult<&str, &str> {
    delimited(
        char('"'),
        take_while(|c: char| c.is_ascii_hexdigit()),
        char('"'),
    )(input)
}

/// Streaming tokenizer over a STEP text buffer
///
/// Yields tokens until the end of input. After the first error the
/// iterator is exhausted.
pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
    failed: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            position: 0,
            failed: false,
        }
    }

    /// Byte offset of the next unread character
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Skip whitespace and comments
    fn skip_trivia(&mut self) -> Result<(), ValidationError> {
        let bytes = self.input.as_bytes();
        loop {
            while self.position < bytes.len() && bytes[self.position].is_ascii_whitespace() {
                self.position += 1;
            }
            if bytes[self.position..].starts_with(b"/*") {
                let body = &bytes[self.position + 2..];
                match memchr::memmem::find(body, b"*/") {
                    Some(end) => self.position += 2 + end + 2,
                    None => {
                        return Err(ValidationError::syntax(
                            self.position,
                            "unterminated comment",
                        )
                        .truncated())
                    }
                }
            } else {
                return Ok(());
            }
        }
    }

    fn lex_token(&mut self) -> Result<Token<'a>, ValidationError> {
        let start = self.position;
        let rest = &self.input[start..];
        let first = rest.as_bytes()[0];

        let punct = match first {
            b'(' => Some(TokenKind::LParen),
            b')' => Some(TokenKind::RParen),
            b',' => Some(TokenKind::Comma),
            b';' => Some(TokenKind::Semicolon),
            b'=' => Some(TokenKind::Equals),
            b'$' => Some(TokenKind::Dollar),
            b'*' => Some(TokenKind::Star),
            _ => None,
        };
        if let Some(kind) = punct {
            return Ok(self.token(kind, start, 1));
        }

        match first {
            b'#' => {
                let (tail, digits) = reference(rest).map_err(|_| {
                    ValidationError::syntax(start, "expected digits after '#'")
                })?;
                let id = lexical_core::parse::<u32>(digits.as_bytes()).map_err(|_| {
                    ValidationError::syntax(start, format!("instance id out of range: #{}", digits))
                })?;
                Ok(self.token(TokenKind::Reference(id), start, rest.len() - tail.len()))
            }
            b'\'' => self.lex_string(start),
            b'"' => {
                let (tail, hex) = binary(rest).map_err(|_| {
                    ValidationError::syntax(start, "unterminated binary literal").truncated()
                })?;
                Ok(self.token(TokenKind::Binary(hex), start, rest.len() - tail.len()))
            }
            b'.' => {
                let (tail, name) = enumeration(rest).map_err(|_| {
                    ValidationError::syntax(start, "malformed enumeration literal")
                })?;
                Ok(self.token(TokenKind::Enum(name), start, rest.len() - tail.len()))
            }
            b'+' | b'-' | b'0'..=b'9' => {
                let (tail, text) = number(rest)
                    .map_err(|_| ValidationError::syntax(start, "malformed number"))?;
                let kind = if text.contains(['.', 'e', 'E']) {
                    let value = fast_float::parse::<f64, _>(text).map_err(|_| {
                        ValidationError::syntax(start, format!("invalid real '{}'", text))
                    })?;
                    TokenKind::Real(value)
                } else {
                    let value = lexical_core::parse::<i64>(text.as_bytes()).map_err(|_| {
                        ValidationError::syntax(start, format!("integer out of range '{}'", text))
                    })?;
                    TokenKind::Integer(value)
                };
                Ok(self.token(kind, start, rest.len() - tail.len()))
            }
            _ => match keyword(rest) {
                Ok((tail, name)) => Ok(self.token(TokenKind::Keyword(name), start, rest.len() - tail.len())),
                Err(_) => {
                    let c = rest.chars().next().unwrap_or('\u{fffd}');
                    Err(ValidationError::syntax(
                        start,
                        format!("unexpected character '{}'", c.escape_debug()),
                    ))
                }
            },
        }
    }

    /// Scan a quoted string, '' escapes a single quote
    fn lex_string(&mut self, start: usize) -> Result<Token<'a>, ValidationError> {
        let bytes = self.input.as_bytes();
        let body_start = start + 1;
        let mut i = body_start;
        let mut escaped = false;

        loop {
            let quote = memchr::memchr(b'\'', &bytes[i..]).ok_or_else(|| {
                ValidationError::syntax(start, "unterminated string literal").truncated()
            })?;
            i += quote;
            if bytes.get(i + 1) == Some(&b'\'') {
                escaped = true;
                i += 2;
                continue;
            }
            break;
        }

        let raw = &self.input[body_start..i];
        let value = if escaped || raw.contains('\\') {
            Cow::Owned(decode_string(raw).map_err(|msg| ValidationError::syntax(start, msg))?)
        } else {
            Cow::Borrowed(raw)
        };
        Ok(self.token(TokenKind::String(value), start, i + 1 - start))
    }

    #[inline]
    fn token(&mut self, kind: TokenKind<'a>, start: usize, len: usize) -> Token<'a> {
        self.position = start + len;
        Token {
            kind,
            text: &self.input[start..start + len],
            offset: start,
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, ValidationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = self
            .skip_trivia()
            .and_then(|_| {
                if self.position >= self.input.len() {
                    Ok(None)
                } else {
                    self.lex_token().map(Some)
                }
            })
            .transpose();
        if matches!(result, Some(Err(_))) {
            self.failed = true;
        }
        result
    }
}

impl std::iter::FusedIterator for Lexer<'_> {}

/// Decode the body of a string literal: '' quotes and the
/// `\\`, `\S\`, `\X\`, `\X2\`, `\X4\` and `\P?\` control directives.
/// Unknown backslash sequences are kept verbatim.
fn decode_string(raw: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find(['\'', '\\']) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        if rest.starts_with("''") {
            out.push('\'');
            rest = &rest[2..];
        } else if rest.starts_with("\\\\") {
            out.push('\\');
            rest = &rest[2..];
        } else if let Some(tail) = rest.strip_prefix("\\S\\") {
            let c = tail.chars().next().ok_or("incomplete \\S\\ directive")?;
            // Upper half of ISO 8859-1
            let shifted = u32::from(c) + 0x80;
            out.push(char::from_u32(shifted).ok_or("invalid \\S\\ directive")?);
            rest = &tail[c.len_utf8()..];
        } else if let Some(tail) = rest.strip_prefix("\\X2\\") {
            let end = tail.find("\\X0\\").ok_or("unterminated \\X2\\ directive")?;
            let units = hex_units(&tail[..end], 4)?
                .into_iter()
                .map(|u| u as u16)
                .collect::<Vec<_>>();
            out.push_str(
                &String::from_utf16(&units).map_err(|_| "invalid UTF-16 in \\X2\\ directive")?,
            );
            rest = &tail[end + 4..];
        } else if let Some(tail) = rest.strip_prefix("\\X4\\") {
            let end = tail.find("\\X0\\").ok_or("unterminated \\X4\\ directive")?;
            for unit in hex_units(&tail[..end], 8)? {
                out.push(char::from_u32(unit).ok_or("invalid code point in \\X4\\ directive")?);
            }
            rest = &tail[end + 4..];
        } else if let Some(tail) = rest.strip_prefix("\\X\\") {
            let hex = tail.get(..2).ok_or("incomplete \\X\\ directive")?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| "invalid \\X\\ directive")?;
            out.push(char::from(byte));
            rest = &tail[2..];
        } else if rest.len() >= 4
            && rest.starts_with("\\P")
            && rest.as_bytes()[3] == b'\\'
        {
            // Code page switch, the decoded text is already Unicode
            rest = &rest[4..];
        } else {
            let c = rest.chars().next().unwrap_or('\\');
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }

    out.push_str(rest);
    Ok(out)
}

/// Split a run of hex digits into fixed-width code units
fn hex_units(hex: &str, width: usize) -> std::result::Result<Vec<u32>, String> {
    if hex.len() % width != 0 || !hex.is_ascii() {
        return Err(format!("hex run of length {} is not a multiple of {}", hex.len(), width));
    }
    (0..hex.len())
        .step_by(width)
        .map(|i| {
            u32::from_str_radix(&hex[i..i + width], 16)
                .map_err(|_| format!("invalid hex digits '{}'", &hex[i..i + width]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationErrorKind;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        Lexer::new(input)
            .map(|t| t.expect("token").kind)
            .collect()
    }

    #[test]
    fn test_reference() {
        assert_eq!(kinds("#123"), vec![TokenKind::Reference(123)]);
        assert_eq!(kinds("#0"), vec![TokenKind::Reference(0)]);
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(kinds("'hello'"), vec![TokenKind::String("hello".into())]);
        assert_eq!(kinds("''"), vec![TokenKind::String("".into())]);
        assert_eq!(
            kinds("'Nested '' quotes'"),
            vec![TokenKind::String("Nested ' quotes".into())]
        );
        assert_eq!(kinds("''''"), vec![TokenKind::String("'".into())]);
    }

    #[test]
    fn test_string_directives() {
        assert_eq!(kinds(r"'a\X\E9b'"), vec![TokenKind::String("a\u{e9}b".into())]);
        assert_eq!(
            kinds(r"'\X2\00E400F6\X0\'"),
            vec![TokenKind::String("\u{e4}\u{f6}".into())]
        );
        assert_eq!(
            kinds(r"'\X4\0001F600\X0\'"),
            vec![TokenKind::String("\u{1F600}".into())]
        );
        assert_eq!(kinds(r"'\S\i'"), vec![TokenKind::String("\u{e9}".into())]);
        assert_eq!(kinds(r"'a\\b'"), vec![TokenKind::String("a\\b".into())]);
        assert_eq!(kinds(r"'\PA\x'"), vec![TokenKind::String("x".into())]);
        // Lone backslashes (e.g. Windows paths) are kept
        assert_eq!(
            kinds(r"'C:\dir\file.ifc'"),
            vec![TokenKind::String(r"C:\dir\file.ifc".into())]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("42"), vec![TokenKind::Integer(42)]);
        assert_eq!(kinds("-42"), vec![TokenKind::Integer(-42)]);
        assert_eq!(kinds("+7"), vec![TokenKind::Integer(7)]);
        assert_eq!(kinds("3.14"), vec![TokenKind::Real(3.14)]);
        assert_eq!(kinds("-3.14"), vec![TokenKind::Real(-3.14)]);
        assert_eq!(kinds("0."), vec![TokenKind::Real(0.0)]);
        assert_eq!(kinds("1.5E-10"), vec![TokenKind::Real(1.5e-10)]);
    }

    #[test]
    fn test_enum() {
        assert_eq!(kinds(".T."), vec![TokenKind::Enum("T")]);
        assert_eq!(kinds(".ELEMENT."), vec![TokenKind::Enum("ELEMENT")]);
    }

    #[test]
    fn test_keywords_and_punctuation() {
        assert_eq!(
            kinds("END-ISO-10303-21;"),
            vec![TokenKind::Keyword("END-ISO-10303-21"), TokenKind::Semicolon]
        );
        assert_eq!(
            kinds("#1=IFCX($,*,(1,\"0F\"));"),
            vec![
                TokenKind::Reference(1),
                TokenKind::Equals,
                TokenKind::Keyword("IFCX"),
                TokenKind::LParen,
                TokenKind::Dollar,
                TokenKind::Comma,
                TokenKind::Star,
                TokenKind::Comma,
                TokenKind::LParen,
                TokenKind::Integer(1),
                TokenKind::Comma,
                TokenKind::Binary("0F"),
                TokenKind::RParen,
                TokenKind::RParen,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_comments_and_whitespace_skipped() {
        assert_eq!(
            kinds("  /* a comment */ #1 /* another */\n\t=  "),
            vec![TokenKind::Reference(1), TokenKind::Equals]
        );
    }

    #[test]
    fn test_offsets_and_text() {
        let tokens: Vec<_> = Lexer::new("#12 = 'x'").map(|t| t.unwrap()).collect();
        assert_eq!(tokens[0].offset, 0);
        assert_eq!(tokens[0].text, "#12");
        assert_eq!(tokens[1].offset, 4);
        assert_eq!(tokens[2].offset, 6);
        assert_eq!(tokens[2].text, "'x'");
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("#1 'abc");
        assert!(lexer.next().unwrap().is_ok());
        let err = lexer.next().unwrap().unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::Syntax);
        assert_eq!(err.offset, Some(3));
        assert!(err.is_truncated());
        // Fused after an error
        assert!(lexer.next().is_none());
    }

    #[test]
    fn test_unexpected_character() {
        let err = Lexer::new("(1, @)").find_map(|t| t.err()).unwrap();
        assert_eq!(err.offset, Some(4));
        assert!(!err.is_truncated());
    }

    #[test]
    fn test_unterminated_comment() {
        let err = Lexer::new("/* never closed").next().unwrap().unwrap_err();
        assert_eq!(err.offset, Some(0));
        assert!(err.is_truncated());
    }
}
