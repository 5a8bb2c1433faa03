// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STEP Parser
//!
//! Recursive descent over the token stream:
//!
//! ```text
//! ISO-10303-21;
//! HEADER; FILE_DESCRIPTION(..); FILE_NAME(..); FILE_SCHEMA(..); ENDSEC;
//! DATA; #1=IFCPERSON($,$,'x'); #2=(A() B(#1)); ... ENDSEC;
//! END-ISO-10303-21;
//! ```
//!
//! Every check fails fast with a [`ValidationError`].

use smallvec::{smallvec, SmallVec};

use crate::error::{ValidationError, ValidationErrorKind};
use crate::header::{parse_header, skip_header};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::model::{EntityInstance, EntityPart, FileModel};
use crate::source::ParseOptions;
use crate::value::Value;

type PResult<T> = std::result::Result<T, ValidationError>;

/// Aggregates nested deeper than this are rejected
const MAX_NESTING: usize = 128;

const MAGIC: &str = "ISO-10303-21";
const MAGIC_END: &str = "END-ISO-10303-21";

/// Token-level parser shared by the header and data grammars
pub(crate) struct Parser<'a> {
    source: &'a str,
    lexer: Lexer<'a>,
    peeked: Option<Token<'a>>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            lexer: Lexer::new(source),
            peeked: None,
        }
    }

    /// Look at the next token without consuming it
    pub fn peek(&mut self) -> PResult<Option<&Token<'a>>> {
        if self.peeked.is_none() {
            self.peeked = self.lexer.next().transpose()?;
        }
        Ok(self.peeked.as_ref())
    }

    /// Consume the next token, `None` at end of input
    pub fn advance(&mut self) -> PResult<Option<Token<'a>>> {
        match self.peeked.take() {
            Some(token) => Ok(Some(token)),
            None => self.lexer.next().transpose(),
        }
    }

    /// Consume the next token; end of input fails with `kind`
    pub fn next_or(&mut self, kind: ValidationErrorKind, expected: &str) -> PResult<Token<'a>> {
        match self.advance()? {
            Some(token) => Ok(token),
            None => Err(self.end_of_input(kind, expected)),
        }
    }

    pub fn end_of_input(&self, kind: ValidationErrorKind, expected: &str) -> ValidationError {
        ValidationError::new(
            kind,
            self.source.len(),
            format!("unexpected end of input, expected {}", expected),
        )
        .truncated()
    }

    /// Error for a token that does not fit the grammar.
    /// Misplaced punctuation is reported as unbalanced punctuation.
    pub fn unexpected(&self, token: &Token<'_>, expected: &str) -> ValidationError {
        let kind = if token.kind.is_punctuation() {
            ValidationErrorKind::UnbalancedPunctuation
        } else {
            ValidationErrorKind::Syntax
        };
        ValidationError::new(
            kind,
            token.offset,
            format!("unexpected {}, expected {}", token.kind.describe(), expected),
        )
    }

    /// Consume a keyword of the envelope (HEADER, DATA, ENDSEC, ...)
    pub fn expect_section_keyword(&mut self, name: &str) -> PResult<Token<'a>> {
        let token = self.next_or(ValidationErrorKind::MissingRequiredSection, name)?;
        match token.kind {
            TokenKind::Keyword(k) if k.eq_ignore_ascii_case(name) => Ok(token),
            _ => Err(ValidationError::new(
                ValidationErrorKind::MissingRequiredSection,
                token.offset,
                format!("expected {}, found {}", name, token.kind.describe()),
            )),
        }
    }

    /// Consume the `;` closing a statement
    pub fn end_of_record(&mut self) -> PResult<()> {
        let token = self.next_or(ValidationErrorKind::UnbalancedPunctuation, "';'")?;
        match token.kind {
            TokenKind::Semicolon => Ok(()),
            _ => Err(self.unexpected(&token, "';'")),
        }
    }

    /// Parenthesized argument list: (a, b, (c, d))
    pub fn arguments(&mut self) -> PResult<Vec<Value>> {
        let token = self.next_or(ValidationErrorKind::Syntax, "'('")?;
        match token.kind {
            TokenKind::LParen => self.list_body(token.offset, 1),
            _ => Err(self.unexpected(&token, "'('")),
        }
    }

    /// Items after an opening parenthesis, through the matching ')'
    fn list_body(&mut self, open: usize, depth: usize) -> PResult<Vec<Value>> {
        let mut items = Vec::new();
        if matches!(self.peek()?, Some(Token { kind: TokenKind::RParen, .. })) {
            self.advance()?;
            return Ok(items);
        }

        loop {
            items.push(self.value(open, depth)?);
            match self.advance()? {
                Some(Token { kind: TokenKind::Comma, .. }) => continue,
                Some(Token { kind: TokenKind::RParen, .. }) => return Ok(items),
                Some(token) => return Err(self.unexpected(&token, "',' or ')'")),
                None => return Err(self.unclosed(open)),
            }
        }
    }

    fn unclosed(&self, open: usize) -> ValidationError {
        ValidationError::new(
            ValidationErrorKind::UnbalancedPunctuation,
            self.source.len(),
            format!("'(' at offset {} is never closed", open),
        )
        .truncated()
    }

    /// One argument value
    fn value(&mut self, open: usize, depth: usize) -> PResult<Value> {
        let token = match self.advance()? {
            Some(token) => token,
            None => return Err(self.unclosed(open)),
        };
        if depth > MAX_NESTING {
            return Err(ValidationError::syntax(
                token.offset,
                format!("values nested deeper than {}", MAX_NESTING),
            ));
        }

        let value = match token.kind {
            TokenKind::String(s) => Value::String(s.into_owned()),
            TokenKind::Real(f) => Value::Real(f),
            TokenKind::Integer(i) => Value::Integer(i),
            TokenKind::Enum("T") => Value::Boolean(true),
            TokenKind::Enum("F") => Value::Boolean(false),
            TokenKind::Enum(e) => Value::Enum(e.to_string()),
            TokenKind::Binary(b) => Value::Binary(b.to_string()),
            TokenKind::Reference(id) => Value::Reference(id),
            TokenKind::Dollar => Value::Omitted,
            TokenKind::Star => Value::Derived,
            TokenKind::LParen => Value::List(self.list_body(token.offset, depth + 1)?),
            TokenKind::Keyword(name) => {
                // Typed parameter: exactly one value in parentheses
                let inner_open = self.next_or(ValidationErrorKind::Syntax, "'('")?;
                if inner_open.kind != TokenKind::LParen {
                    return Err(self.unexpected(&inner_open, "'(' after type name"));
                }
                let inner = self.value(inner_open.offset, depth + 1)?;
                match self.advance()? {
                    Some(Token { kind: TokenKind::RParen, .. }) => {}
                    Some(other) => {
                        return Err(ValidationError::syntax(
                            other.offset,
                            format!("typed parameter {} takes exactly one value", name),
                        ))
                    }
                    None => return Err(self.unclosed(inner_open.offset)),
                }
                Value::Typed(name.to_ascii_uppercase(), Box::new(inner))
            }
            TokenKind::Equals | TokenKind::RParen | TokenKind::Comma | TokenKind::Semicolon => {
                return Err(self.unexpected(&token, "a value"))
            }
        };
        Ok(value)
    }

    /// `#id = TYPE(args);` or `#id = (A(args) B(args));`, the `#id` already consumed
    fn instance(&mut self, id: u32, offset: usize) -> PResult<EntityInstance> {
        let eq = self.next_or(ValidationErrorKind::Syntax, "'='")?;
        if eq.kind != TokenKind::Equals {
            return Err(self.unexpected(&eq, "'='"));
        }

        let token = self.next_or(ValidationErrorKind::Syntax, "entity type")?;
        let parts: SmallVec<[EntityPart; 1]> = match token.kind {
            TokenKind::Keyword(name) => smallvec![EntityPart {
                type_name: name.to_ascii_uppercase(),
                attributes: self.arguments()?,
            }],
            TokenKind::LParen => {
                let mut parts = SmallVec::new();
                loop {
                    let next = match self.advance()? {
                        Some(next) => next,
                        None => return Err(self.unclosed(token.offset)),
                    };
                    match next.kind {
                        TokenKind::Keyword(name) => parts.push(EntityPart {
                            type_name: name.to_ascii_uppercase(),
                            attributes: self.arguments()?,
                        }),
                        TokenKind::RParen if !parts.is_empty() => break,
                        _ => return Err(self.unexpected(&next, "entity type")),
                    }
                }
                parts
            }
            _ => return Err(self.unexpected(&token, "entity type")),
        };

        self.end_of_record()?;
        Ok(EntityInstance::new(id, parts, offset))
    }

    /// Data section statements through `ENDSEC;`
    fn data_section(&mut self, model: &mut FileModel) -> PResult<()> {
        loop {
            let token = self.next_or(ValidationErrorKind::MissingRequiredSection, "ENDSEC")?;
            match token.kind {
                TokenKind::Reference(id) => {
                    let instance = self.instance(id, token.offset)?;
                    model.insert(instance).map_err(|first| {
                        ValidationError::new(
                            ValidationErrorKind::DuplicateId,
                            token.offset,
                            format!(
                                "#{} is already defined at offset {}",
                                id, first
                            ),
                        )
                    })?;
                }
                TokenKind::Keyword(k) if k.eq_ignore_ascii_case("ENDSEC") => {
                    return self.end_of_record();
                }
                _ => return Err(self.unexpected(&token, "instance or ENDSEC")),
            }
        }
    }

    /// Top-level state machine: START -> HEADER -> (DATA -> END | END)
    pub fn document(mut self, options: &ParseOptions) -> PResult<FileModel> {
        self.expect_section_keyword(MAGIC)?;
        self.end_of_record()?;
        self.expect_section_keyword("HEADER")?;
        self.end_of_record()?;

        let header = if options.with_header {
            Some(parse_header(&mut self)?)
        } else {
            skip_header(&mut self)?;
            None
        };
        let mut model = FileModel::new(header);

        if options.only_header {
            tracing::debug!(consumed = self.lexer.position(), "stopping after header");
            return Ok(model);
        }

        self.expect_section_keyword("DATA")?;
        // Edition 3 allows DATA('name', ('schema'))
        if matches!(self.peek()?, Some(Token { kind: TokenKind::LParen, .. })) {
            self.arguments()?;
        }
        self.end_of_record()?;
        self.data_section(&mut model)?;
        tracing::debug!(instances = model.len(), "data section parsed");

        self.expect_section_keyword(MAGIC_END)?;
        self.end_of_record()?;
        if let Some(token) = self.advance()? {
            return Err(ValidationError::syntax(
                token.offset,
                format!("unexpected {} after {}", token.kind.describe(), MAGIC_END),
            ));
        }

        if options.with_tree {
            model.resolve_references()?;
            tracing::trace!("references resolved");
        }
        Ok(model)
    }
}

/// Parse a complete STEP text buffer
pub(crate) fn parse_text(source: &str, options: &ParseOptions) -> PResult<FileModel> {
    Parser::new(source)
        .document(options)
        .map_err(|err| err.locate(source))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');
FILE_NAME('test.ifc','2024-01-01T00:00:00',('Author'),('Org'),'pre','app','none');
FILE_SCHEMA(('IFC4X3_ADD2'));
ENDSEC;
";

    fn file(data: &str) -> String {
        format!("{}DATA;\n{}\nENDSEC;\nEND-ISO-10303-21;\n", HEADER, data)
    }

    fn parse(data: &str) -> PResult<FileModel> {
        parse_text(&file(data), &ParseOptions::default())
    }

    fn parse_err(data: &str) -> ValidationError {
        parse(data).expect_err("should fail")
    }

    #[test]
    fn test_parse_simple_entity() {
        let model = parse("#1=IFCPERSON($,$,$,$,$,$,$,$);").unwrap();
        let person = model.by_id(1).unwrap();
        assert_eq!(person.type_name(), "IFCPERSON");
        assert_eq!(person.attributes().len(), 8);
        assert!(person[0].is_omitted());
        assert_eq!(model.by_type("ifcperson")[0].id, 1);
    }

    #[test]
    fn test_parse_entity_with_nested_list() {
        let model = parse("#9=IFCDIRECTION((0.,0.,1.));").unwrap();
        let dir = model.by_id(9).unwrap();
        assert_eq!(dir.attributes().len(), 1);
        let coords = dir[0].as_list().unwrap();
        assert_eq!(coords.len(), 3);
        assert_eq!(coords[2].as_real(), Some(1.0));
    }

    #[test]
    fn test_parse_value_kinds() {
        let model = parse(
            "#1=IFCX('s',1.5,-2,.T.,.F.,.U.,.ELEMENT.,\"0F\",#2,$,*,(1,(2)),IFCLABEL('x'));\n#2=IFCY();",
        )
        .unwrap();
        let x = model.by_id(1).unwrap();
        assert_eq!(x[0], Value::String("s".into()));
        assert_eq!(x[1], Value::Real(1.5));
        assert_eq!(x[2], Value::Integer(-2));
        assert_eq!(x[3], Value::Boolean(true));
        assert_eq!(x[4], Value::Boolean(false));
        assert_eq!(x[5], Value::Enum("U".into()));
        assert_eq!(x[6], Value::Enum("ELEMENT".into()));
        assert_eq!(x[7], Value::Binary("0F".into()));
        assert_eq!(x[8], Value::Reference(2));
        assert_eq!(x[9], Value::Omitted);
        assert_eq!(x[10], Value::Derived);
        assert_eq!(
            x[11],
            Value::List(vec![Value::Integer(1), Value::List(vec![Value::Integer(2)])])
        );
        assert_eq!(
            x[12],
            Value::Typed("IFCLABEL".into(), Box::new(Value::String("x".into())))
        );
        assert!(model.by_id(2).unwrap().attributes().is_empty());
    }

    #[test]
    fn test_complex_instance() {
        let model = parse("#5=(IFCA(1) IFCB('x',$));").unwrap();
        let inst = model.by_id(5).unwrap();
        assert!(inst.is_complex());
        assert_eq!(inst.parts.len(), 2);
        assert_eq!(inst.parts[1].type_name, "IFCB");
        assert_eq!(model.by_type("ifcb")[0].id, 5);
    }

    #[test]
    fn test_lowercase_type_is_uppercased() {
        let model = parse("#1=ifcWall();").unwrap();
        assert_eq!(model.by_id(1).unwrap().type_name(), "IFCWALL");
    }

    #[test]
    fn test_whitespace_and_comments() {
        let model = parse("/* c */ #1 = IFCX ( 1 , /* inner */ 2 ) ;").unwrap();
        assert_eq!(model.by_id(1).unwrap().attributes().len(), 2);
    }

    #[test]
    fn test_duplicate_id() {
        let data = "#1=IFCX();\n#1=IFCY();";
        let err = parse_err(data);
        assert_eq!(err.kind, ValidationErrorKind::DuplicateId);
        let expected = file(data).find("#1=IFCY").unwrap();
        assert_eq!(err.offset, Some(expected));
        assert!(err.line.is_some());
    }

    #[test]
    fn test_duplicate_id_is_reported_before_later_defects() {
        let err = parse_err("#1=IFCX();\n#1=IFCY();\n#2=IFCZ(,);");
        assert_eq!(err.kind, ValidationErrorKind::DuplicateId);
    }

    #[test]
    fn test_punctuation_errors() {
        for data in [
            "#1=IFCX(1,,2);",
            "#1=IFCX(1);;",
            "#1=IFCX(1,);",
            "#1=IFCX((1,2);",
            "#1=IFCX(1));",
            "#1=IFCX(1;",
        ] {
            let err = parse_err(data);
            assert_eq!(
                err.kind,
                ValidationErrorKind::UnbalancedPunctuation,
                "{data}: {err}"
            );
        }
    }

    #[test]
    fn test_syntax_errors() {
        for data in [
            "#1 IFCX();",
            "#1=IFCX(1 2);",
            "#1=IFCX(@);",
            "#1=IFCX('unterminated);",
            "#1=IFCX(IFCLABEL('a','b'));",
            "IFCX();",
        ] {
            let err = parse_err(data);
            assert_eq!(err.kind, ValidationErrorKind::Syntax, "{data}: {err}");
        }
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("#1=IFCX({}{});", "(".repeat(200), ")".repeat(200));
        let err = parse_err(&deep);
        assert_eq!(err.kind, ValidationErrorKind::Syntax);
    }

    #[test]
    fn test_missing_envelope() {
        let options = ParseOptions::default();
        let cases = vec![
            String::new(),
            "HEADER;ENDSEC;".to_string(),
            "ISO-10303-21;\nDATA;\nENDSEC;\nEND-ISO-10303-21;".to_string(),
            format!("{}ENDSEC;\nEND-ISO-10303-21;", HEADER),
            format!("{}DATA;\n#1=IFCX();\n", HEADER),
            format!("{}DATA;\nENDSEC;\n", HEADER),
        ];
        for text in &cases {
            let err = parse_text(text, &options).unwrap_err();
            assert_eq!(err.kind, ValidationErrorKind::MissingRequiredSection, "{text}");
        }
    }

    #[test]
    fn test_trailing_content_after_end() {
        let text = format!("{}#1=IFCX();", file(""));
        let err = parse_text(&text, &ParseOptions::default()).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::Syntax);
    }

    #[test]
    fn test_data_section_parameters() {
        let text = format!(
            "{}DATA(('main'),('IFC4'));\n#1=IFCX();\nENDSEC;\nEND-ISO-10303-21;",
            HEADER
        );
        let model = parse_text(&text, &ParseOptions::default()).unwrap();
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn test_tree_mode_resolves_forward_references() {
        let text = file("#1=IFCX(#2,(#3));\n#2=IFCY();\n#3=IFCZ(#1);");
        let model = parse_text(&text, &ParseOptions::default().with_tree(true)).unwrap();
        let x = model.by_id(1).unwrap();
        assert!(matches!(x[0], Value::Resolved(_)));
        assert_eq!(model.resolve(&x[0]).unwrap().type_name(), "IFCY");
        let list = x[1].as_list().unwrap();
        assert_eq!(model.resolve(&list[0]).unwrap().id, 3);
    }

    #[test]
    fn test_unresolved_reference_only_in_tree_mode() {
        let text = file("#1=IFCX(#42);");
        assert!(parse_text(&text, &ParseOptions::default()).is_ok());

        let err = parse_text(&text, &ParseOptions::default().with_tree(true)).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnresolvedReference);
    }

    #[test]
    fn test_only_header_ignores_garbage_after_header() {
        let text = format!("{}DATA;\n#1=IFCX(,;;; @@@", HEADER);
        let model = parse_text(&text, &ParseOptions::default().only_header(true)).unwrap();
        assert!(model.is_empty());
        assert_eq!(
            model.header().unwrap().file_schema.schema_identifiers,
            ["IFC4X3_ADD2"]
        );
    }

    #[test]
    fn test_without_header_decoding() {
        let text = file("#1=IFCX();").replace("FILE_NAME('test.ifc'", "FILE_NAME(");
        let options = ParseOptions::default().with_header(false);
        // FILE_NAME( followed by ',' is still a syntax defect
        assert!(parse_text(&text, &options).is_err());

        let text = file("#1=IFCX();").replace("FILE_SCHEMA(('IFC4X3_ADD2'));", "");
        let model = parse_text(&text, &options).unwrap();
        assert!(model.header().is_none());
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn test_error_location() {
        let err = parse_err("#1=IFCX();\n#2=IFCY(@);");
        let line = HEADER.lines().count() + 3;
        assert_eq!(err.line, Some(line));
        assert_eq!(err.column, Some(9));
    }
}
