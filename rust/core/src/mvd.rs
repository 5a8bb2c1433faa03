// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model View Definition metadata
//!
//! Some exporters embed bracketed annotations in the first argument of
//! `FILE_DESCRIPTION`:
//!
//! ```text
//! FILE_DESCRIPTION((
//!     'ViewDefinition [ReferenceView_V1.2]',
//!     'Option [ExcludedObjects: Ramp, Stair; SplitWalls: Yes]',
//!     'Comment [exported by a test]'), '2;1');
//! ```
//!
//! Each string is `Keyword [body]` where the body is a `;`-separated list of
//! groups, and a group is either `key: v1, v2` or just `v1, v2`. Strings that
//! do not follow this pattern are kept as comments.

use std::collections::BTreeMap;

use nom::{
    bytes::complete::take_while,
    character::complete::{char, multispace0, satisfy},
    combinator::{all_consuming, map, recognize},
    multi::{many1, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};

/// Values collected for one MVD keyword
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MvdField {
    /// Unkeyed values in order of appearance
    pub values: Vec<String>,
    /// `key: values` groups, repeated keys append
    pub entries: BTreeMap<String, Vec<String>>,
}

impl MvdField {
    /// All values of a key
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// First value of a key
    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    /// True if `item` appears as an unkeyed value or under any key
    pub fn contains(&self, item: &str) -> bool {
        self.values.iter().any(|v| v == item)
            || self.entries.values().flatten().any(|v| v == item)
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty() && self.entries.is_empty()
    }
}

/// Decoded MVD annotations, keyed by normalized keyword
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MvdInfo {
    fields: BTreeMap<String, MvdField>,
}

impl MvdInfo {
    /// Decode the description strings of `FILE_DESCRIPTION`.
    ///
    /// Returns `None` when no string uses the bracketed keyword pattern.
    pub fn parse<S: AsRef<str>>(description: &[S]) -> Option<Self> {
        let mut info = MvdInfo::default();
        let mut unkeyed = Vec::new();
        let mut matched = false;

        for text in description.iter().map(AsRef::as_ref) {
            match annotations(text) {
                Ok((_, entries)) => {
                    matched = true;
                    for (keyword, body) in entries {
                        info.add(keyword, body);
                    }
                }
                Err(_) => {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        unkeyed.push(trimmed.to_string());
                    }
                }
            }
        }

        if !matched {
            return None;
        }
        if !unkeyed.is_empty() {
            info.fields
                .entry(COMMENTS.to_string())
                .or_default()
                .values
                .extend(unkeyed);
        }
        Some(info)
    }

    fn add(&mut self, keyword: &str, body: &str) {
        let name = normalize_keyword(keyword);
        let field = self.fields.entry(name.clone()).or_default();

        if name == COMMENTS {
            let body = body.trim();
            if !body.is_empty() {
                field.values.push(body.to_string());
            }
            return;
        }

        match groups(body) {
            Ok((_, groups)) => {
                for group in groups {
                    match group {
                        Group::Keyed(key, values) => field
                            .entries
                            .entry(key.to_string())
                            .or_default()
                            .extend(values.into_iter().filter(|v| !v.is_empty()).map(str::to_string)),
                        Group::Plain(values) => field
                            .values
                            .extend(values.into_iter().filter(|v| !v.is_empty()).map(str::to_string)),
                    }
                }
            }
            // The body grammar accepts any bracket-free text
            Err(_) => field.values.push(body.trim().to_string()),
        }

        if field.is_empty() {
            tracing::trace!(keyword, "empty MVD annotation");
        }
    }

    /// Field by raw (`ViewDefinition`) or normalized (`view_definitions`) keyword
    pub fn field(&self, keyword: &str) -> Option<&MvdField> {
        self.fields
            .get(keyword)
            .or_else(|| self.fields.get(&normalize_keyword(keyword)))
    }

    /// Normalized keywords present
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn view_definitions(&self) -> &[String] {
        self.values_of("view_definitions")
    }

    pub fn exchange_requirements(&self) -> &[String] {
        self.values_of("exchange_requirements")
    }

    /// `Option [...]` annotations
    pub fn options(&self) -> Option<&MvdField> {
        self.fields.get("options")
    }

    /// `Remark [...]` annotations
    pub fn remark(&self) -> Option<&MvdField> {
        self.fields.get("remark")
    }

    /// `Comment [...]` bodies followed by any non-annotation description strings
    pub fn comments(&self) -> &[String] {
        self.values_of(COMMENTS)
    }

    fn values_of(&self, keyword: &str) -> &[String] {
        self.fields
            .get(keyword)
            .map(|f| f.values.as_slice())
            .unwrap_or(&[])
    }
}

const COMMENTS: &str = "comments";

/// Map an annotation keyword to its field name
fn normalize_keyword(keyword: &str) -> String {
    match keyword.to_ascii_lowercase().as_str() {
        "viewdefinition" | "viewdefinitions" | "view_definitions" => "view_definitions".into(),
        "exchangerequirement" | "exchangerequirements" | "exchange_requirements" => {
            "exchange_requirements".into()
        }
        "option" | "options" => "options".into(),
        "comment" | "comments" => COMMENTS.into(),
        "remark" | "remarks" => "remark".into(),
        _ => snake_case(keyword),
    }
}

fn snake_case(keyword: &str) -> String {
    let mut out = String::with_capacity(keyword.len() + 4);
    let mut prev_lower = false;
    for c in keyword.chars() {
        if c.is_ascii_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        out.push(c.to_ascii_lowercase());
    }
    out
}

enum Group<'a> {
    Keyed(&'a str, Vec<&'a str>),
    Plain(Vec<&'a str>),
}

/// Annotation keyword: ViewDefinition, ExchangeRequirement
fn annotation_keyword(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

/// One `Keyword [body]`
fn annotation(input: &str) -> IResult<&str, (&str, &str)> {
    tuple((
        preceded(multispace0, annotation_keyword),
        preceded(
            multispace0,
            delimited(char('['), take_while(|c: char| c != '[' && c != ']'), char(']')),
        ),
    ))(input)
}

/// A whole description string made of annotations
fn annotations(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    all_consuming(terminated(many1(annotation), multispace0))(input)
}

fn item(input: &str) -> IResult<&str, &str> {
    map(take_while(|c: char| !matches!(c, ',' | ';' | ':')), str::trim)(input)
}

fn keyed_group(input: &str) -> IResult<&str, Group<'_>> {
    map(
        separated_pair(item, char(':'), separated_list1(char(','), item)),
        |(key, values)| Group::Keyed(key, values),
    )(input)
}

fn group(input: &str) -> IResult<&str, Group<'_>> {
    let (rest, values) = separated_list1(char(','), item)(input)?;
    if rest.starts_with(':') {
        keyed_group(input)
    } else {
        Ok((rest, Group::Plain(values)))
    }
}

/// Body of an annotation: groups separated by ';'
fn groups(input: &str) -> IResult<&str, Vec<Group<'_>>> {
    all_consuming(separated_list0(char(';'), group))(input)
}
