// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-file inspection reports for serialization.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use simple_spf_core::{Error, FileModel, HeaderSection};

/// Outcome of parsing one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    pub valid: bool,
    /// Number of data instances (0 for header-only parses).
    pub instances: usize,
    /// Instance count per entity type, sorted by name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub entity_types: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<HeaderSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

/// Error details.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl FileReport {
    /// Build a report from a parse result.
    pub fn new(path: &Path, result: Result<FileModel, Error>) -> Self {
        let path = path.display().to_string();
        match result {
            Ok(model) => Self {
                path,
                valid: true,
                instances: model.len(),
                entity_types: model
                    .types()
                    .map(|(name, count)| (name.to_string(), count))
                    .collect(),
                header: model.header().cloned(),
                error: None,
            },
            Err(err) => Self {
                path,
                valid: false,
                instances: 0,
                entity_types: BTreeMap::new(),
                header: None,
                error: Some(ErrorReport::from(&err)),
            },
        }
    }
}

impl From<&Error> for ErrorReport {
    fn from(err: &Error) -> Self {
        match err {
            Error::Validation(e) => Self {
                kind: e.kind.as_str().to_string(),
                message: e.message.clone(),
                line: e.line,
                column: e.column,
            },
            Error::Io(e) => Self {
                kind: "io".to_string(),
                message: e.to_string(),
                line: None,
                column: None,
            },
            Error::InvalidOptions(msg) => Self {
                kind: "invalid-options".to_string(),
                message: msg.to_string(),
                line: None,
                column: None,
            },
        }
    }
}

/// Summary over every report.
#[derive(Debug, Serialize)]
pub struct Summary<'a> {
    pub files: usize,
    pub valid: usize,
    pub invalid: usize,
    pub reports: &'a [FileReport],
}

impl<'a> Summary<'a> {
    pub fn new(reports: &'a [FileReport]) -> Self {
        let valid = reports.iter().filter(|r| r.valid).count();
        Self {
            files: reports.len(),
            valid,
            invalid: reports.len() - valid,
            reports,
        }
    }
}
