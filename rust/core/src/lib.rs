// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # simple-spf core
//!
//! Validating parser for STEP physical files (ISO-10303-21), the text
//! encoding used by IFC. Built with [nom](https://docs.rs/nom).
//!
//! ## Overview
//!
//! - **Tokenization**: zero-copy lexer with STEP string escapes and comments
//! - **Header**: `FILE_DESCRIPTION`, `FILE_NAME`, `FILE_SCHEMA`, plus MVD
//!   annotations embedded in the description
//! - **Data section**: simple and complex instances with nested argument values
//! - **File model**: lookup by id and by type, optional reference resolution
//! - **Validation**: fail-fast, one error family for every structural defect
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use simple_spf_core::{open, ParseOptions};
//!
//! let model = open("model.ifc", ParseOptions::default().with_tree(true))?;
//! let person = model.by_type("ifcperson")[0];
//! println!("#{} = {}", person.id, person.type_name());
//!
//! if let Some(header) = model.header() {
//!     println!("schema: {:?}", header.file_schema.schema_identifiers);
//! }
//! ```
//!
//! ## Header-only probes
//!
//! ```rust,ignore
//! let options = ParseOptions::default().only_header(true);
//! let model = open("huge.ifc", options)?; // reads just enough bytes for the header
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization support for parsed data

pub mod error;
pub mod header;
pub mod lexer;
pub mod model;
pub mod mvd;
mod parser;
pub mod source;
pub mod value;

pub use error::{Error, NotFoundError, Result, ValidationError, ValidationErrorKind};
pub use header::{FileDescription, FileName, FileSchema, HeaderSection};
pub use lexer::{Lexer, Token, TokenKind};
pub use model::{EntityInstance, EntityPart, FileModel};
pub use mvd::{MvdField, MvdInfo};
pub use source::{open, parse, ParseOptions, Source};
pub use value::{EntityHandle, Value};
