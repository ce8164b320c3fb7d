//! Catalog file parsers.
//!
//! Turns raw XML, CSV or ZIP bytes into normalized
//! [`ImportProductRequest`]s plus non-fatal [`ImportValidationError`]s.
//! Parsing is pure: no I/O beyond the byte slice handed in.

pub mod archive;
pub mod csv_import;
pub mod error;
mod fields;
pub mod preview;
mod record;
pub mod xml_import;

use sfimport_core::{FileType, ImportProductRequest, ImportValidationError};

pub use archive::parse_zip;
pub use csv_import::{csv_template, parse_csv};
pub use error::ParseError;
pub use preview::{preview_records, summarize, RecordPreview, ValidationSummary};
pub use record::CSV_COLUMNS;
pub use xml_import::parse_xml;

/// Products and validation errors produced from one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutput {
    pub products: Vec<ImportProductRequest>,
    pub errors: Vec<ImportValidationError>,
}

impl ParseOutput {
    /// Appends another result, keeping file order.
    pub fn extend(&mut self, other: ParseOutput) {
        self.products.extend(other.products);
        self.errors.extend(other.errors);
    }

    /// Marks every record and error as coming from archive entry `source`.
    pub fn tag_source(&mut self, source: &str) {
        for product in &mut self.products {
            product.source = Some(source.to_string());
        }
        for error in &mut self.errors {
            error.source = Some(source.to_string());
        }
    }
}

/// Parses `bytes` with the parser for `file_type`.
///
/// # Errors
///
/// Returns a [`ParseError`] when the file is rejected as a whole.
pub fn parse_file(file_type: FileType, bytes: &[u8]) -> Result<ParseOutput, ParseError> {
    match file_type {
        FileType::Csv => parse_csv(bytes),
        FileType::Xml => parse_xml(bytes),
        FileType::Zip => parse_zip(bytes),
    }
}

/// Like [`parse_file`], inferring the format from the file extension.
///
/// # Errors
///
/// Returns [`ParseError::UnsupportedFileType`] for an unknown extension, or
/// any error of the selected parser.
pub fn parse_named(file_name: &str, bytes: &[u8]) -> Result<ParseOutput, ParseError> {
    let file_type = FileType::from_file_name(file_name)
        .ok_or_else(|| ParseError::UnsupportedFileType(file_name.to_string()))?;
    parse_file(file_type, bytes)
}
