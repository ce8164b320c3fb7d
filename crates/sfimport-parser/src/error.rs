use thiserror::Error;

/// Fatal parse failures. Any of these rejects the whole file; per-record
/// problems are reported as [`sfimport_core::ImportValidationError`] instead.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("missing required CSV headers: {}", .0.join(", "))]
    MissingHeaders(Vec<String>),

    #[error("file is empty")]
    EmptyFile,

    #[error("file is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML document does not contain any recognised product records")]
    UnrecognizedSchema,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
}
