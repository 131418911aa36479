//! File-level fatal error taxonomy.
//!
//! Row/record-level problems never reach this type: they accumulate as
//! plain strings in [`crate::decoder::FileResult::warnings`] and leave the
//! decode in progress. Only conditions that make the rest of the file
//! unrecoverable are represented here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("xml not well-formed: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("tabular file missing meter identifier")]
    MissingIdentifier,

    #[error("tabular file has no OBIS header codes")]
    MissingObisHeader,

    #[error("tabular file is too short (need at least 3 lines)")]
    FileTooShort,

    #[error("no readable sheet found in workbook")]
    NoReadableSheet,

    #[error("could not decode file bytes with any known encoding")]
    EncodingFailed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DecodeResult<T> = Result<T, DecodeError>;
