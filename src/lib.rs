//! Decoder core for heterogeneous electricity-meter export formats
//! (tabular, spreadsheet, DLMS/XML) into a canonical per-channel reading
//! stream, plus a completeness audit over that stream.

pub mod decoder;

pub use decoder::{
    audit, decode_archive_bytes, decode_archive_file, decode_bytes, decode_file,
    CompletenessReport, DecodeError, DecodeOptions, DecodeResult, FileResult, MeterReading,
    Quality, Unit, REGISTRY,
};
