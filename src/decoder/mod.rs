//! Decoder core: turns raw bytes from a meter export file into a canonical
//! [`MeterReading`] stream plus a completeness audit, behind one facade.

pub mod assemble;
pub mod completeness;
pub mod dispatch;
pub mod dlms;
pub mod error;
pub mod layout;
pub mod obis;
pub mod scaling;
pub mod spreadsheet;
pub mod tabular;
pub mod types;
pub mod xml;

pub use completeness::{audit, CompletenessReport};
pub use error::{DecodeError, DecodeResult};
pub use obis::REGISTRY;
pub use types::{CaptureLayout, DecodeOptions, FileResult, MeterReading, Quality, StatusFlags, Unit};

fn apply_options(mut result: FileResult, options: &DecodeOptions) -> FileResult {
    if let Some(forced) = &options.forced_meter_id {
        for reading in &mut result.readings {
            if reading.meter_id.is_empty() {
                reading.meter_id = forced.clone();
            }
        }
    }
    result
}

/// Decode one file's bytes. For a plain `csv`/`xlsx`/`xls`/`xml` file this
/// is the single `FileResult` for that file; a `zip` archive is rejected
/// here since it expands into more than one result — use
/// [`decode_archive_bytes`] for those (§4.10/§4.11).
pub fn decode_bytes(bytes: &[u8], filename: &str, options: &DecodeOptions) -> FileResult {
    let mut results = dispatch::dispatch(bytes, filename);
    let result = if results.len() == 1 {
        results.remove(0)
    } else {
        FileResult::fatal(
            filename,
            "archive produced multiple entries; use decode_archive_bytes",
        )
    };
    apply_options(result, options)
}

/// [`decode_bytes`], reading the file from disk first — the only I/O this
/// crate performs (§5).
pub fn decode_file(path: &std::path::Path, options: &DecodeOptions) -> FileResult {
    let filename = path.to_string_lossy().to_string();
    match std::fs::read(path) {
        Ok(bytes) => decode_bytes(&bytes, &filename, options),
        Err(e) => FileResult::fatal(filename, DecodeError::Io(e).to_string()),
    }
}

/// Decode bytes that may be a `zip` archive, producing one `FileResult` per
/// entry (or per top-level file, for the non-archive case) — §4.10's full
/// dispatch surface.
pub fn decode_archive_bytes(bytes: &[u8], filename: &str, options: &DecodeOptions) -> Vec<FileResult> {
    dispatch::dispatch(bytes, filename)
        .into_iter()
        .map(|r| apply_options(r, options))
        .collect()
}

/// [`decode_archive_bytes`], reading the file from disk first.
pub fn decode_archive_file(path: &std::path::Path, options: &DecodeOptions) -> Vec<FileResult> {
    let filename = path.to_string_lossy().to_string();
    match std::fs::read(path) {
        Ok(bytes) => decode_archive_bytes(&bytes, &filename, options),
        Err(e) => vec![FileResult::fatal(filename, DecodeError::Io(e).to_string())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_options_backfills_only_empty_meter_id() {
        let mut result = FileResult::new("test.csv");
        result.readings.push(MeterReading {
            timestamp: chrono::Utc::now(),
            value: 1.0,
            channel_id: "chan".to_string(),
            unit: Unit::KWh,
            quality: Quality::Good,
            meter_id: String::new(),
        });
        result.readings.push(MeterReading {
            timestamp: chrono::Utc::now(),
            value: 2.0,
            channel_id: "chan".to_string(),
            unit: Unit::KWh,
            quality: Quality::Good,
            meter_id: "ALREADY-SET".to_string(),
        });
        let options = DecodeOptions {
            forced_meter_id: Some("FORCED".to_string()),
            source_tz_hint: None,
        };
        let result = apply_options(result, &options);
        assert_eq!(result.readings[0].meter_id, "FORCED");
        assert_eq!(result.readings[1].meter_id, "ALREADY-SET");
    }

    #[test]
    fn decode_bytes_leaves_parser_supplied_meter_id_untouched() {
        let body = b"CLDN123\nfree text\n1-0:1.8.0\n26/08/2025 00:15:00;12,34\n";
        let options = DecodeOptions {
            forced_meter_id: Some("FORCED".to_string()),
            source_tz_hint: None,
        };
        let result = decode_bytes(body, "test.csv", &options);
        assert!(result.success);
        assert_eq!(result.readings[0].meter_id, "CLDN123");
    }

    #[test]
    fn decode_archive_bytes_rejects_nothing_single_file_passes_through() {
        let body = b"CLDN123\nfree text\n1-0:1.8.0\n26/08/2025 00:15:00;12,34\n";
        let results = decode_archive_bytes(body, "test.csv", &DecodeOptions::default());
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
    }
}
