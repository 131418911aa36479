//! Tabular-text parser (C4): semicolon-separated meter exports with an
//! identifier line, an OBIS header line, and timestamped data rows.
//!
//! Grounded in `original_source/parsers.py`'s `BlueLinkCSVParser`, rewritten
//! against the registry and `chrono` instead of a hand-rolled OBIS map and
//! naive `datetime`.

use chrono::{TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::decoder::error::{DecodeError, DecodeResult};
use crate::decoder::obis::REGISTRY;
use crate::decoder::types::{FileResult, MeterReading, Quality};

static OBIS_HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+-\d+:\d+\.\d+\.\d+").unwrap());

/// Cascading byte decode: `utf-8-sig`, `utf-8`, `latin-1`, `cp1252`, in
/// order, retaining the first successful decode. A leading BOM is stripped.
///
/// ISO-8859-1 (latin-1) maps every byte 1:1 onto U+0000..=U+00FF, so once
/// plain UTF-8 fails it always succeeds via `encoding_rs::mem::decode_latin1`
/// — `cp1252` is never actually reached, matching the original's own
/// `encode('utf-8', errors='ignore')` fallback, which likewise never raised
/// past that point. `DecodeError::EncodingFailed` stays in the taxonomy
/// (§7) for a host that swaps this arm for something fallible.
fn decode_with_fallback(bytes: &[u8]) -> DecodeResult<String> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    if let Ok(s) = std::str::from_utf8(bytes) {
        return Ok(s.to_string());
    }

    log::debug!("utf-8 decode failed, falling back to latin-1");
    Ok(encoding_rs::mem::decode_latin1(bytes).into_owned())
}

fn extract_obis_codes(header_line: &str) -> Vec<String> {
    OBIS_HEADER_RE
        .find_iter(header_line)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Parse one data row: `DD/MM/YYYY HH:MM:SS;v1;v2;...` positionally aligned
/// with `obis_codes`. Non-numeric or unmapped-column cells are skipped from
/// the reading stream (§4.4) but still surfaced as row-level warnings (§7);
/// returns the readings produced plus any warnings for this row.
fn parse_data_line(
    line: &str,
    obis_codes: &[String],
    meter_id: &str,
    line_num: usize,
) -> (Vec<MeterReading>, Vec<String>) {
    let fields: Vec<&str> = line.split(';').collect();
    if fields.is_empty() {
        return (Vec::new(), vec![format!("line {line_num}: empty row")]);
    }

    let timestamp = match parse_local_timestamp(fields[0].trim()) {
        Some(ts) => ts,
        None => {
            let warning = format!("line {line_num}: malformed-timestamp '{}'", fields[0]);
            log::warn!("{warning}");
            return (Vec::new(), vec![warning]);
        }
    };

    let mut readings = Vec::new();
    let mut warnings = Vec::new();
    for (i, code) in obis_codes.iter().enumerate() {
        let Some(raw_cell) = fields.get(i + 1) else {
            continue;
        };
        let normalized = raw_cell.trim().replace(',', ".");
        let Ok(value) = normalized.parse::<f64>() else {
            let warning = format!("line {line_num}: non-numeric value '{raw_cell}' for {code}, skipped");
            log::warn!("{warning}");
            warnings.push(warning);
            continue;
        };

        let Some(entry) = REGISTRY.lookup_dotted(code) else {
            let warning = format!("line {line_num}: unmapped OBIS code '{code}', column skipped");
            log::warn!("{warning}");
            warnings.push(warning);
            continue;
        };

        readings.push(MeterReading {
            timestamp,
            value,
            channel_id: entry.channel_id.clone(),
            unit: entry.unit,
            quality: Quality::Good,
            meter_id: meter_id.to_string(),
        });
    }

    (readings, warnings)
}

/// Parses `DD/MM/YYYY HH:MM:SS` and tags the result UTC without any offset
/// math (§4.4, §9 open question: identity conversion is the default).
fn parse_local_timestamp(text: &str) -> Option<chrono::DateTime<Utc>> {
    let (date_part, time_part) = text.split_once(' ')?;
    let mut date_fields = date_part.split('/');
    let day: u32 = date_fields.next()?.parse().ok()?;
    let month: u32 = date_fields.next()?.parse().ok()?;
    let year: i32 = date_fields.next()?.parse().ok()?;

    let mut time_fields = time_part.split(':');
    let hour: u32 = time_fields.next()?.parse().ok()?;
    let minute: u32 = time_fields.next()?.parse().ok()?;
    let second: u32 = time_fields.next().unwrap_or("0").parse().ok()?;

    Utc.with_ymd_and_hms(year, month, day, hour, minute, second).single()
}

pub fn parse(bytes: &[u8], filename: &str) -> FileResult {
    let mut result = FileResult::new(filename);

    let content = match decode_with_fallback(bytes) {
        Ok(c) => c,
        Err(e) => {
            result.success = false;
            result.errors.push(e.to_string());
            return result;
        }
    };

    let lines: Vec<&str> = content.lines().collect();
    if lines.len() < 3 {
        result.success = false;
        result.errors.push(DecodeError::FileTooShort.to_string());
        return result;
    }

    let meter_id = lines[0].trim();
    if meter_id.is_empty() {
        result.success = false;
        result.errors.push(DecodeError::MissingIdentifier.to_string());
        return result;
    }

    let obis_codes = extract_obis_codes(lines[2]);
    if obis_codes.is_empty() {
        result.success = false;
        result.errors.push(DecodeError::MissingObisHeader.to_string());
        return result;
    }

    for (i, line) in lines.iter().enumerate().skip(3) {
        if line.trim().is_empty() {
            continue;
        }
        let (readings, line_warnings) = parse_data_line(line, &obis_codes, meter_id, i + 1);
        result.readings.extend(readings);
        for warning in line_warnings {
            result.warn(warning);
        }
    }

    if result.readings.is_empty() {
        result.warn("no valid readings found");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_5_tabular_round_trip() {
        let body = "CLDN123\nFree text line\n1-0:1.8.0;1-0:5.8.0\n26/08/2025 00:15:00;12,34;56,78\n";
        let result = parse(body.as_bytes(), "test.csv");
        assert!(result.success);
        assert_eq!(result.readings.len(), 2);
        assert_eq!(result.readings[0].value, 12.34);
        assert_eq!(result.readings[0].unit, crate::decoder::types::Unit::KWh);
        assert_eq!(result.readings[1].value, 56.78);
        assert_eq!(result.readings[1].unit, crate::decoder::types::Unit::Kvarh);
        assert_eq!(
            result.readings[0].timestamp.to_rfc3339(),
            "2025-08-26T00:15:00+00:00"
        );
    }

    #[test]
    fn fails_fatally_on_missing_identifier() {
        let body = "\nfree text\n1-0:1.8.0\n01/01/2025 00:00:00;1,0\n";
        let result = parse(body.as_bytes(), "test.csv");
        assert!(!result.success);
    }

    #[test]
    fn fails_fatally_when_too_short() {
        let body = "CLDN123\nonly two lines";
        let result = parse(body.as_bytes(), "test.csv");
        assert!(!result.success);
    }

    #[test]
    fn fails_fatally_with_no_obis_header() {
        let body = "CLDN123\nfree text\nnot an obis header\n01/01/2025 00:00:00;1,0\n";
        let result = parse(body.as_bytes(), "test.csv");
        assert!(!result.success);
    }

    #[test]
    fn strips_utf8_bom() {
        let mut body = vec![0xEF, 0xBB, 0xBF];
        body.extend_from_slice(
            b"CLDN123\nfree text\n1-0:1.8.0\n26/08/2025 00:15:00;12,34\n",
        );
        let result = parse(&body, "test.csv");
        assert!(result.success);
        assert_eq!(result.readings.len(), 1);
    }

    #[test]
    fn non_numeric_cell_is_skipped_and_warned() {
        let body = "CLDN123\nfree text\n1-0:1.8.0;1-0:5.8.0\n26/08/2025 00:15:00;N/A;56,78\n";
        let result = parse(body.as_bytes(), "test.csv");
        assert!(result.success);
        assert_eq!(result.readings.len(), 1);
        assert_eq!(result.readings[0].unit, crate::decoder::types::Unit::Kvarh);
        assert!(result.warnings.iter().any(|w| w.contains("non-numeric value")));
    }

    #[test]
    fn unmapped_obis_column_produces_no_reading_but_warns() {
        let body = "CLDN123\nfree text\n9-9:99.99.99\n26/08/2025 00:15:00;12,34\n";
        let result = parse(body.as_bytes(), "test.csv");
        assert!(result.success);
        assert!(result.readings.is_empty());
        assert!(result.warnings.iter().any(|w| w.contains("unmapped OBIS code")));
    }
}
