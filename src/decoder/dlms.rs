//! DLMS primitive decoder (C2): date-time octet strings, status bytes, and
//! the scalar field-type conversion used throughout C6.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::decoder::types::StatusFlags;

const ABSENT_VALUE: &str = "0000000000000000";

/// DLMS field-type tags as they appear in the `FieldType` attribute of the
/// source XML (§4.2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    UInt8,
    UInt16,
    UInt32,
    Int8,
    Int16,
    Int32,
    OctetString,
    DoubleLongUnsigned,
    LongUnsigned,
}

impl FieldType {
    pub fn parse(tag: &str) -> Option<Self> {
        Some(match tag {
            "UInt8" => FieldType::UInt8,
            "UInt16" => FieldType::UInt16,
            "UInt32" => FieldType::UInt32,
            "Int8" => FieldType::Int8,
            "Int16" => FieldType::Int16,
            "Int32" => FieldType::Int32,
            "OctetString" => FieldType::OctetString,
            "DoubleLongUnsigned" => FieldType::DoubleLongUnsigned,
            "LongUnsigned" => FieldType::LongUnsigned,
            _ => return None,
        })
    }
}

/// Decode a raw field value string per its field-type tag (§4.2.3).
///
/// Returns `None` for the absent-value sentinel or on parse failure; the
/// caller turns that into a row-level warning rather than a fatal error.
pub fn decode_scalar(raw: &str, field_type: FieldType) -> Option<i64> {
    if raw == ABSENT_VALUE {
        return None;
    }

    let radix = match field_type {
        FieldType::UInt8
        | FieldType::UInt16
        | FieldType::UInt32
        | FieldType::Int8
        | FieldType::Int16
        | FieldType::Int32 => 10,
        FieldType::OctetString => {
            if raw.len() > 8 {
                16
            } else {
                10
            }
        }
        FieldType::DoubleLongUnsigned | FieldType::LongUnsigned => 16,
    };

    i64::from_str_radix(raw.trim_start_matches("0x"), radix).ok()
}

/// Decode a 12-byte DLMS date-time octet string (24 hex chars) to a UTC
/// instant (§4.2.1).
pub fn decode_datetime(hex: &str) -> Result<DateTime<Utc>, String> {
    let hex = hex.trim();
    if hex.len() < 24 {
        return Err(format!(
            "malformed-timestamp: expected 24 hex chars, got {}",
            hex.len()
        ));
    }

    let byte = |offset: usize, width: usize| -> Result<u32, String> {
        u32::from_str_radix(&hex[offset * 2..(offset + width) * 2], 16)
            .map_err(|e| format!("malformed-timestamp: {e}"))
    };

    let year = byte(0, 2)? as i32;
    let month = byte(2, 1)?;
    let day = byte(3, 1)?;
    // byte(4, 1) is day-of-week; ignored per §4.2.1.
    let hour = byte(5, 1)?;
    let minute = byte(6, 1)?;
    let second = byte(7, 1)?;
    // byte(8, 1) is hundredths-of-a-second; ignored.

    let deviation_raw = u16::from_str_radix(&hex[9 * 2..11 * 2], 16)
        .map_err(|e| format!("malformed-timestamp: {e}"))?;
    let deviation_minutes = deviation_raw as i16;

    if !(1970..=2100).contains(&year) {
        return Err(format!("malformed-timestamp: year {year} out of range"));
    }

    let local = Utc
        .with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .ok_or_else(|| "malformed-timestamp: invalid civil date/time fields".to_string())?;

    // local = utc + deviation  =>  utc = local - deviation
    let utc = local - Duration::minutes(deviation_minutes as i64);
    Ok(utc)
}

/// Encode a UTC instant back into the 24-hex-char DLMS form. Exists mainly
/// for round-trip tests; `deviation_minutes` and `dst` are supplied by the
/// caller since neither is recoverable from a bare `DateTime<Utc>`.
pub fn encode_datetime(instant: DateTime<Utc>, deviation_minutes: i16, dst: bool) -> String {
    let local = instant + Duration::minutes(deviation_minutes as i64);
    let mut status_byte: u8 = 0;
    if dst {
        status_byte |= 0x10;
    }

    format!(
        "{:04X}{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}{:04X}{:02X}",
        local.format("%Y").to_string().parse::<u32>().unwrap_or(0),
        local.format("%m").to_string().parse::<u32>().unwrap_or(0),
        local.format("%d").to_string().parse::<u32>().unwrap_or(0),
        0xFFu32, // day-of-week unspecified
        local.format("%H").to_string().parse::<u32>().unwrap_or(0),
        local.format("%M").to_string().parse::<u32>().unwrap_or(0),
        local.format("%S").to_string().parse::<u32>().unwrap_or(0),
        0u32, // hundredths, not recoverable
        deviation_minutes as u16,
        status_byte,
    )
}

pub fn decode_status(byte: u8) -> StatusFlags {
    StatusFlags::decode(byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_scenario_1_timestamp() {
        // 07E7 07 0A 01 11 1E 00 00 FF 88 80
        let instant = decode_datetime("07E7070A01111E0000FF8880").unwrap();
        assert_eq!(instant.to_rfc3339(), "2023-07-10T19:30:00+00:00");
    }

    #[test]
    fn rejects_short_input() {
        assert!(decode_datetime("07E7070A0111").is_err());
    }

    #[test]
    fn rejects_year_out_of_range() {
        // year encoded as 0x0001 = 1, well outside [1970, 2100]
        assert!(decode_datetime("0001070A01111E0000FF0000").is_err());
    }

    #[test]
    fn encode_decode_round_trip() {
        let original = decode_datetime("07E7070A01111E0000FF8880").unwrap();
        let reencoded = encode_datetime(original, -120, true);
        let reparsed = decode_datetime(&reencoded).unwrap();
        assert_eq!(original, reparsed);
    }

    #[test]
    fn status_word_invalid_data_bit() {
        let flags = decode_status(0x02);
        assert!(flags.invalid_data);
        assert_eq!(flags.quality(), crate::decoder::types::Quality::Invalid);
    }

    #[test]
    fn status_word_power_failure_quality() {
        let flags = decode_status(0x04);
        assert_eq!(flags.quality(), crate::decoder::types::Quality::DegradedPowerFailure);
    }

    #[test]
    fn status_word_clock_adjusted_quality() {
        let flags = decode_status(0x08);
        assert_eq!(flags.quality(), crate::decoder::types::Quality::ClockAdjusted);
    }

    #[test]
    fn status_word_good_quality_when_no_bits_set() {
        assert_eq!(decode_status(0x00).quality(), crate::decoder::types::Quality::Good);
    }

    #[test]
    fn decode_scalar_uint32_radix10() {
        assert_eq!(decode_scalar("1930", FieldType::UInt32), Some(1930));
    }

    #[test]
    fn decode_scalar_absent_value_is_none() {
        assert_eq!(decode_scalar(ABSENT_VALUE, FieldType::UInt32), None);
    }

    #[test]
    fn decode_scalar_octet_string_short_is_radix10() {
        assert_eq!(decode_scalar("12345", FieldType::OctetString), Some(12345));
    }

    #[test]
    fn decode_scalar_octet_string_long_is_radix16() {
        assert_eq!(
            decode_scalar("0100010800FF", FieldType::OctetString),
            Some(0x0100010800FF)
        );
    }

    #[test]
    fn decode_scalar_double_long_unsigned_is_radix16() {
        assert_eq!(decode_scalar("0000078A", FieldType::DoubleLongUnsigned), Some(0x78A));
    }
}
