//! Reading assembler (C8): a pure combinator with no state and no I/O.

use chrono::{DateTime, Utc};

use crate::decoder::dlms::FieldType;
use crate::decoder::obis::{ValidationTag, REGISTRY};
use crate::decoder::scaling;
use crate::decoder::types::{MeterReading, StatusFlags, Unit};

/// Build a `MeterReading` from a decoded channel/value/status tuple,
/// alongside any row-level warnings the assembly decided to surface (§7:
/// unmapped OBIS code, unit unknown defaulted to `kWh`).
///
/// Returns `None` when `status.invalid_data` is set (§4.2.2: the caller
/// must skip the record) or when the raw value decodes to the
/// absent-value sentinel upstream (callers only invoke this once
/// `dlms::decode_scalar` has already produced `Some`).
pub fn assemble(
    obis_hex: &str,
    raw: i64,
    field_type: FieldType,
    timestamp: DateTime<Utc>,
    status: StatusFlags,
    meter_id: &str,
    scaler_override: Option<f64>,
) -> (Option<MeterReading>, Vec<String>) {
    if status.invalid_data {
        return (None, Vec::new());
    }

    let entry = REGISTRY.describe_hex(obis_hex);
    let mut warnings = Vec::new();

    if entry.validation == ValidationTag::Unknown {
        let warning = format!("unmapped OBIS code '{obis_hex}'");
        log::warn!("{warning}");
        warnings.push(warning);
    }

    let (value, unit) = scaling::resolve(&entry, field_type, raw, scaler_override);

    if entry.unit == Unit::Unknown {
        let warning = format!("unit unknown for OBIS code '{obis_hex}', defaulted to kWh");
        log::warn!("{warning}");
        warnings.push(warning);
    }

    (
        Some(MeterReading {
            timestamp,
            value,
            channel_id: entry.channel_id,
            unit,
            quality: status.quality(),
            meter_id: meter_id.to_string(),
        }),
        warnings,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::types::Quality;

    #[test]
    fn scenario_2_profile_record_with_good_status() {
        let ts = Utc::now();
        let (reading, warnings) = assemble(
            "0100010800FF",
            1930,
            FieldType::UInt32,
            ts,
            StatusFlags::decode(0x00),
            "METER-1",
            None,
        );
        let reading = reading.unwrap();
        assert_eq!(reading.value, 1.930);
        assert_eq!(reading.channel_id, "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.73.0");
        assert_eq!(reading.quality, Quality::Good);
        assert!(warnings.is_empty());
    }

    #[test]
    fn scenario_3_invalid_status_drops_record() {
        let ts = Utc::now();
        let (reading, warnings) = assemble(
            "0100010800FF",
            1930,
            FieldType::UInt32,
            ts,
            StatusFlags::decode(0x02),
            "METER-1",
            None,
        );
        assert!(reading.is_none());
        assert!(warnings.is_empty());
    }

    #[test]
    fn unmapped_obis_code_produces_a_warning() {
        let ts = Utc::now();
        let (reading, warnings) = assemble(
            "DEADBEEFCAFE",
            1930,
            FieldType::UInt32,
            ts,
            StatusFlags::decode(0x00),
            "METER-1",
            None,
        );
        assert!(reading.is_some());
        assert_eq!(warnings.len(), 2); // unmapped code, then unit unknown
    }
}
