//! Scaling & unit resolver (C3): turns a raw integer field value into the
//! canonical `(value, unit)` pair for a channel, per §4.3.

use crate::decoder::dlms::FieldType;
use crate::decoder::obis::ObisEntry;
use crate::decoder::types::Unit;

/// Resolve `(value, unit)` for a reading.
///
/// `scaler_override`, when `Some`, comes from a device-supplied `scaler`
/// attribute on the source `Attributes` element (§9, resolved open
/// question) and takes precedence over every heuristic row below.
pub fn resolve(
    entry: &ObisEntry,
    field_type: FieldType,
    raw: i64,
    scaler_override: Option<f64>,
) -> (f64, Unit) {
    if let Some(scaler) = scaler_override {
        return (raw as f64 * scaler, entry.unit);
    }

    match entry.unit {
        Unit::KWh | Unit::Kvarh | Unit::KVAh => (raw as f64 / 1000.0, entry.unit),
        Unit::Volt => {
            let divisor = if field_type == FieldType::UInt16 { 10.0 } else { 1.0 };
            (raw as f64 / divisor, Unit::Volt)
        }
        Unit::Ampere => {
            let divisor = if field_type == FieldType::UInt16 {
                if raw > 10_000 {
                    10.0
                } else {
                    100.0
                }
            } else {
                1.0
            };
            (raw as f64 / divisor, Unit::Ampere)
        }
        Unit::Hertz => {
            let divisor = match field_type {
                FieldType::UInt32 if raw < 1000 => 10.0,
                FieldType::UInt16 => 100.0,
                _ => 10.0,
            };
            (raw as f64 / divisor, Unit::Hertz)
        }
        Unit::Unknown => (raw as f64 / 1000.0, Unit::KWh),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::obis::REGISTRY;

    #[test]
    fn energy_divides_by_1000() {
        let entry = REGISTRY.lookup_dotted("1-0:1.8.0").unwrap();
        let (value, unit) = resolve(entry, FieldType::UInt32, 1930, None);
        assert_eq!(value, 1.930);
        assert_eq!(unit, Unit::KWh);
    }

    #[test]
    fn voltage_uint16_divides_by_10() {
        let entry = REGISTRY.lookup_dotted("1-0:32.7.0").unwrap();
        let (value, unit) = resolve(entry, FieldType::UInt16, 2301, None);
        assert_eq!(value, 230.1);
        assert_eq!(unit, Unit::Volt);
    }

    #[test]
    fn current_uint16_divides_by_100_under_threshold() {
        let entry = REGISTRY.lookup_dotted("1-0:31.7.0").unwrap();
        let (value, _) = resolve(entry, FieldType::UInt16, 530, None);
        assert_eq!(value, 5.30);
    }

    #[test]
    fn current_uint16_divides_by_10_over_threshold() {
        let entry = REGISTRY.lookup_dotted("1-0:31.7.0").unwrap();
        let (value, _) = resolve(entry, FieldType::UInt16, 10_500, None);
        assert_eq!(value, 1050.0);
    }

    #[test]
    fn scaler_override_takes_precedence() {
        let entry = REGISTRY.lookup_dotted("1-0:1.8.0").unwrap();
        let (value, unit) = resolve(entry, FieldType::UInt32, 1930, Some(0.001));
        assert_eq!(value, 1.930);
        assert_eq!(unit, Unit::KWh);
    }

    #[test]
    fn idempotent_for_identical_inputs() {
        let entry = REGISTRY.lookup_dotted("1-0:1.8.0").unwrap();
        let (v1, _) = resolve(entry, FieldType::UInt32, 1930, None);
        let (v2, _) = resolve(entry, FieldType::UInt32, 1930, None);
        assert_eq!(v1, v2);
    }
}
