//! OBIS code registry (C1).
//!
//! A read-only, process-wide table built once and indexed three ways: by
//! dotted standard code, by vendor hex code, and by canonical channel id.
//! Unknown codes never error — they resolve to a sentinel entry so the rest
//! of the pipeline stays self-describing (§7: unmapped codes are warnings).

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::decoder::Unit;

/// How a meter reading for this channel factors into the distribution
/// system's energy balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyClass {
    Active,
    Reactive,
    Apparent,
    Quality,
}

/// Per-source validation status for a registry row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationTag {
    Correct,
    Warning,
    Error,
    Unknown,
}

/// A single OBIS registry row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObisEntry {
    pub dotted_code: String,
    pub vendor_hex: String,
    pub channel_id: String,
    pub label: String,
    pub unit: Unit,
    pub energy_class: EnergyClass,
    pub direction: &'static str,
    pub validation: ValidationTag,
    pub comment: Option<String>,
}

fn unknown_entry(raw_code: &str) -> ObisEntry {
    ObisEntry {
        dotted_code: raw_code.to_string(),
        vendor_hex: raw_code.to_string(),
        channel_id: raw_code.to_string(),
        label: raw_code.to_string(),
        unit: Unit::Unknown,
        energy_class: EnergyClass::Active,
        direction: "?",
        validation: ValidationTag::Unknown,
        comment: None,
    }
}

struct RawRow {
    dotted: &'static str,
    hex: &'static str,
    channel_id: &'static str,
    label: &'static str,
    unit: Unit,
    energy_class: EnergyClass,
    direction: &'static str,
    validation: ValidationTag,
    comment: Option<&'static str>,
}

/// Source-of-truth table. Channel ids follow the downstream dotted-token
/// scheme (see `original_source/parsers.py`'s `OBIS_MAPPING`); the 15-minute
/// interval-export (`IX15m`) family is the one this system deals in.
const ROWS: &[RawRow] = &[
    RawRow {
        dotted: "1-0:1.8.0",
        hex: "0100010800FF",
        channel_id: "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.73.0",
        label: "A+ Total",
        unit: Unit::KWh,
        energy_class: EnergyClass::Active,
        direction: "import",
        validation: ValidationTag::Correct,
        comment: None,
    },
    RawRow {
        dotted: "1-0:2.8.0",
        hex: "0100020800FF",
        channel_id: "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.74.0",
        label: "A- Total",
        unit: Unit::KWh,
        energy_class: EnergyClass::Active,
        direction: "export",
        validation: ValidationTag::Correct,
        comment: None,
    },
    RawRow {
        dotted: "1-0:15.8.0",
        hex: "01000F0800FF",
        channel_id: "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.75.0",
        label: "A+ IX15m",
        unit: Unit::KWh,
        energy_class: EnergyClass::Active,
        direction: "import",
        validation: ValidationTag::Correct,
        comment: None,
    },
    RawRow {
        dotted: "1-0:16.8.0",
        hex: "0100100900FF",
        channel_id: "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.76.0",
        label: "A- IX15m",
        unit: Unit::KWh,
        energy_class: EnergyClass::Active,
        direction: "export",
        validation: ValidationTag::Correct,
        comment: None,
    },
    RawRow {
        dotted: "1-0:5.8.0",
        hex: "0100050800FF",
        channel_id: "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.77.0",
        label: "Q+ IX15m",
        unit: Unit::Kvarh,
        energy_class: EnergyClass::Reactive,
        direction: "Q1",
        validation: ValidationTag::Correct,
        comment: None,
    },
    RawRow {
        dotted: "1-0:6.8.0",
        hex: "0100060800FF",
        channel_id: "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.78.0",
        label: "Q- IX15m",
        unit: Unit::Kvarh,
        energy_class: EnergyClass::Reactive,
        direction: "Q2",
        validation: ValidationTag::Correct,
        comment: None,
    },
    // Documented vendor mislabel: the data's own labels for these four
    // codes are printed one quadrant off from what the OBIS code actually
    // carries. The OBIS code itself is correct; only the label text lies.
    // The canonical mapping and quadrant below are the corrected ones.
    RawRow {
        dotted: "1-0:3.8.0",
        hex: "0100030800FF",
        channel_id: "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.81.0",
        label: "Q+ IX15m Q2",
        unit: Unit::Kvarh,
        energy_class: EnergyClass::Reactive,
        direction: "Q1",
        validation: ValidationTag::Warning,
        comment: Some("data label reads Q2; OBIS code is correct for Q1 (+P, +Q)"),
    },
    RawRow {
        dotted: "1-0:4.8.0",
        hex: "0100040800FF",
        channel_id: "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.82.0",
        label: "Q- IX15m Q2",
        unit: Unit::Kvarh,
        energy_class: EnergyClass::Reactive,
        direction: "Q2",
        validation: ValidationTag::Warning,
        comment: Some("data label reads Q2; OBIS code is correct for Q2 (-P, +Q)"),
    },
    RawRow {
        dotted: "1-0:7.8.0",
        hex: "0100070800FF",
        channel_id: "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.79.0",
        label: "Q3 Total",
        unit: Unit::Kvarh,
        energy_class: EnergyClass::Reactive,
        direction: "Q3",
        validation: ValidationTag::Warning,
        comment: Some("data label reads Q2; OBIS code is correct for Q3 (-P, -Q)"),
    },
    RawRow {
        dotted: "1-0:8.8.0",
        hex: "0100080800FF",
        channel_id: "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.80.0",
        label: "Q4 Total",
        unit: Unit::Kvarh,
        energy_class: EnergyClass::Reactive,
        direction: "Q4",
        validation: ValidationTag::Warning,
        comment: Some("data label reads Q3; OBIS code is correct for Q4 (+P, -Q)"),
    },
    RawRow {
        dotted: "1-0:9.8.0",
        hex: "0100090800FF",
        channel_id: "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.83.0",
        label: "S+ IX15m",
        unit: Unit::KVAh,
        energy_class: EnergyClass::Apparent,
        direction: "import",
        validation: ValidationTag::Correct,
        comment: None,
    },
    RawRow {
        dotted: "1-0:10.8.0",
        hex: "0100100800FF",
        channel_id: "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.84.0",
        label: "S- IX15m",
        unit: Unit::KVAh,
        energy_class: EnergyClass::Apparent,
        direction: "export",
        validation: ValidationTag::Correct,
        comment: None,
    },
    RawRow {
        dotted: "1-0:32.7.0",
        hex: "0100201800FF",
        channel_id: "0.0.4.1.24.1.12.0.0.0.0.2.0.0.0.0.91.0",
        label: "Voltage L1",
        unit: Unit::Volt,
        energy_class: EnergyClass::Quality,
        direction: "n/a",
        validation: ValidationTag::Correct,
        comment: None,
    },
    RawRow {
        dotted: "1-0:31.7.0",
        hex: "0100200700FF",
        channel_id: "0.0.4.1.24.1.12.0.0.0.0.2.0.0.0.0.92.0",
        label: "Current L1",
        unit: Unit::Ampere,
        energy_class: EnergyClass::Quality,
        direction: "n/a",
        validation: ValidationTag::Correct,
        comment: None,
    },
    RawRow {
        dotted: "1-0:14.7.0",
        hex: "01000E0700FF",
        channel_id: "0.0.4.1.24.1.12.0.0.0.0.2.0.0.0.0.93.0",
        label: "Frequency",
        unit: Unit::Hertz,
        energy_class: EnergyClass::Quality,
        direction: "n/a",
        validation: ValidationTag::Correct,
        comment: None,
    },
    // Clock and status capture slots carry no physical unit; they are
    // never themselves turned into a MeterReading, but must resolve so
    // CaptureLayout building does not treat them as unknown.
    RawRow {
        dotted: "0-0:1.0.0",
        hex: "0000010000FF",
        channel_id: "0.0.1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0",
        label: "Clock",
        unit: Unit::Unknown,
        energy_class: EnergyClass::Quality,
        direction: "n/a",
        validation: ValidationTag::Correct,
        comment: None,
    },
    RawRow {
        dotted: "0-0:96.10.1",
        hex: "0000600A01FF",
        channel_id: "0.0.96.10.1.0.0.0.0.0.0.0.0.0.0.0.0.0",
        label: "Status",
        unit: Unit::Unknown,
        energy_class: EnergyClass::Quality,
        direction: "n/a",
        validation: ValidationTag::Correct,
        comment: None,
    },
];

pub struct Registry {
    by_dotted: HashMap<&'static str, ObisEntry>,
    by_hex: HashMap<&'static str, ObisEntry>,
    by_channel: HashMap<&'static str, ObisEntry>,
}

impl Registry {
    fn build() -> Self {
        let mut by_dotted = HashMap::new();
        let mut by_hex = HashMap::new();
        let mut by_channel = HashMap::new();

        for row in ROWS {
            let entry = ObisEntry {
                dotted_code: row.dotted.to_string(),
                vendor_hex: row.hex.to_string(),
                channel_id: row.channel_id.to_string(),
                label: row.label.to_string(),
                unit: row.unit,
                energy_class: row.energy_class,
                direction: row.direction,
                validation: row.validation,
                comment: row.comment.map(|s| s.to_string()),
            };
            by_dotted.insert(row.dotted, entry.clone());
            by_hex.insert(row.hex, entry.clone());
            by_channel.insert(row.channel_id, entry);
        }

        Self {
            by_dotted,
            by_hex,
            by_channel,
        }
    }

    pub fn lookup_vendor_hex(&self, code: &str) -> Option<&ObisEntry> {
        self.by_hex.get(code.to_uppercase().as_str())
    }

    pub fn lookup_dotted(&self, code: &str) -> Option<&ObisEntry> {
        self.by_dotted.get(code)
    }

    pub fn describe(&self, channel_id: &str) -> ObisEntry {
        self.by_channel
            .get(channel_id)
            .cloned()
            .unwrap_or_else(|| unknown_entry(channel_id))
    }

    /// Lookup by hex code, falling back to the unknown sentinel rather than
    /// `None` — used on the C6/C7 hot path where every slot must resolve to
    /// *something* so layout building never has to branch on absence.
    pub fn describe_hex(&self, code: &str) -> ObisEntry {
        self.lookup_vendor_hex(code)
            .cloned()
            .unwrap_or_else(|| unknown_entry(code))
    }
}

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::build);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_dotted_code_resolves() {
        let entry = REGISTRY.lookup_dotted("1-0:1.8.0").unwrap();
        assert_eq!(entry.channel_id, "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.73.0");
        assert_eq!(entry.unit, Unit::KWh);
    }

    #[test]
    fn known_hex_code_resolves_case_insensitively() {
        let entry = REGISTRY.lookup_vendor_hex("0100010800ff").unwrap();
        assert_eq!(entry.channel_id, "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.73.0");
    }

    #[test]
    fn unknown_code_is_sentinel() {
        let entry = REGISTRY.describe_hex("DEADBEEFCAFE");
        assert_eq!(entry.validation, ValidationTag::Unknown);
        assert_eq!(entry.unit, Unit::Unknown);
        assert_eq!(entry.label, "DEADBEEFCAFE");
    }

    #[test]
    fn describe_unmapped_channel_is_sentinel() {
        let entry = REGISTRY.describe("not-a-real-channel");
        assert_eq!(entry.validation, ValidationTag::Unknown);
    }

    #[test]
    fn mislabeled_quadrant_keeps_warning_with_comment() {
        let entry = REGISTRY.lookup_dotted("1-0:7.8.0").unwrap();
        assert_eq!(entry.validation, ValidationTag::Warning);
        assert!(entry.comment.is_some());
        assert_eq!(entry.channel_id, "0.0.4.1.15.1.12.0.0.0.0.2.0.0.0.0.79.0");
    }

    #[test]
    fn hex_lookup_does_not_collide_between_total_and_interval_variants() {
        let total = REGISTRY.lookup_vendor_hex("0100010800FF").unwrap();
        assert_eq!(total.dotted_code, "1-0:1.8.0");
        let interval = REGISTRY.lookup_dotted("1-0:15.8.0").unwrap();
        assert_ne!(total.vendor_hex, interval.vendor_hex);
    }
}
