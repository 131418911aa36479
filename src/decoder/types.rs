//! Core data model shared across every decoder component (§3).

use serde::{Deserialize, Serialize};

use chrono::{DateTime, Utc};

/// Canonical physical unit a reading is expressed in.
///
/// `Unknown` only ever appears transiently on an [`crate::decoder::obis::ObisEntry`]
/// sentinel; C3 never emits it on a [`MeterReading`] (an unknown registry
/// unit defaults to `KWh`, per §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    KWh,
    Kvarh,
    KVAh,
    Volt,
    Ampere,
    Hertz,
    Unknown,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::KWh => "kWh",
            Unit::Kvarh => "kvarh",
            Unit::KVAh => "kVAh",
            Unit::Volt => "V",
            Unit::Ampere => "A",
            Unit::Hertz => "Hz",
            Unit::Unknown => "?",
        }
    }
}

/// Per-sample data quality, derived from the DLMS status byte (§4.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quality {
    Good,
    DegradedPowerFailure,
    ClockAdjusted,
    Invalid,
}

/// A single canonical, timestamped, per-channel reading (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterReading {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub channel_id: String,
    pub unit: Unit,
    pub quality: Quality,
    pub meter_id: String,
}

/// Bit-decoded DLMS status byte (§3, §4.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags {
    pub end_of_interval: bool,
    pub invalid_data: bool,
    pub power_failure: bool,
    pub clock_adjusted: bool,
    pub summer_time: bool,
    pub raw: u8,
}

impl StatusFlags {
    pub fn decode(byte: u8) -> Self {
        Self {
            end_of_interval: byte & 0x01 != 0,
            invalid_data: byte & 0x02 != 0,
            power_failure: byte & 0x04 != 0,
            clock_adjusted: byte & 0x08 != 0,
            summer_time: byte & 0x10 != 0,
            raw: byte,
        }
    }

    /// Maps status to quality per §4.2.2. Callers drop the record entirely
    /// when `invalid_data` is set rather than keeping an `Invalid` reading,
    /// but the tag still exists so a caller who short-circuited earlier
    /// (e.g. a unit test probing the mapping in isolation) can observe it.
    pub fn quality(&self) -> Quality {
        if self.invalid_data {
            Quality::Invalid
        } else if self.power_failure {
            Quality::DegradedPowerFailure
        } else if self.clock_adjusted {
            Quality::ClockAdjusted
        } else {
            Quality::Good
        }
    }
}

/// Outcome of decoding one source file (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    pub filename: String,
    pub success: bool,
    pub readings: Vec<MeterReading>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub channels_count: Option<usize>,
}

impl FileResult {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            success: true,
            readings: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            channels_count: None,
        }
    }

    pub fn fatal(filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            success: false,
            readings: Vec::new(),
            errors: vec![error.into()],
            warnings: Vec::new(),
            channels_count: None,
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Caller-provided decode options (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeOptions {
    /// Backfills `meter_id` on any reading that would otherwise be empty.
    pub forced_meter_id: Option<String>,
    /// Informational only today; tabular timestamps are tagged UTC either
    /// way (§9, open question resolved as identity conversion).
    pub source_tz_hint: Option<String>,
}

/// An ordered index→OBIS mapping for one profile's record schema (§3, C7).
/// Indices 0/1 are reserved for clock/status; value slots start at 2.
/// `scalers` carries a per-slot device-supplied override (§9), present only
/// for slots whose `capture_objects` entry named one.
#[derive(Debug, Clone, Default)]
pub struct CaptureLayout {
    pub slots: std::collections::BTreeMap<usize, String>,
    pub scalers: std::collections::BTreeMap<usize, f64>,
}

impl CaptureLayout {
    pub fn value_slot_channel_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|(&idx, _)| idx >= 2)
            .map(|(_, obis)| obis.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len()
    }
}
