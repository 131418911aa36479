//! Completeness auditor (C9): reporting only, never mutates readings.
//!
//! Grounded in `original_source/validation.py`'s `_validate_data_completeness`
//! / `_validate_duplicates` / `_validate_gaps`, generalized into one report
//! per `(meter_id, channel_id)` series instead of a dict keyed by a loose
//! "reading_type" string.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::decoder::types::MeterReading;

const EXPECTED_INTERVAL_MINUTES: i64 = 15;

/// A gap between two consecutive readings wider than twice the expected
/// cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gap {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
}

/// A duplicate `(timestamp, channel_id, meter_id)` key, reported once per
/// repeat occurrence beyond the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Duplicate {
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletenessReport {
    pub meter_id: String,
    pub channel_id: String,
    pub expected: usize,
    pub actual: usize,
    pub coverage_percent: f64,
    pub complete: bool,
    pub gaps: Vec<Gap>,
    pub duplicates: Vec<Duplicate>,
}

/// Audit one channel's readings against the expected 15-minute grid (§4.9).
///
/// `readings` need not be pre-sorted or pre-deduplicated; this function
/// treats them as the raw, possibly-overlapping C8 output for a single
/// `(meter_id, channel_id)` pair.
pub fn audit(meter_id: &str, channel_id: &str, readings: &[MeterReading]) -> CompletenessReport {
    let mut sorted: Vec<&MeterReading> = readings.iter().collect();
    sorted.sort_by_key(|r| r.timestamp);

    if sorted.is_empty() {
        return CompletenessReport {
            meter_id: meter_id.to_string(),
            channel_id: channel_id.to_string(),
            expected: 0,
            actual: 0,
            coverage_percent: 0.0,
            complete: false,
            gaps: Vec::new(),
            duplicates: Vec::new(),
        };
    }

    let t0 = sorted.first().unwrap().timestamp;
    let tn = sorted.last().unwrap().timestamp;
    let span_minutes = (tn - t0).num_minutes();
    let expected = (span_minutes / EXPECTED_INTERVAL_MINUTES) as usize + 1;
    let actual = sorted.len();

    let coverage_percent = if expected == 0 {
        100.0
    } else {
        (actual as f64 / expected as f64 * 100.0).min(100.0)
    };

    let expected_interval = Duration::minutes(EXPECTED_INTERVAL_MINUTES);
    let mut gaps = Vec::new();
    for pair in sorted.windows(2) {
        let delta = pair[1].timestamp - pair[0].timestamp;
        if delta > expected_interval * 2 {
            gaps.push(Gap {
                start: pair[0].timestamp,
                end: pair[1].timestamp,
                duration_minutes: delta.num_minutes(),
            });
        }
    }

    let mut seen = std::collections::HashSet::new();
    let mut duplicates = Vec::new();
    for reading in readings {
        let key = (reading.timestamp, reading.channel_id.clone(), reading.meter_id.clone());
        if !seen.insert(key) {
            duplicates.push(Duplicate {
                timestamp: reading.timestamp,
            });
        }
    }

    CompletenessReport {
        meter_id: meter_id.to_string(),
        channel_id: channel_id.to_string(),
        expected,
        actual,
        coverage_percent,
        complete: coverage_percent >= 100.0,
        gaps,
        duplicates,
    }
}
