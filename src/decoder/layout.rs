//! Profile layout resolver (C7): turns a profile object's `capture_objects`
//! structure array into an index→OBIS mapping for its buffer records.

use crate::decoder::types::CaptureLayout;

/// Fallback layout used whenever a profile carries no `capture_objects`
/// array, or one with no resolvable `logical_name` children (§4.7).
const DEFAULT_LAYOUT: &[(usize, &str)] = &[
    (0, "0000010000FF"),
    (1, "0000600A01FF"),
    (2, "0100010800FF"),
    (3, "0100020800FF"),
    (4, "0100050800FF"),
    (5, "0100060800FF"),
    (6, "0100070800FF"),
    (7, "0100080800FF"),
];

/// Load-profile wildcard slots (`010063XX00FF`) are mapped to the canonical
/// active-import 15-minute channel at layout-resolution time rather than
/// being carried through as a per-index unknown code.
const LOAD_PROFILE_SLOT_PREFIX: &str = "010063";
const LOAD_PROFILE_SLOT_SUFFIX: &str = "00FF";
const ACTIVE_IMPORT_IX15M: &str = "0100010800FF";

fn is_load_profile_slot(hex: &str) -> bool {
    hex.len() == 12
        && hex.starts_with(LOAD_PROFILE_SLOT_PREFIX)
        && hex.ends_with(LOAD_PROFILE_SLOT_SUFFIX)
}

fn normalize_slot(hex: &str) -> String {
    if is_load_profile_slot(hex) {
        ACTIVE_IMPORT_IX15M.to_string()
    } else {
        hex.to_string()
    }
}

pub fn default_layout() -> CaptureLayout {
    let mut layout = CaptureLayout::default();
    for (idx, hex) in DEFAULT_LAYOUT {
        layout.slots.insert(*idx, hex.to_string());
    }
    layout
}

/// One `capture_objects` array element as discovered in the XML: the
/// element's array index (parsed from the `.N.` segment of its
/// `logical_name` field's `FieldName`, when present), the OBIS hex code
/// carried by that `logical_name`'s value, and an optional sibling
/// `.scaler` field value (§9: a device-supplied override for this slot).
pub struct CaptureObjectEntry {
    pub array_index: Option<usize>,
    pub logical_name_hex: String,
    pub scaler: Option<f64>,
}

/// Build a `CaptureLayout` from a profile's `capture_objects` entries,
/// alongside any warnings the resolution decided to surface.
///
/// Indices come from each entry's `.N.` `FieldName` segment; enumeration
/// order is used only when that segment is absent or fails to parse,
/// per the resolved open question in §9. Falls back to [`default_layout`]
/// when `entries` is empty.
pub fn resolve(entries: &[CaptureObjectEntry]) -> (CaptureLayout, Vec<String>) {
    if entries.is_empty() {
        let warning = "capture_objects empty, default layout used".to_string();
        log::debug!("{warning}");
        return (default_layout(), vec![warning]);
    }

    let mut layout = CaptureLayout::default();
    let mut enumeration_fallback_used = false;
    for (enumeration_index, entry) in entries.iter().enumerate() {
        let index = match entry.array_index {
            Some(index) => index,
            None => {
                enumeration_fallback_used = true;
                enumeration_index
            }
        };
        layout
            .slots
            .insert(index, normalize_slot(&entry.logical_name_hex));
        if let Some(scaler) = entry.scaler {
            layout.scalers.insert(index, scaler);
        }
    }

    let mut warnings = Vec::new();
    if enumeration_fallback_used {
        let warning = "capture_objects index fallback to enumeration order".to_string();
        log::warn!("{warning}");
        warnings.push(warning);
    }
    (layout, warnings)
}
