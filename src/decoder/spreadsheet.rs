//! Spreadsheet parser (C5): xlsx/xls workbooks whose columns are
//! OBIS-labeled by substring match in the header row.
//!
//! Grounded in `original_source/parsers.py`'s `ExcelExportParser`, rewritten
//! against `calamine` instead of a pandas-style dataframe scan.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{NaiveDateTime, TimeZone, Utc};
use std::io::Cursor;

use crate::decoder::error::DecodeError;
use crate::decoder::obis::REGISTRY;
use crate::decoder::types::{FileResult, MeterReading, Quality};

const VALUE_SUBSTRINGS: &[&str] = &["1.8.0", "2.8.0", "5.8.0", "6.8.0"];

struct ColumnMap {
    date_col: Option<usize>,
    value_cols: Vec<(usize, String)>,
}

fn classify_header(header: &[Data]) -> ColumnMap {
    let mut date_col = None;
    let mut value_cols = Vec::new();

    for (i, cell) in header.iter().enumerate() {
        let text = cell.to_string().to_lowercase();
        if date_col.is_none() && (text.contains("date") || text.contains("time")) {
            date_col = Some(i);
            continue;
        }
        for needle in VALUE_SUBSTRINGS {
            if text.contains(needle) {
                value_cols.push((i, text.clone()));
                break;
            }
        }
    }

    ColumnMap { date_col, value_cols }
}

fn cell_as_timestamp(cell: &Data) -> Option<chrono::DateTime<Utc>> {
    match cell {
        Data::DateTime(dt) => dt
            .as_datetime()
            .and_then(|naive| Utc.from_local_datetime(&naive).single()),
        Data::String(s) => {
            NaiveDateTime::parse_from_str(s, "%d/%m/%Y %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
                .ok()
                .and_then(|naive| Utc.from_local_datetime(&naive).single())
        }
        _ => None,
    }
}

fn cell_as_f64(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

/// Find the first non-empty cell of the first column of the first sheet.
fn find_meter_id(rows: &calamine::Range<Data>) -> Option<String> {
    for row in rows.rows() {
        if let Some(cell) = row.first() {
            let text = cell.to_string();
            let text = text.trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

pub fn parse(bytes: &[u8], filename: &str) -> FileResult {
    let mut result = FileResult::new(filename);

    let mut workbook = match open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())) {
        Ok(wb) => wb,
        Err(e) => {
            result.success = false;
            result.errors.push(DecodeError::Spreadsheet(e).to_string());
            return result;
        }
    };

    let sheet_names = workbook.sheet_names().to_vec();
    let mut meter_id: Option<String> = None;
    let mut readable_sheets = 0usize;

    for (sheet_index, name) in sheet_names.iter().enumerate() {
        let Ok(range) = workbook.worksheet_range(name) else {
            continue;
        };
        let mut rows = range.rows();
        let Some(header) = rows.next() else {
            continue;
        };

        if sheet_index == 0 {
            meter_id = find_meter_id(&range);
        }

        let columns = classify_header(header);
        if columns.date_col.is_none() && columns.value_cols.is_empty() {
            continue;
        }
        readable_sheets += 1;

        let meter_id_for_rows = meter_id.clone().unwrap_or_default();

        for row in rows {
            let Some(date_idx) = columns.date_col else {
                continue;
            };
            let Some(timestamp) = row.get(date_idx).and_then(cell_as_timestamp) else {
                continue;
            };

            for (col_idx, header_text) in &columns.value_cols {
                let Some(value) = row.get(*col_idx).and_then(cell_as_f64) else {
                    continue;
                };
                let Some(dotted) = dotted_code_for_header(header_text) else {
                    continue;
                };
                let Some(entry) = REGISTRY.lookup_dotted(&dotted) else {
                    continue;
                };

                result.readings.push(MeterReading {
                    timestamp,
                    value,
                    channel_id: entry.channel_id.clone(),
                    unit: entry.unit,
                    quality: Quality::Good,
                    meter_id: meter_id_for_rows.clone(),
                });
            }
        }
    }

    if readable_sheets == 0 {
        result.success = false;
        result.errors.push(DecodeError::NoReadableSheet.to_string());
        return result;
    }

    if result.readings.is_empty() {
        result.warn("no valid readings found");
    }

    result
}

/// Maps a value-column header substring back to the dotted OBIS code it
/// matched, assuming an `a-b:` device prefix of `1-0` (the only prefix this
/// format's source workbooks use).
fn dotted_code_for_header(header_substring: &str) -> Option<String> {
    VALUE_SUBSTRINGS
        .iter()
        .find(|needle| header_substring.contains(*needle))
        .map(|needle| format!("1-0:{needle}"))
}
