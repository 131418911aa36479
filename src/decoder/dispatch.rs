//! Format dispatcher & archive walker (C10): extension-based routing into
//! C4/C5/C6, plus one level of `.zip` archive traversal.

use std::io::Read;

use zip::ZipArchive;

use crate::decoder::error::DecodeError;
use crate::decoder::types::FileResult;
use crate::decoder::{spreadsheet, tabular, xml};

fn extension_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Dispatch one file's bytes by its own extension; never recurses into a
/// nested archive (§4.10: archive members are not themselves expected to be
/// archives).
fn dispatch_one(bytes: &[u8], filename: &str) -> FileResult {
    match extension_of(filename).as_str() {
        "csv" => tabular::parse(bytes, filename),
        "xlsx" | "xls" => spreadsheet::parse(bytes, filename),
        "xml" => xml::parse(bytes, filename),
        other => {
            let mut result = FileResult::new(filename);
            result.warn(format!("unsupported entry, skipped ({other})"));
            result
        }
    }
}

/// Walk a zip archive one level deep, dispatching each entry and naming the
/// result `"<archive>::<entry>"` (§4.10).
fn walk_archive(bytes: &[u8], archive_name: &str) -> Vec<FileResult> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = match ZipArchive::new(cursor) {
        Ok(a) => a,
        Err(e) => {
            return vec![FileResult::fatal(archive_name, DecodeError::Archive(e).to_string())]
        }
    };

    let mut results = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                results.push(FileResult::fatal(
                    format!("{archive_name}::entry-{i}"),
                    DecodeError::Archive(e).to_string(),
                ));
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }
        let entry_name = entry.name().to_string();
        let mut buf = Vec::new();
        if let Err(e) = entry.read_to_end(&mut buf) {
            results.push(FileResult::fatal(
                format!("{archive_name}::{entry_name}"),
                DecodeError::Io(e).to_string(),
            ));
            continue;
        }
        let qualified_name = format!("{archive_name}::{entry_name}");
        results.push(dispatch_one(&buf, &qualified_name));
    }
    results
}

/// Dispatch a top-level file. Extension `zip` expands into one `FileResult`
/// per archive entry; any other recognized extension dispatches directly;
/// an unrecognized top-level extension is a file-level fatal error.
pub fn dispatch(bytes: &[u8], filename: &str) -> Vec<FileResult> {
    match extension_of(filename).as_str() {
        "zip" => walk_archive(bytes, filename),
        "csv" | "xlsx" | "xls" | "xml" => vec![dispatch_one(bytes, filename)],
        other => vec![FileResult::fatal(
            filename,
            DecodeError::UnsupportedExtension(other.to_string()).to_string(),
        )],
    }
}
