//! Decode one or more meter export files and print a summary for each.
//! Run with: cargo run --bin decode -- <path> [path...]

use std::path::PathBuf;
use std::process::ExitCode;

use meter_decoder_core::{decode_archive_file, DecodeOptions};

fn main() -> ExitCode {
    env_logger::init();

    let paths: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        eprintln!("usage: decode <path> [path...]");
        return ExitCode::FAILURE;
    }

    let options = DecodeOptions::default();
    let mut any_failed = false;

    for path in &paths {
        for result in decode_archive_file(path, &options) {
            if result.success {
                log::info!(
                    "{}: {} reading(s), {} warning(s)",
                    result.filename,
                    result.readings.len(),
                    result.warnings.len()
                );
                for warning in &result.warnings {
                    log::warn!("{}: {}", result.filename, warning);
                }
            } else {
                any_failed = true;
                log::error!("{}: FAILED", result.filename);
                for error in &result.errors {
                    log::error!("{}: {}", result.filename, error);
                }
            }
        }
    }

    if any_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
