//! Post-sweep processing utilities.
//!
//! Handles auto-save and exports after a sweep completes.

use crate::cli::Cli;
use crate::model::SweepResult;
use crate::storage;

/// Result of post-sweep processing, ready for presentation layers.
pub(crate) struct ProcessedSweep {
    pub messages: Vec<String>,
}

/// Process a completed sweep: auto-save and export. Failures become messages.
pub(crate) fn process_sweep_completion(args: &Cli, result: &SweepResult) -> ProcessedSweep {
    let mut messages = Vec::new();

    if args.auto_save {
        match storage::save_run(result) {
            Ok(p) => messages.push(format!("Saved: {}", p.display())),
            Err(e) => messages.push(format!("Auto-save failed: {e:#}")),
        }
    }

    if let Some(export_path) = args.export_json.as_deref() {
        match storage::export_json(export_path, result) {
            Ok(_) => messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => messages.push(format!("Export JSON failed: {e:#}")),
        }
    }
    if let Some(export_path) = args.export_csv.as_deref() {
        match storage::export_csv(export_path, result) {
            Ok(_) => messages.push(format!("Exported CSV: {}", export_path.display())),
            Err(e) => messages.push(format!("Export CSV failed: {e:#}")),
        }
    }

    ProcessedSweep { messages }
}
