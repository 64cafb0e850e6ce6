//! Post-run processing utilities.
//!
//! Handles exports and the backup list refresh after a patch flow returns.

use crate::backup::BackupStore;
use crate::error::FlowError;
use crate::model::{BackupEntry, FlowResult, StepId};
use crate::storage;
use serde::Serialize;
use std::path::Path;

/// Error section of an exported run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedError {
    kind: &'static str,
    message: String,
    step: Option<StepId>,
}

#[derive(Debug, Serialize)]
struct RunExport<'a> {
    result: Option<&'a FlowResult>,
    error: Option<ExportedError>,
}

/// Result of post-run processing, ready for presentation layers.
pub struct ProcessedRun {
    pub export_messages: Vec<String>,
    pub backups: Vec<BackupEntry>,
}

/// Process a finished run: write the optional JSON export and reload backups.
///
/// Nothing here fails the run; problems become messages.
pub fn process_run_completion(
    outcome: &Result<FlowResult, FlowError>,
    export_json: Option<&Path>,
    backups: &BackupStore,
) -> ProcessedRun {
    let mut export_messages = Vec::new();

    if let Some(export_path) = export_json {
        let export = match outcome {
            Ok(result) => RunExport {
                result: Some(result),
                error: None,
            },
            Err(e) => RunExport {
                result: e.result(),
                error: Some(ExportedError {
                    kind: e.kind(),
                    message: e.to_string(),
                    step: e.failed_step(),
                }),
            },
        };
        match storage::export_json(export_path, &export) {
            Ok(()) => export_messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e}")),
        }
    }

    let backups = match backups.list() {
        Ok(list) => list,
        Err(e) => {
            tracing::warn!(error = %e, "could not reload backups");
            Vec::new()
        }
    };

    ProcessedRun {
        export_messages,
        backups,
    }
}
