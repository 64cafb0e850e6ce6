//! Diagnostic runner for a single step.
//!
//! Does not take the run token and does not require earlier steps; callers
//! must not race it against a live patch flow.

use super::steps::{RunContext, StepRegistry};
use crate::error::InstallerError;
use crate::model::{BackupEntry, StepId, StepResult};
use crate::options::RunOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one isolated step, tagged by step kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DevTestOutcome {
    CloseTarget {
        closed_clients: Vec<String>,
        closing_skipped: bool,
    },
    Backup {
        source_path: PathBuf,
        entry: BackupEntry,
        pruned: Vec<String>,
        closed_clients: Vec<String>,
        restarted_clients: Vec<String>,
        closing_skipped: bool,
    },
    SyncRepo {
        result: StepResult,
    },
    Build {
        result: StepResult,
    },
    Inject {
        result: StepResult,
    },
    DownloadThemes {
        result: StepResult,
    },
    ReopenTarget {
        result: StepResult,
    },
}

impl DevTestOutcome {
    pub fn step(&self) -> StepId {
        match self {
            DevTestOutcome::CloseTarget { .. } => StepId::CloseTarget,
            DevTestOutcome::Backup { .. } => StepId::Backup,
            DevTestOutcome::SyncRepo { .. } => StepId::SyncRepo,
            DevTestOutcome::Build { .. } => StepId::Build,
            DevTestOutcome::Inject { .. } => StepId::Inject,
            DevTestOutcome::DownloadThemes { .. } => StepId::DownloadThemes,
            DevTestOutcome::ReopenTarget { .. } => StepId::ReopenTarget,
        }
    }
}

#[derive(Clone)]
pub struct DevTestHarness {
    registry: StepRegistry,
}

impl DevTestHarness {
    pub fn new(registry: StepRegistry) -> Self {
        Self { registry }
    }

    pub async fn run(
        &self,
        step: StepId,
        options: RunOptions,
        source_override: Option<PathBuf>,
    ) -> Result<DevTestOutcome, InstallerError> {
        let harness = self.clone();
        tokio::task::spawn_blocking(move || harness.run_blocking(step, options, source_override))
            .await
            .map_err(|e| InstallerError::State(format!("dev test worker stopped: {e}")))?
    }

    fn run_blocking(
        &self,
        step: StepId,
        options: RunOptions,
        source_override: Option<PathBuf>,
    ) -> Result<DevTestOutcome, InstallerError> {
        tracing::info!(step = %step, "dev test");
        let mut ctx = RunContext::isolated(options, source_override);

        match step {
            StepId::CloseTarget => {
                let closing_skipped = ctx.closing_skipped;
                let closed_clients = if closing_skipped {
                    Vec::new()
                } else {
                    self.registry
                        .targets()
                        .close(&ctx.options.selected_installs)?
                        .clients
                };
                Ok(DevTestOutcome::CloseTarget {
                    closed_clients,
                    closing_skipped,
                })
            }
            StepId::Backup => self.backup_with_restart(&ctx),
            StepId::SyncRepo => Ok(DevTestOutcome::SyncRepo {
                result: self.registry.execute(step, &mut ctx)?,
            }),
            StepId::Build => Ok(DevTestOutcome::Build {
                result: self.registry.execute(step, &mut ctx)?,
            }),
            StepId::Inject => Ok(DevTestOutcome::Inject {
                result: self.registry.execute(step, &mut ctx)?,
            }),
            StepId::DownloadThemes => Ok(DevTestOutcome::DownloadThemes {
                result: self.registry.execute(step, &mut ctx)?,
            }),
            StepId::ReopenTarget => Ok(DevTestOutcome::ReopenTarget {
                result: self.registry.execute(step, &mut ctx)?,
            }),
        }
    }

    /// Close (if enabled), snapshot, then relaunch whatever was closed even if
    /// the snapshot failed.
    fn backup_with_restart(&self, ctx: &RunContext) -> Result<DevTestOutcome, InstallerError> {
        let source = StepRegistry::backup_source(ctx)?;
        let targets = self.registry.targets();

        let closed = if ctx.closing_skipped {
            Default::default()
        } else {
            targets.close(&ctx.options.selected_installs)?
        };

        let created = self.registry.create_backup(&source, &ctx.options);
        let restarted_clients = targets.reopen(&closed);
        let outcome = created?;

        Ok(DevTestOutcome::Backup {
            source_path: source,
            entry: outcome.entry,
            pruned: outcome.pruned,
            closed_clients: closed.clients,
            restarted_clients,
            closing_skipped: ctx.closing_skipped,
        })
    }
}
