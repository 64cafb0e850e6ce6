//! Step registry: how each pipeline stage is carried out.
//!
//! Used by the full flow and by isolated runs. Every method here blocks and
//! is meant to run on a blocking worker.

use crate::backup::{BackupOutcome, BackupStore};
use crate::collaborators::Collaborators;
use crate::error::InstallerError;
use crate::model::{StepDetail, StepId, StepResult};
use crate::options::RunOptions;
use crate::targets::{ClosedTargets, TargetProcessRegistry};
use std::path::{Path, PathBuf};

/// State threaded through the steps of one run.
#[derive(Debug, Clone)]
pub(crate) struct RunContext {
    pub options: RunOptions,
    pub source_override: Option<PathBuf>,
    /// Decided once when the context is created, from `close_before_backup`.
    pub closing_skipped: bool,
    /// Populated by CloseTarget; the only processes ReopenTarget may relaunch.
    pub closed: ClosedTargets,
    pub repo_path: Option<PathBuf>,
    isolated: bool,
}

impl RunContext {
    pub fn for_flow(options: RunOptions) -> Self {
        Self {
            closing_skipped: !options.close_before_backup,
            options,
            source_override: None,
            closed: ClosedTargets::default(),
            repo_path: None,
            isolated: false,
        }
    }

    pub fn isolated(options: RunOptions, source_override: Option<PathBuf>) -> Self {
        Self {
            source_override,
            isolated: true,
            ..Self::for_flow(options)
        }
    }

    fn repo_dir(&self) -> &Path {
        self.repo_path.as_deref().unwrap_or(&self.options.repo_dir)
    }
}

/// Shared handles every step draws on.
#[derive(Clone)]
pub struct StepRegistry {
    targets: TargetProcessRegistry,
    backups: BackupStore,
    collaborators: Collaborators,
    theme_dir: Option<PathBuf>,
}

impl StepRegistry {
    pub fn new(
        targets: TargetProcessRegistry,
        backups: BackupStore,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            targets,
            backups,
            collaborators,
            theme_dir: None,
        }
    }

    /// Also capture this client theme directory in every Backup snapshot.
    pub fn with_theme_dir(mut self, theme_dir: PathBuf) -> Self {
        self.theme_dir = Some(theme_dir);
        self
    }

    pub fn targets(&self) -> &TargetProcessRegistry {
        &self.targets
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Run one step against `ctx`. `Ok` is Completed or Skipped; `Err` means the step failed.
    pub(crate) fn execute(
        &self,
        step: StepId,
        ctx: &mut RunContext,
    ) -> Result<StepResult, InstallerError> {
        let _span = tracing::info_span!("step", step = %step).entered();
        match step {
            StepId::CloseTarget => self.close_target(ctx),
            StepId::Backup => self.backup(ctx),
            StepId::SyncRepo => self.sync_repo(ctx),
            StepId::Build => self.build(ctx),
            StepId::Inject => self.inject(ctx),
            StepId::DownloadThemes => self.download_themes(ctx),
            StepId::ReopenTarget => self.reopen_target(ctx),
        }
    }

    fn close_target(&self, ctx: &mut RunContext) -> Result<StepResult, InstallerError> {
        if ctx.closing_skipped {
            return Ok(StepResult::skipped("closing clients is disabled"));
        }
        let closed = self.targets.close(&ctx.options.selected_installs)?;
        let clients = closed.clients.clone();
        ctx.closed = closed;

        let result = StepResult::completed(StepDetail::CloseTarget {
            closed_clients: clients.clone(),
        });
        Ok(if clients.is_empty() {
            result.with_message("no selected client was running")
        } else {
            result.with_message(format!("closed {}", clients.join(", ")))
        })
    }

    /// Source directory the Backup step snapshots.
    pub(crate) fn backup_source(ctx: &RunContext) -> Result<PathBuf, InstallerError> {
        let source = ctx
            .source_override
            .clone()
            .unwrap_or_else(|| ctx.options.repo_dir.clone());
        if source.as_os_str().is_empty() {
            return Err(InstallerError::Config(
                "backup requires a source path".to_string(),
            ));
        }
        Ok(source)
    }

    pub(crate) fn create_backup(
        &self,
        source: &Path,
        options: &RunOptions,
    ) -> Result<BackupOutcome, InstallerError> {
        match &self.theme_dir {
            Some(themes) => self
                .backups
                .create_with_themes(source, themes, &options.retention()),
            None => self.backups.create(source, &options.retention()),
        }
    }

    fn backup(&self, ctx: &mut RunContext) -> Result<StepResult, InstallerError> {
        let source = Self::backup_source(ctx)?;
        if !ctx.isolated && !source.exists() {
            return Ok(StepResult::skipped(format!(
                "nothing to back up at {}",
                source.display()
            )));
        }
        let outcome = self.create_backup(&source, &ctx.options)?;
        let mut message = format!("backed up to {}", outcome.entry.name);
        if outcome.themes_included {
            message.push_str(" (with themes)");
        }
        if let Some(e) = &outcome.prune_error {
            message.push_str(&format!("; retention not applied: {e}"));
        }
        Ok(StepResult::completed(StepDetail::Backup {
            source_path: source,
            entry: outcome.entry,
            pruned: outcome.pruned,
        })
        .with_message(message))
    }

    fn sync_repo(&self, ctx: &mut RunContext) -> Result<StepResult, InstallerError> {
        let options = &ctx.options;
        let path = self.collaborators.repo.sync(
            &options.repo_url,
            &options.repo_dir,
            &options.plugin_repositories(),
        )?;
        ctx.repo_path = Some(path.clone());
        Ok(StepResult::completed(StepDetail::SyncRepo { repo_path: path }))
    }

    fn build(&self, ctx: &mut RunContext) -> Result<StepResult, InstallerError> {
        let output = self.collaborators.builder.build(ctx.repo_dir())?;
        Ok(StepResult::completed(StepDetail::Build { output }))
    }

    fn inject(&self, ctx: &mut RunContext) -> Result<StepResult, InstallerError> {
        let installs = self.targets.list_installs();
        let locations: Vec<PathBuf> = installs
            .into_iter()
            .filter(|install| ctx.options.selected_installs.contains(&install.id))
            .map(|install| install.path)
            .collect();
        if locations.is_empty() {
            return Ok(StepResult::skipped(
                "none of the selected clients is installed",
            ));
        }
        let output = self
            .collaborators
            .injector
            .inject(ctx.repo_dir(), &locations)?;
        Ok(StepResult::completed(StepDetail::Inject { locations }).with_message(output))
    }

    fn download_themes(&self, ctx: &mut RunContext) -> Result<StepResult, InstallerError> {
        if ctx.options.themes.is_empty() {
            return Ok(StepResult::skipped("no themes configured"));
        }
        let downloaded = self.collaborators.themes.fetch(&ctx.options.themes)?;
        Ok(StepResult::completed(StepDetail::DownloadThemes { downloaded }))
    }

    fn reopen_target(&self, ctx: &mut RunContext) -> Result<StepResult, InstallerError> {
        if ctx.closing_skipped {
            return Ok(StepResult::skipped("clients were not closed"));
        }
        let restarted = self.targets.reopen(&ctx.closed);
        let result = StepResult::completed(StepDetail::ReopenTarget {
            restarted_clients: restarted.clone(),
        });
        Ok(if ctx.closed.is_empty() {
            result.with_message("nothing to relaunch")
        } else if restarted.len() < ctx.closed.clients.len() {
            result.with_message("some clients could not be relaunched")
        } else {
            result
        })
    }
}
