//! Boundary facade: every operation a front end can invoke.

use crate::backup::{BackupStore, DeleteReport};
use crate::collaborators::Collaborators;
use crate::config::AppPaths;
use crate::error::{FlowError, InstallerError};
use crate::model::{BackupEntry, FlowEvent, FlowResult, StepId, TargetInstall, TargetProcess};
use crate::options::{OptionsStore, RunOptions};
use crate::orchestrator::{
    DevTestHarness, DevTestOutcome, FlowOrchestrator, ProgressChannel, RunToken, StepRegistry,
};
use crate::targets::TargetProcessRegistry;
use std::path::PathBuf;
use tokio::sync::broadcast;

pub struct Installer {
    paths: AppPaths,
    options: OptionsStore,
    orchestrator: FlowOrchestrator,
    harness: DevTestHarness,
}

impl Installer {
    /// Installer wired to the real system: sysinfo processes, git/pnpm, HTTP themes.
    pub fn open(paths: AppPaths) -> Result<Self, InstallerError> {
        paths.ensure()?;
        let registry = StepRegistry::new(
            TargetProcessRegistry::system(paths.client_root().to_path_buf()),
            BackupStore::open(paths.backups_dir())?,
            Collaborators::system(paths.theme_dir()),
        )
        .with_theme_dir(paths.theme_dir());
        let options = OptionsStore::new(paths.options_file());
        Ok(Self::with_parts(paths, options, registry, RunToken::global()))
    }

    pub fn with_parts(
        paths: AppPaths,
        options: OptionsStore,
        registry: StepRegistry,
        token: RunToken,
    ) -> Self {
        let orchestrator = FlowOrchestrator::new(registry.clone(), token, ProgressChannel::new());
        Self {
            paths,
            options,
            orchestrator,
            harness: DevTestHarness::new(registry),
        }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn backups(&self) -> &BackupStore {
        self.orchestrator.registry().backups()
    }

    pub fn list_installs(&self) -> Vec<TargetInstall> {
        self.orchestrator.registry().targets().list_installs()
    }

    pub fn list_running_processes(&self) -> Result<Vec<TargetProcess>, InstallerError> {
        self.orchestrator.registry().targets().list_running_processes()
    }

    pub fn get_options(&self) -> Result<RunOptions, InstallerError> {
        self.options.load()
    }

    /// Persist `options` and return them as re-read from disk.
    pub fn set_options(&self, options: RunOptions) -> Result<RunOptions, InstallerError> {
        self.options.save(&options)?;
        self.options.load()
    }

    pub fn update_options<F>(&self, f: F) -> Result<RunOptions, InstallerError>
    where
        F: FnOnce(&mut RunOptions),
    {
        self.options.update(f)
    }

    pub fn set_selected_installs(&self, ids: Vec<String>) -> Result<(), InstallerError> {
        self.options.set_selected_installs(ids).map(|_| ())
    }

    /// Progress events of patch flows started after subscribing.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<FlowEvent> {
        self.orchestrator.subscribe()
    }

    /// Run the full pipeline with the persisted options.
    pub async fn run_patch_flow(&self) -> Result<FlowResult, FlowError> {
        self.orchestrator.run_with(|| self.options.load()).await
    }

    pub async fn run_dev_test(
        &self,
        step: StepId,
        source: Option<PathBuf>,
    ) -> Result<DevTestOutcome, InstallerError> {
        let options = self.options.load()?;
        self.harness.run(step, options, source).await
    }

    pub fn list_backups(&self) -> Result<Vec<BackupEntry>, InstallerError> {
        self.backups().list()
    }

    pub fn delete_backups(&self, names: &[String]) -> DeleteReport {
        self.backups().delete(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepStatus;
    use crate::testing::{FakeCollaborator, FakeProcessTable};
    use std::fs;
    use std::sync::Arc;

    fn installer(tmp: &tempfile::TempDir) -> Installer {
        installer_with_token(tmp, RunToken::new())
    }

    fn installer_with_token(tmp: &tempfile::TempDir, token: RunToken) -> Installer {
        let paths = AppPaths::with_roots(tmp.path().join("app"), tmp.path().join("clients"));
        paths.ensure().unwrap();
        fs::create_dir_all(tmp.path().join("clients").join("discord")).unwrap();
        let registry = StepRegistry::new(
            TargetProcessRegistry::new(
                Arc::new(FakeProcessTable::new(vec![])),
                paths.client_root().to_path_buf(),
            ),
            BackupStore::open(paths.backups_dir()).unwrap(),
            Arc::new(FakeCollaborator::default()).collaborators(),
        );
        let options = OptionsStore::with_home(paths.options_file(), tmp.path().join("home"));
        Installer::with_parts(paths, options, registry, token)
    }

    #[test]
    fn set_options_round_trips_through_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app = installer(&tmp);
        let mut options = app.get_options().unwrap();
        options.max_backup_count = Some(5);
        options.close_before_backup = false;

        let stored = app.set_options(options.clone()).unwrap();

        assert_eq!(stored, options);
        assert_eq!(app.get_options().unwrap(), options);
    }

    #[test]
    fn installs_come_from_the_client_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app = installer(&tmp);
        let installs = app.list_installs();
        assert_eq!(installs.len(), 1);
        assert_eq!(installs[0].id, "stable");
    }

    #[tokio::test]
    async fn patch_flow_uses_persisted_selection() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app = installer(&tmp);

        let err = app.run_patch_flow().await.unwrap_err();
        assert_eq!(err.kind(), "config");

        app.set_selected_installs(vec!["stable".into()]).unwrap();
        let result = app.run_patch_flow().await.unwrap();
        assert_eq!(result.status(StepId::Inject), StepStatus::Completed);
        // The default source directory does not exist yet.
        assert_eq!(result.status(StepId::Backup), StepStatus::Skipped);
    }

    #[tokio::test]
    async fn rejected_run_leaves_options_file_untouched() {
        let tmp = tempfile::TempDir::new().unwrap();
        let token = RunToken::new();
        let app = installer_with_token(&tmp, token.clone());
        let _held = token.try_acquire().unwrap();

        let err = app.run_patch_flow().await.unwrap_err();

        assert!(matches!(err, FlowError::AlreadyRunning));
        assert!(!app.paths().options_file().exists());
    }

    #[tokio::test]
    async fn dev_test_backup_then_delete() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app = installer(&tmp);
        let source = tmp.path().join("src");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("f"), b"12345").unwrap();

        let outcome = app
            .run_dev_test(StepId::Backup, Some(source))
            .await
            .unwrap();
        let name = match outcome {
            DevTestOutcome::Backup { entry, .. } => entry.name,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(app.list_backups().unwrap().len(), 1);

        let report = app.delete_backups(&[name, "missing".to_string()]);
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(app.list_backups().unwrap().is_empty());
    }
}
