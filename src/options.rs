//! Persisted run options (`user-options.json`).

use crate::backup::RetentionPolicy;
use crate::error::InstallerError;
use crate::storage::{read_json, write_json_atomic};
use crate::targets;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_REPO_URL: &str = "https://github.com/Vendicated/Vencord.git";

/// A theme stylesheet downloaded into the client's theme directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeSource {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    #[serde(alias = "vencordRepoUrl")]
    pub repo_url: String,
    #[serde(alias = "vencordRepoDir")]
    pub repo_dir: PathBuf,
    /// Default URL at the time the file was written; used to migrate stale defaults.
    #[serde(default, alias = "vencordRepoUrlDefault")]
    pub repo_url_default: Option<String>,
    #[serde(default)]
    pub user_repositories: Vec<String>,
    #[serde(default)]
    pub themes: Vec<ThemeSource>,
    #[serde(default = "default_true", alias = "closeDiscordOnBackup")]
    pub close_before_backup: bool,
    #[serde(default, alias = "selectedDiscordClients")]
    pub selected_installs: Vec<String>,
    #[serde(default)]
    pub max_backup_count: Option<u32>,
    #[serde(default)]
    pub max_backup_size_mb: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_repo_dir(home: &Path) -> PathBuf {
    home.join("Documents").join("Vencord")
}

fn legacy_repo_dir(home: &Path) -> PathBuf {
    home.join("Documents")
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::defaults_for(&home_dir())
    }
}

impl RunOptions {
    pub fn defaults_for(home: &Path) -> Self {
        Self {
            repo_url: DEFAULT_REPO_URL.to_string(),
            repo_dir: default_repo_dir(home),
            repo_url_default: Some(DEFAULT_REPO_URL.to_string()),
            user_repositories: Vec::new(),
            themes: Vec::new(),
            close_before_backup: true,
            selected_installs: Vec::new(),
            max_backup_count: None,
            max_backup_size_mb: None,
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_count: self.max_backup_count,
            max_size_mb: self.max_backup_size_mb,
        }
    }

    /// Plugin repository URLs with blank entries dropped.
    pub fn plugin_repositories(&self) -> Vec<String> {
        self.user_repositories
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Checks run before a patch flow touches anything.
    pub fn validate(&self) -> Result<(), InstallerError> {
        if self.selected_installs.is_empty() {
            return Err(InstallerError::Config(
                "no target installs selected".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for id in &self.selected_installs {
            if targets::variant_by_id(id).is_none() {
                return Err(InstallerError::Config(format!(
                    "unknown install id '{id}' (expected one of: {})",
                    targets::known_ids().join(", ")
                )));
            }
            if !seen.insert(id.as_str()) {
                return Err(InstallerError::Config(format!(
                    "install id '{id}' selected more than once"
                )));
            }
        }
        if self.repo_url.trim().is_empty() {
            return Err(InstallerError::Config(
                "repository URL is empty".to_string(),
            ));
        }
        if self.repo_dir.as_os_str().is_empty() {
            return Err(InstallerError::Config(
                "repository directory is empty".to_string(),
            ));
        }
        for theme in &self.themes {
            if theme.url.trim().is_empty() {
                return Err(InstallerError::Config(format!(
                    "theme '{}' has no URL",
                    theme.id
                )));
            }
        }
        Ok(())
    }

    /// Migrate outdated defaults. Returns true when anything changed.
    fn reconcile(&mut self, home: &Path) -> bool {
        let mut updated = false;

        let saved_default = self
            .repo_url_default
            .clone()
            .unwrap_or_else(|| DEFAULT_REPO_URL.to_string());
        if saved_default != DEFAULT_REPO_URL {
            if self.repo_url == saved_default {
                self.repo_url = DEFAULT_REPO_URL.to_string();
            }
            updated = true;
        }
        if self.repo_url_default.as_deref() != Some(DEFAULT_REPO_URL) {
            self.repo_url_default = Some(DEFAULT_REPO_URL.to_string());
            updated = true;
        }

        if self.repo_dir == legacy_repo_dir(home) {
            self.repo_dir = default_repo_dir(home);
            updated = true;
        }

        updated
    }
}

/// Loads and saves [`RunOptions`] at a fixed path.
#[derive(Debug, Clone)]
pub struct OptionsStore {
    path: PathBuf,
    home: PathBuf,
}

impl OptionsStore {
    pub fn new(path: PathBuf) -> Self {
        Self::with_home(path, home_dir())
    }

    /// Store whose defaults are derived from `home` instead of the user's home directory.
    pub fn with_home(path: PathBuf, home: PathBuf) -> Self {
        Self { path, home }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read options, creating or resetting the file to defaults when needed.
    pub fn load(&self) -> Result<RunOptions, InstallerError> {
        if self.path.exists() {
            match read_json::<RunOptions>(&self.path) {
                Ok(mut options) => {
                    if options.reconcile(&self.home) {
                        tracing::info!(path = %self.path.display(), "migrated outdated option defaults");
                        self.save(&options)?;
                    }
                    return Ok(options);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "options file unusable, resetting to defaults");
                }
            }
        }

        let defaults = RunOptions::defaults_for(&self.home);
        self.save(&defaults)?;
        Ok(defaults)
    }

    pub fn save(&self, options: &RunOptions) -> Result<(), InstallerError> {
        let mut stored = options.clone();
        stored.repo_url_default = Some(DEFAULT_REPO_URL.to_string());
        write_json_atomic(&self.path, &stored)
    }

    /// Apply `f` to the current options and persist the result.
    pub fn update<F>(&self, f: F) -> Result<RunOptions, InstallerError>
    where
        F: FnOnce(&mut RunOptions),
    {
        let mut options = self.load()?;
        f(&mut options);
        self.save(&options)?;
        Ok(options)
    }

    pub fn set_selected_installs(&self, ids: Vec<String>) -> Result<RunOptions, InstallerError> {
        self.update(|options| options.selected_installs = ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn store(tmp: &tempfile::TempDir) -> OptionsStore {
        OptionsStore::with_home(
            tmp.path().join("user-options.json"),
            tmp.path().join("home"),
        )
    }

    fn valid(home: &Path) -> RunOptions {
        let mut options = RunOptions::defaults_for(home);
        options.selected_installs = vec!["stable".into(), "ptb".into()];
        options
    }

    #[test]
    fn load_creates_defaults_when_missing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(&tmp);

        let options = store.load().unwrap();

        assert!(store.path().exists());
        assert!(options.close_before_backup);
        assert_eq!(options.repo_url, DEFAULT_REPO_URL);
        assert_eq!(
            options.repo_dir,
            tmp.path().join("home").join("Documents").join("Vencord")
        );
    }

    #[test]
    fn unparsable_file_is_reset() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(&tmp);
        fs::write(store.path(), "not json at all").unwrap();

        let options = store.load().unwrap();

        assert!(options.selected_installs.is_empty());
        let reread: RunOptions = read_json(store.path()).unwrap();
        assert_eq!(reread, options);
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(&tmp);
        let legacy = serde_json::json!({
            "vencordRepoUrl": "https://example.com/fork.git",
            "vencordRepoDir": "/src/fork",
            "vencordRepoUrlDefault": DEFAULT_REPO_URL,
            "userRepositories": [],
            "closeDiscordOnBackup": false,
            "selectedDiscordClients": ["canary"]
        });
        fs::write(store.path(), legacy.to_string()).unwrap();

        let options = store.load().unwrap();

        assert_eq!(options.repo_url, "https://example.com/fork.git");
        assert!(!options.close_before_backup);
        assert_eq!(options.selected_installs, vec!["canary".to_string()]);
        assert_eq!(options.max_backup_count, None);
    }

    #[test]
    fn reconcile_migrates_stale_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(&tmp);
        let home = tmp.path().join("home");
        let mut stale = RunOptions::defaults_for(&home);
        stale.repo_url = "https://old.example/Vencord.git".into();
        stale.repo_url_default = Some("https://old.example/Vencord.git".into());
        stale.repo_dir = home.join("Documents");
        fs::write(store.path(), serde_json::to_string(&stale).unwrap()).unwrap();

        let options = store.load().unwrap();

        assert_eq!(options.repo_url, DEFAULT_REPO_URL);
        assert_eq!(options.repo_dir, home.join("Documents").join("Vencord"));
        let persisted: RunOptions = read_json(store.path()).unwrap();
        assert_eq!(persisted.repo_url_default.as_deref(), Some(DEFAULT_REPO_URL));
    }

    #[test]
    fn set_selected_installs_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(&tmp);
        store
            .update(|o| {
                o.max_backup_count = Some(3);
                o.max_backup_size_mb = Some(0);
            })
            .unwrap();

        store
            .set_selected_installs(vec!["ptb".into(), "stable".into()])
            .unwrap();
        let options = store.load().unwrap();

        assert_eq!(options.selected_installs, vec!["ptb", "stable"]);
        assert_eq!(options.max_backup_count, Some(3));
        assert_eq!(options.max_backup_size_mb, Some(0));
    }

    #[test]
    fn validate_rejects_bad_selections() {
        let home = PathBuf::from("/home/u");
        assert!(valid(&home).validate().is_ok());

        let mut empty = valid(&home);
        empty.selected_installs.clear();
        let err = empty.validate().unwrap_err();
        assert_eq!(err.kind(), "config");

        let mut unknown = valid(&home);
        unknown.selected_installs.push("beta".into());
        assert!(unknown.validate().is_err());

        let mut dup = valid(&home);
        dup.selected_installs.push("stable".into());
        assert!(dup.validate().is_err());

        let mut blank_url = valid(&home);
        blank_url.repo_url = "   ".into();
        assert!(blank_url.validate().is_err());
    }

    #[test]
    fn plugin_repositories_skip_blank_entries() {
        let mut options = RunOptions::defaults_for(Path::new("/h"));
        options.user_repositories = vec![
            " https://github.com/a/plugin.git ".into(),
            "   ".into(),
            String::new(),
        ];
        assert_eq!(
            options.plugin_repositories(),
            vec!["https://github.com/a/plugin.git".to_string()]
        );
    }
}
