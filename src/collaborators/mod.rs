//! Step collaborators: the repository sync, build, inject and theme download
//! stages the orchestrator drives but does not implement itself.
//!
//! Each trait is called from a blocking worker thread, so implementations may
//! block on subprocesses or network I/O.

mod command;
mod git;
mod pnpm;
mod themes;

pub use git::GitRepoSyncer;
pub use pnpm::{PnpmBuilder, PnpmInjector};
pub use themes::HttpThemeFetcher;

use crate::error::InstallerError;
use crate::options::ThemeSource;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Clones or updates the mod's source tree.
pub trait RepoSyncer: Send + Sync {
    /// Returns the path of the synced working tree.
    fn sync(
        &self,
        repo_url: &str,
        repo_dir: &Path,
        plugin_urls: &[String],
    ) -> Result<PathBuf, InstallerError>;
}

/// Builds the synced source tree.
pub trait Builder: Send + Sync {
    fn build(&self, repo_dir: &Path) -> Result<String, InstallerError>;
}

/// Patches built output into client installs.
pub trait Injector: Send + Sync {
    fn inject(&self, repo_dir: &Path, locations: &[PathBuf]) -> Result<String, InstallerError>;
}

/// Downloads theme stylesheets. Returns the file names written.
pub trait ThemeFetcher: Send + Sync {
    fn fetch(&self, themes: &[ThemeSource]) -> Result<Vec<String>, InstallerError>;
}

/// The four collaborators one orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub repo: Arc<dyn RepoSyncer>,
    pub builder: Arc<dyn Builder>,
    pub injector: Arc<dyn Injector>,
    pub themes: Arc<dyn ThemeFetcher>,
}

impl Collaborators {
    /// git, pnpm and HTTP backed implementations.
    pub fn system(theme_dir: PathBuf) -> Self {
        Self {
            repo: Arc::new(GitRepoSyncer),
            builder: Arc::new(PnpmBuilder),
            injector: Arc::new(PnpmInjector),
            themes: Arc::new(HttpThemeFetcher::new(theme_dir)),
        }
    }
}
