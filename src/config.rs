//! Application directory layout.

use crate::error::InstallerError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "vencord-installer";

/// Resolved locations for everything the installer persists.
#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
    client_root: PathBuf,
}

impl AppPaths {
    /// Default layout: `<config dir>/vencord-installer`, clients detected under `<config dir>`.
    pub fn discover() -> Result<Self, InstallerError> {
        let base = dirs::config_dir().or_else(dirs::home_dir).ok_or_else(|| {
            InstallerError::io(
                "resolve configuration directory",
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "could not determine configuration directory",
                ),
            )
        })?;
        Ok(Self::with_roots(base.join(APP_DIR_NAME), base))
    }

    /// Custom application root (e.g. `--config-dir`); client detection keeps the platform default.
    pub fn with_root(root: PathBuf) -> Result<Self, InstallerError> {
        let client_root = dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| root.clone());
        Ok(Self::with_roots(root, client_root))
    }

    pub fn with_roots(root: PathBuf, client_root: PathBuf) -> Self {
        Self { root, client_root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options_file(&self) -> PathBuf {
        self.root.join("user-options.json")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Directory holding per-variant client data folders (`discord`, `discordptb`, ...).
    pub fn client_root(&self) -> &Path {
        &self.client_root
    }

    /// Where the client mod loads themes from.
    pub fn theme_dir(&self) -> PathBuf {
        self.client_root.join("Vencord").join("themes")
    }

    /// Create the application root and logs directory.
    pub fn ensure(&self) -> Result<(), InstallerError> {
        for dir in [self.root.clone(), self.logs_dir()] {
            fs::create_dir_all(&dir)
                .map_err(|e| InstallerError::io(format!("create {}", dir.display()), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_at_app_dir() {
        let paths = AppPaths::with_roots(PathBuf::from("/cfg/app"), PathBuf::from("/cfg"));
        assert_eq!(paths.options_file(), PathBuf::from("/cfg/app/user-options.json"));
        assert_eq!(paths.backups_dir(), PathBuf::from("/cfg/app/backups"));
        assert_eq!(paths.logs_dir(), PathBuf::from("/cfg/app/logs"));
        assert_eq!(paths.theme_dir(), PathBuf::from("/cfg/Vencord/themes"));
    }

    #[test]
    fn ensure_creates_root_and_logs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = AppPaths::with_roots(tmp.path().join("app"), tmp.path().to_path_buf());
        paths.ensure().unwrap();
        assert!(paths.logs_dir().is_dir());
    }
}
