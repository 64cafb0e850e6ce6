//! Point-in-time snapshots of the install directory with retention.
//!
//! Every mutating call on one backups area (`create`, `delete`,
//! `enforce_retention`) runs under a lock shared by all stores opened on that
//! area. Snapshots are copied into a hidden staging directory and renamed into
//! place only when the copy finished, so a listed entry is always complete.

mod fs_ops;
mod retention;

pub use retention::{plan_prune, RetentionPolicy};

use crate::error::InstallerError;
use crate::model::BackupEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::SystemTime;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

const STAGING_PREFIX: &str = ".partial-";
const NAME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]-[subsecond digits:3]");
const NAME_TIMESTAMP_LEN: usize = 23;
const MAX_NAME_SUFFIX: u32 = 99;
/// Subdirectory of a snapshot holding the client's theme directory.
pub const THEMES_SUBDIR: &str = "client-themes";

/// Result of a successful `create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupOutcome {
    pub entry: BackupEntry,
    /// Entries removed by retention right after the snapshot, oldest first.
    pub pruned: Vec<String>,
    /// Whether the client theme directory was captured under [`THEMES_SUBDIR`].
    #[serde(default)]
    pub themes_included: bool,
    /// Set when the snapshot was kept but retention could not be applied.
    #[serde(default)]
    pub prune_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFailure {
    pub name: String,
    pub error: String,
}

/// Per-name outcome of a multi-name delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub failures: Vec<DeleteFailure>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

fn area_lock(root: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let key = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let mut locks = LOCKS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(key).or_default().clone()
}

/// Backups area rooted at one directory.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl BackupStore {
    /// Open (creating if needed) the backups area and drop leftovers of
    /// interrupted snapshots.
    pub fn open(root: PathBuf) -> Result<Self, InstallerError> {
        fs::create_dir_all(&root)
            .map_err(|e| InstallerError::io(format!("create {}", root.display()), e))?;
        let store = Self {
            lock: area_lock(&root),
            root,
        };
        store.remove_stale_staging();
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove_stale_staging(&self) {
        let _guard = self.guard();
        let Ok(dir) = fs::read_dir(&self.root) else {
            return;
        };
        for entry in dir.flatten() {
            let is_staging = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(STAGING_PREFIX));
            if is_staging {
                let path = entry.path();
                match fs::remove_dir_all(&path) {
                    Ok(()) => tracing::info!(path = %path.display(), "removed interrupted backup"),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "could not remove interrupted backup")
                    }
                }
            }
        }
    }

    /// Snapshot `source`, then apply `policy`.
    pub fn create(
        &self,
        source: &Path,
        policy: &RetentionPolicy,
    ) -> Result<BackupOutcome, InstallerError> {
        self.create_with(source, None, policy, fs_ops::copy_tree)
    }

    /// Snapshot `source` plus the client theme directory, when it exists, as
    /// one entry. The themes land in [`THEMES_SUBDIR`].
    pub fn create_with_themes(
        &self,
        source: &Path,
        theme_dir: &Path,
        policy: &RetentionPolicy,
    ) -> Result<BackupOutcome, InstallerError> {
        let themes = theme_dir.is_dir().then_some(theme_dir);
        self.create_with(source, themes, policy, fs_ops::copy_tree)
    }

    fn create_with<F>(
        &self,
        source: &Path,
        themes: Option<&Path>,
        policy: &RetentionPolicy,
        copy: F,
    ) -> Result<BackupOutcome, InstallerError>
    where
        F: FnOnce(&Path, &Path) -> io::Result<u64>,
    {
        let meta = fs::metadata(source)
            .map_err(|e| InstallerError::io(format!("backup source {}", source.display()), e))?;
        if !meta.is_dir() {
            return Err(InstallerError::io(
                format!("backup source {}", source.display()),
                io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        let _guard = self.guard();
        fs::create_dir_all(&self.root)
            .map_err(|e| InstallerError::io(format!("create {}", self.root.display()), e))?;

        let name = self.unique_name(OffsetDateTime::now_utc())?;
        let staging = self.root.join(format!("{STAGING_PREFIX}{name}"));
        let final_path = self.root.join(&name);

        tracing::info!(source = %source.display(), backup = %name, "creating backup");
        if let Err(e) = copy(source, &staging) {
            discard(&staging);
            return Err(InstallerError::io(
                format!("copy {} into backup {name}", source.display()),
                e,
            ));
        }
        if let Some(theme_dir) = themes {
            if let Err(e) = fs_ops::copy_tree(theme_dir, &staging.join(THEMES_SUBDIR)) {
                discard(&staging);
                return Err(InstallerError::io(
                    format!("copy themes {} into backup {name}", theme_dir.display()),
                    e,
                ));
            }
        }
        if let Err(e) = fs::rename(&staging, &final_path) {
            discard(&staging);
            return Err(InstallerError::io(format!("finalize backup {name}"), e));
        }

        let entry = read_entry(&final_path)
            .map_err(|e| InstallerError::io(format!("inspect backup {name}"), e))?
            .ok_or_else(|| {
                InstallerError::io(
                    format!("inspect backup {name}"),
                    io::Error::new(io::ErrorKind::NotFound, "backup vanished after copy"),
                )
            })?;
        tracing::info!(backup = %entry.name, size_bytes = entry.size_bytes, "backup created");

        let pruned = self.prune_locked(policy);
        Ok(finish_outcome(entry, themes.is_some(), pruned))
    }

    fn unique_name(&self, now: OffsetDateTime) -> Result<String, InstallerError> {
        let base = now.format(NAME_FORMAT).map_err(|e| {
            InstallerError::io(
                "format backup name",
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        })?;
        let taken = |name: &str| {
            self.root.join(name).exists()
                || self.root.join(format!("{STAGING_PREFIX}{name}")).exists()
        };
        if !taken(&base) {
            return Ok(base);
        }
        (1..=MAX_NAME_SUFFIX)
            .map(|n| format!("{base}-{n:02}"))
            .find(|candidate| !taken(candidate))
            .ok_or_else(|| {
                InstallerError::io(
                    "allocate backup name",
                    io::Error::new(io::ErrorKind::AlreadyExists, base.clone()),
                )
            })
    }

    /// Entries ordered newest first.
    pub fn list(&self) -> Result<Vec<BackupEntry>, InstallerError> {
        let mut entries = self.scan()?;
        entries.sort_by(|a, b| (b.created_at, &b.name).cmp(&(a.created_at, &a.name)));
        Ok(entries)
    }

    fn scan(&self) -> Result<Vec<BackupEntry>, InstallerError> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(InstallerError::io(
                    format!("read {}", self.root.display()),
                    e,
                ))
            }
        };
        let mut entries = Vec::new();
        for dirent in dir {
            let dirent = dirent
                .map_err(|e| InstallerError::io(format!("read {}", self.root.display()), e))?;
            match read_entry(&dirent.path()) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                // Removed by a concurrent prune between read_dir and stat.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(InstallerError::io(
                        format!("inspect {}", dirent.path().display()),
                        e,
                    ))
                }
            }
        }
        Ok(entries)
    }

    /// Delete each named entry, collecting failures instead of stopping.
    pub fn delete(&self, names: &[String]) -> DeleteReport {
        let _guard = self.guard();
        let mut report = DeleteReport::default();

        for name in names {
            match self.delete_one(name) {
                Ok(()) => {
                    tracing::info!(backup = %name, "backup deleted");
                    report.deleted.push(name.clone());
                }
                Err(error) => {
                    tracing::warn!(backup = %name, %error, "backup not deleted");
                    report.failures.push(DeleteFailure {
                        name: name.clone(),
                        error,
                    });
                }
            }
        }
        report
    }

    fn delete_one(&self, name: &str) -> Result<(), String> {
        if !is_valid_name(name) {
            return Err(format!("invalid backup name '{name}'"));
        }
        let path = self.root.join(name);
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(format!("'{name}' is not a backup")),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(format!("backup '{name}' does not exist"))
            }
            Err(e) => return Err(e.to_string()),
        }
        fs::remove_dir_all(&path).map_err(|e| e.to_string())
    }

    /// Remove oldest entries until `policy` holds. Returns the removed names.
    pub fn enforce_retention(&self, policy: &RetentionPolicy) -> Result<Vec<String>, InstallerError> {
        let _guard = self.guard();
        self.prune_locked(policy)
    }

    fn prune_locked(&self, policy: &RetentionPolicy) -> Result<Vec<String>, InstallerError> {
        if !policy.is_bounded() {
            return Ok(Vec::new());
        }
        let entries = self.scan()?;
        let doomed = plan_prune(&entries, policy);
        let mut removed = Vec::with_capacity(doomed.len());
        for name in doomed {
            let path = self.root.join(&name);
            fs::remove_dir_all(&path)
                .map_err(|e| InstallerError::io(format!("prune backup {name}"), e))?;
            tracing::info!(backup = %name, "pruned backup");
            removed.push(name);
        }
        Ok(removed)
    }
}

/// The snapshot is already in place when retention runs, so a prune failure
/// is recorded on the outcome instead of failing the create.
fn finish_outcome(
    entry: BackupEntry,
    themes_included: bool,
    pruned: Result<Vec<String>, InstallerError>,
) -> BackupOutcome {
    let (pruned, prune_error) = match pruned {
        Ok(pruned) => (pruned, None),
        Err(e) => {
            tracing::warn!(backup = %entry.name, error = %e, "retention not applied");
            (Vec::new(), Some(e.to_string()))
        }
    };
    BackupOutcome {
        entry,
        pruned,
        themes_included,
        prune_error,
    }
}

fn discard(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %staging.display(), error = %e, "could not remove partial backup");
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some_and(|n| n == name)
}

/// Creation time encoded in a generated name, if it is one.
fn timestamp_from_name(name: &str) -> Option<OffsetDateTime> {
    let stamp = name.get(..NAME_TIMESTAMP_LEN)?;
    PrimitiveDateTime::parse(stamp, NAME_FORMAT)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Describe a directory in the backups area; `None` for hidden entries and files.
fn read_entry(path: &Path) -> io::Result<Option<BackupEntry>> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(None);
    };
    if name.starts_with('.') {
        return Ok(None);
    }
    let meta = fs::symlink_metadata(path)?;
    if !meta.is_dir() {
        return Ok(None);
    }
    let created_at = timestamp_from_name(name).unwrap_or_else(|| {
        let stamp = meta
            .created()
            .or_else(|_| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        OffsetDateTime::from(stamp)
    });
    Ok(Some(BackupEntry {
        name: name.to_string(),
        path: path.to_path_buf(),
        size_bytes: fs_ops::dir_size(path)?,
        created_at,
    }))
}
