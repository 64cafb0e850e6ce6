//! Directory tree copy and sizing for snapshots.

use std::fs;
use std::io;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Directories never carried into a snapshot.
const EXCLUDED_DIRS: &[&str] = &["node_modules"];

fn is_excluded(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|n| EXCLUDED_DIRS.contains(&n))
}

/// Copy `source` into a new directory at `destination`. Returns bytes copied.
///
/// Symlinks are recreated rather than followed on Unix.
pub fn copy_tree(source: &Path, destination: &Path) -> io::Result<u64> {
    fs::create_dir(destination)?;
    let mut copied = 0u64;

    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_excluded(e));
    for entry in walker {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let target = destination.join(relative);

        if entry.path_is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else if entry.file_type().is_dir() {
            fs::create_dir(&target)?;
        } else {
            copied += fs::copy(entry.path(), &target)?;
        }
    }

    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(path: &Path, target: &Path) -> io::Result<()> {
    let link = fs::read_link(path)?;
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn copy_symlink(path: &Path, target: &Path) -> io::Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => fs::copy(path, target).map(|_| ()),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "directory link left out of backup");
            Ok(())
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "dangling link left out of backup");
            Ok(())
        }
    }
}

/// Total size of regular files below `path`, not following symlinks.
pub fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}
