//! JSON file helpers shared by options persistence and run exports.

use crate::error::InstallerError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

/// Read and parse a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, InstallerError> {
    let text = fs::read_to_string(path)
        .map_err(|e| InstallerError::io(format!("read {}", path.display()), e))?;
    serde_json::from_str(&text).map_err(|e| {
        InstallerError::io(
            format!("parse {}", path.display()),
            io::Error::new(io::ErrorKind::InvalidData, e),
        )
    })
}

/// Pretty-print `value` to `path` via a `.tmp` sibling so readers never see a torn file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), InstallerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| InstallerError::io(format!("create {}", parent.display()), e))?;
    }
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        InstallerError::io(
            format!("serialize {}", path.display()),
            io::Error::new(io::ErrorKind::InvalidData, e),
        )
    })?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, text.as_bytes())
        .map_err(|e| InstallerError::io(format!("write {}", tmp.display()), e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        InstallerError::io(format!("replace {}", path.display()), e)
    })
}

/// Export a value as JSON at a user-chosen location.
pub fn export_json<T: Serialize>(path: &Path, value: &T) -> Result<(), InstallerError> {
    write_json_atomic(path, value)
}
