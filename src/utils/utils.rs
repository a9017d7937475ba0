use anyhow::Context;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MeshError;

/// Regular files directly inside `dir`, sorted by file name.
pub fn list_regular_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| MeshError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MeshError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// File name as UTF-8, empty when the path has none.
pub fn file_name_str(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

pub fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| MeshError::io(dir, e))?;
        debug!("Created directory {}", dir.display());
    }
    Ok(())
}

/// Moves `from` to `to`, falling back to copy + remove when a plain rename
/// is not possible (e.g. across filesystems). Overwrites an existing target.
pub fn relocate(from: &Path, to: &Path) -> anyhow::Result<()> {
    if let Some(parent) = to.parent() {
        ensure_dir(parent)?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)
        .map_err(|e| MeshError::io(from, e))
        .with_context(|| format!("Could not move {} to {}", from.display(), to.display()))?;
    fs::remove_file(from).map_err(|e| MeshError::io(from, e))?;
    Ok(())
}
