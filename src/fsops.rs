//! Filesystem primitives used when reflecting trees onto disk
//!
//! Every failure is wrapped with the operation and path that produced it.

use crate::error::ApiError;
use std::fs;
use std::path::Path;
use tracing::trace;
use walkdir::WalkDir;

/// Kind of entry found at a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// Stat a path without following a trailing symlink
pub fn stat(path: &Path) -> Result<Option<EntryKind>, ApiError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(Some(EntryKind::Directory)),
        Ok(meta) if meta.is_file() => Ok(Some(EntryKind::File)),
        Ok(_) => Ok(Some(EntryKind::Other)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ApiError::io(format!("stat {}", path.display()), e)),
    }
}

/// Copy one file, creating missing parent directories
pub fn copy_file(from: &Path, to: &Path) -> Result<(), ApiError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ApiError::io(format!("create {}", parent.display()), e))?;
    }
    fs::copy(from, to).map_err(|e| {
        ApiError::io(format!("copy {} to {}", from.display(), to.display()), e)
    })?;
    trace!(from = %from.display(), to = %to.display(), "Copied file");
    Ok(())
}

/// Copy a directory and everything under it
///
/// Regular files and directories are copied; symlinks and special files are
/// skipped, matching what the tree walker models.
pub fn copy_dir_recursive(from: &Path, to: &Path) -> Result<(), ApiError> {
    fs::create_dir_all(to).map_err(|e| ApiError::io(format!("create {}", to.display()), e))?;
    for entry in WalkDir::new(from).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let context = format!("walk {}", from.display());
            match e.into_io_error() {
                Some(io) => ApiError::io(context, io),
                None => ApiError::io(
                    context,
                    std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop"),
                ),
            }
        })?;
        let rel = entry.path().strip_prefix(from).map_err(|_| {
            ApiError::io(
                format!("walk {}", from.display()),
                std::io::Error::new(std::io::ErrorKind::Other, "entry escaped the walk root"),
            )
        })?;
        let target = to.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| ApiError::io(format!("create {}", target.display()), e))?;
        } else if file_type.is_file() {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Copy a file or a directory tree
pub fn copy_any(from: &Path, to: &Path) -> Result<(), ApiError> {
    match stat(from)? {
        Some(EntryKind::Directory) => copy_dir_recursive(from, to),
        Some(EntryKind::File) => copy_file(from, to),
        Some(EntryKind::Other) => Ok(()),
        None => Err(ApiError::NotFound(format!("{} does not exist", from.display()))),
    }
}

/// Remove a file or directory tree; a missing path is not an error
pub fn remove_all(path: &Path) -> Result<(), ApiError> {
    let result = match stat(path)? {
        Some(EntryKind::Directory) => fs::remove_dir_all(path),
        Some(_) => fs::remove_file(path),
        None => return Ok(()),
    };
    result.map_err(|e| ApiError::io(format!("remove {}", path.display()), e))
}

/// Remove everything inside a directory, keeping the directory itself
pub fn clear_dir(path: &Path) -> Result<(), ApiError> {
    if stat(path)?.is_none() {
        return fs::create_dir_all(path)
            .map_err(|e| ApiError::io(format!("create {}", path.display()), e));
    }
    let entries =
        fs::read_dir(path).map_err(|e| ApiError::io(format!("read {}", path.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ApiError::io(format!("read {}", path.display()), e))?;
        remove_all(&entry.path())?;
    }
    Ok(())
}

pub fn rename(from: &Path, to: &Path) -> Result<(), ApiError> {
    fs::rename(from, to).map_err(|e| {
        ApiError::io(format!("rename {} to {}", from.display(), to.display()), e)
    })
}
