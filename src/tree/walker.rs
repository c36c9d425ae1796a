//! Filesystem walker for traversing directory structures

use crate::error::TreeError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Filesystem entry types
#[derive(Debug, Clone)]
pub enum Entry {
    /// A file entry with its absolute path and root-relative path
    File { path: PathBuf, relative: String },
    /// A directory entry with its absolute path and root-relative path
    Directory { path: PathBuf, relative: String },
}

impl Entry {
    pub fn relative(&self) -> &str {
        match self {
            Entry::File { relative, .. } | Entry::Directory { relative, .. } => relative,
        }
    }
}

/// Filesystem walker configuration
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Whether to follow symbolic links (default: false for determinism)
    pub follow_symlinks: bool,
}

/// Filesystem walker
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
}

impl Walker {
    /// Create a new walker for the given root path
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            config: WalkerConfig::default(),
        }
    }

    /// Create a walker with custom configuration
    pub fn with_config(root: PathBuf, config: WalkerConfig) -> Self {
        Self { root, config }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the filesystem and collect all entries below the root
    ///
    /// Entries come in preorder with siblings sorted by name, so a directory
    /// always precedes its contents.
    pub fn walk(&self) -> Result<Vec<Entry>, TreeError> {
        let mut entries = Vec::new();

        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| {
                TreeError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to walk directory: {}", e),
                ))
            })?;

            let path = entry.path().to_path_buf();
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map(|rel| {
                    rel.components()
                        .map(|c| c.as_os_str().to_string_lossy().to_string())
                        .collect::<Vec<_>>()
                        .join("/")
                })
                .map_err(|e| {
                    TreeError::IoError(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Entry {:?} escaped walk root: {}", path, e),
                    ))
                })?;

            let file_type = entry.file_type();
            if file_type.is_file() {
                entries.push(Entry::File { path, relative });
            } else if file_type.is_dir() {
                entries.push(Entry::Directory { path, relative });
            }
            // Skip symlinks and special files
        }

        Ok(entries)
    }
}
