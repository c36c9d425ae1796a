//! Root-relative path helpers
//!
//! Tree paths are `/`-separated and relative to the modeled root, excluding the
//! root's own name. The empty string addresses the root itself.

use std::path::{Component, Path, PathBuf};

/// Split a relative path into its non-empty segments
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

/// Normalize a relative path string: drop empty and `.` segments, trailing slashes
pub fn normalize(path: &str) -> String {
    segments(path).join("/")
}

/// Join a child name onto a relative parent path
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Split a relative path into (parent path, base name)
pub fn split_parent(path: &str) -> (String, String) {
    let mut parts = segments(path);
    let name = parts.pop().unwrap_or_default().to_string();
    (parts.join("/"), name)
}

/// Express `path` relative to `root`, if it lies under it
///
/// Relative inputs are taken as already relative to the root.
pub fn relative_to(root: &Path, path: &Path) -> Option<String> {
    let rel = if path.is_absolute() {
        path.strip_prefix(root).ok()?
    } else {
        path
    };
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(name) => parts.push(name.to_string_lossy().to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

/// Resolve a relative tree path under a filesystem root
pub fn to_fs_path(root: &Path, path: &str) -> PathBuf {
    segments(path)
        .into_iter()
        .fold(root.to_path_buf(), |acc, seg| acc.join(seg))
}

/// Canonicalize a root directory when it exists, otherwise strip trailing separators
pub fn normalize_root(path: &Path) -> PathBuf {
    if let Ok(canonical) = dunce::canonicalize(path) {
        return canonical;
    }
    let mut s = path.to_string_lossy().to_string();
    while s.len() > 1 && (s.ends_with('/') || s.ends_with('\\')) {
        s.pop();
    }
    PathBuf::from(s)
}
