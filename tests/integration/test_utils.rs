//! Shared helpers for integration tests

use reflect::changemap::ChangeMap;
use reflect::registry::Registry;
use reflect::tree::path;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Relative path -> file content (directories map to None)
pub fn snapshot(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|entry| entry.unwrap())
        .map(|entry| {
            let rel = path::relative_to(root, entry.path()).unwrap();
            let content = if entry.file_type().is_dir() {
                None
            } else {
                Some(fs::read(entry.path()).unwrap())
            };
            (rel, content)
        })
        .collect()
}

/// Write `files` (relative path, content) under `root`, creating parents
pub fn populate(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let target = path::to_fs_path(root, rel);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(target, content).unwrap();
    }
}

/// Fresh maps for an original and a reflection in disjoint id spaces
pub fn fresh_pair(
    registry: &Registry,
    code: &str,
    original: &Path,
    reflection: &Path,
) -> (Box<dyn ChangeMap>, Box<dyn ChangeMap>) {
    let factory = registry.change_map(code).unwrap();
    fs::create_dir_all(reflection).unwrap();
    let original = factory.create(original).unwrap();
    let mut reflection = factory.create(reflection).unwrap();
    let offset = original.tree().next_id();
    reflection.tree_mut().rebase_ids(offset);
    (original, reflection)
}

pub fn canonical(path: PathBuf) -> PathBuf {
    path::normalize_root(&path)
}
