//! Integration tests for change log properties

use super::test_utils::{fresh_pair, populate};
use reflect::changemap::UpdateBatch;
use reflect::reflector::DiffReflector;
use reflect::reflector::Reflector;
use reflect::registry::Registry;
use std::fs;
use tempfile::TempDir;

/// A map diffed against itself produces nothing
#[test]
fn test_change_log_of_identical_maps_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let original = temp_dir.path().join("original");
    populate(&original, &[("a.txt", "a"), ("dir/b.txt", "b")]);

    let registry = Registry::default();
    let factory = registry.change_map("blake3").unwrap();
    let map = factory.create(&original).unwrap();
    let copy = factory.load(&map.serialize(), None).unwrap();

    assert!(map.change_log(copy.as_ref()).unwrap().is_empty());
}

/// Renaming a file yields exactly one rename and no delete/create pair
#[test]
fn test_rename_is_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let original = temp_dir.path().join("original");
    let reflection = temp_dir.path().join("reflection");
    populate(&original, &[("dir/a.txt", "same"), ("keep.txt", "k")]);

    let registry = Registry::default();
    let (orig_map, refl_map) = fresh_pair(&registry, "sha256", &original, &reflection);
    let mut reflector = DiffReflector::new(orig_map, refl_map);
    reflector.backup().unwrap();

    fs::rename(original.join("dir/a.txt"), original.join("dir/renamed.txt")).unwrap();
    reflector
        .original_mut()
        .update(&UpdateBatch::default().rename("dir/a.txt", "renamed.txt"), &UpdateBatch::default())
        .unwrap();

    let log = reflector
        .reflection()
        .change_log(reflector.original())
        .unwrap();
    assert!(log.creations.is_empty());
    assert!(log.deletions.is_empty());
    assert_eq!(log.updates.len(), 1);
    assert!(log.updates[0].is_rename());
    assert_eq!(log.updates[0].path, "dir/a.txt");
    assert_eq!(log.updates[0].new_name, "renamed.txt");
}

/// A directory hash moves exactly when something beneath it moved
#[test]
fn test_hash_propagation() {
    let temp_dir = TempDir::new().unwrap();
    let original = temp_dir.path().join("original");
    populate(&original, &[("left/a.txt", "a"), ("right/b.txt", "b")]);

    let registry = Registry::default();
    let factory = registry.change_map("blake3").unwrap();
    let mut map = factory.create(&original).unwrap();
    let left = map.tree().node_at("left").unwrap().hash;
    let right = map.tree().node_at("right").unwrap().hash;
    let root = map.root_hash();

    fs::write(original.join("left/a.txt"), "changed").unwrap();
    map.update(&UpdateBatch::default().rename("left/a.txt", "a.txt"), &UpdateBatch::default())
        .unwrap();

    assert_ne!(map.tree().node_at("left").unwrap().hash, left);
    assert_eq!(map.tree().node_at("right").unwrap().hash, right);
    assert_ne!(map.root_hash(), root);
}
