//! Integration tests for reflector convergence

use super::test_utils::{fresh_pair, populate, snapshot};
use reflect::changemap::UpdateBatch;
use reflect::registry::Registry;
use std::fs;
use tempfile::TempDir;

/// After a backup the reflection mirrors the original on disk and in its map
#[test]
fn test_every_strategy_pair_converges() {
    let registry = Registry::default();
    for reflector_code in registry.reflector_codes() {
        for map_code in registry.change_map_codes() {
            let temp_dir = TempDir::new().unwrap();
            let original = temp_dir.path().join("original");
            let reflection = temp_dir.path().join("reflection");
            populate(
                &original,
                &[("a.txt", "a"), ("nested/deep/b.txt", "b"), ("nested/c.txt", "c")],
            );
            populate(&reflection, &[("stale.txt", "old"), ("nested/c.txt", "other")]);

            let (orig_map, refl_map) = fresh_pair(&registry, map_code, &original, &reflection);
            let mut reflector = registry
                .reflector(reflector_code)
                .unwrap()
                .create(orig_map, refl_map);
            reflector.backup().unwrap();

            assert_eq!(snapshot(&original), snapshot(&reflection), "{}/{}", reflector_code, map_code);
            assert_eq!(reflector.original().root_hash(), reflector.reflection().root_hash());
            assert!(reflector
                .reflection()
                .change_log(reflector.original())
                .unwrap()
                .is_empty());
        }
    }
}

/// Incremental edits of every kind are replayed by the diff reflector
#[test]
fn test_incremental_edits_converge() {
    let temp_dir = TempDir::new().unwrap();
    let original = temp_dir.path().join("original");
    let reflection = temp_dir.path().join("reflection");
    populate(
        &original,
        &[("a.txt", "a"), ("b.txt", "b"), ("docs/readme.md", "r"), ("old/x.txt", "x")],
    );

    let registry = Registry::default();
    let (orig_map, refl_map) = fresh_pair(&registry, "blake3", &original, &reflection);
    let mut reflector = registry.reflector("diff").unwrap().create(orig_map, refl_map);
    reflector.backup().unwrap();

    // Delete a tree, rename a directory, edit and create files
    fs::remove_dir_all(original.join("old")).unwrap();
    fs::rename(original.join("docs"), original.join("manual")).unwrap();
    fs::write(original.join("a.txt"), "edited").unwrap();
    fs::create_dir(original.join("new")).unwrap();
    fs::write(original.join("new/y.txt"), "y").unwrap();

    let files = UpdateBatch::default()
        .rename("a.txt", "a.txt")
        .create("new/y.txt");
    let dirs = UpdateBatch::default()
        .delete("old")
        .create("new")
        .rename("docs", "manual");
    reflector.original_mut().update(&files, &dirs).unwrap();
    reflector.backup().unwrap();

    assert_eq!(snapshot(&original), snapshot(&reflection));
    assert_eq!(reflector.original().root_hash(), reflector.reflection().root_hash());
}

/// Two files trading names end up with the right content on each side
#[test]
fn test_swapped_names_converge() {
    let temp_dir = TempDir::new().unwrap();
    let original = temp_dir.path().join("original");
    let reflection = temp_dir.path().join("reflection");
    populate(&original, &[("left.txt", "L"), ("right.txt", "R")]);

    let registry = Registry::default();
    let (orig_map, refl_map) = fresh_pair(&registry, "sha256", &original, &reflection);
    let mut reflector = registry.reflector("diff").unwrap().create(orig_map, refl_map);
    reflector.backup().unwrap();

    let none = UpdateBatch::default();
    fs::rename(original.join("left.txt"), original.join("tmp.txt")).unwrap();
    reflector
        .original_mut()
        .update(&UpdateBatch::default().rename("left.txt", "tmp.txt"), &none)
        .unwrap();
    fs::rename(original.join("right.txt"), original.join("left.txt")).unwrap();
    reflector
        .original_mut()
        .update(&UpdateBatch::default().rename("right.txt", "left.txt"), &none)
        .unwrap();
    fs::rename(original.join("tmp.txt"), original.join("right.txt")).unwrap();
    reflector
        .original_mut()
        .update(&UpdateBatch::default().rename("tmp.txt", "right.txt"), &none)
        .unwrap();
    reflector.backup().unwrap();

    assert_eq!(fs::read_to_string(reflection.join("left.txt")).unwrap(), "R");
    assert_eq!(fs::read_to_string(reflection.join("right.txt")).unwrap(), "L");
}

/// Recovery rebuilds a damaged original from its reflection
#[test]
fn test_recover_restores_original() {
    let temp_dir = TempDir::new().unwrap();
    let original = temp_dir.path().join("original");
    let reflection = temp_dir.path().join("reflection");
    populate(&original, &[("a.txt", "a"), ("dir/b.txt", "b")]);

    let registry = Registry::default();
    let (orig_map, refl_map) = fresh_pair(&registry, "blake3", &original, &reflection);
    let mut reflector = registry.reflector("diff").unwrap().create(orig_map, refl_map);
    reflector.backup().unwrap();
    let expected = snapshot(&reflection);

    fs::remove_dir_all(original.join("dir")).unwrap();
    fs::write(original.join("junk.bin"), "junk").unwrap();
    reflector.recover().unwrap();

    assert_eq!(snapshot(&original), expected);
    assert_eq!(reflector.original().root_hash(), reflector.reflection().root_hash());
}
