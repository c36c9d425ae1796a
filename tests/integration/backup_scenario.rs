//! End-to-end command scenarios through the executor

use super::test_utils::{canonical, populate, snapshot};
use reflect::config::DefaultsConfig;
use reflect::drive::StaticDriveResolver;
use reflect::executor::{Executor, Reply};
use reflect::registry::Registry;
use reflect::store::{MemoryMetadataStore, MetadataStore};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

/// a.txt replaced by b.txt reaches the reflection through update and backup
#[test]
fn test_delete_then_create_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let original = temp_dir.path().join("original");
    let reflection = temp_dir.path().join("reflection");
    populate(&original, &[("a.txt", "first")]);
    let original = canonical(original);

    let store = Arc::new(MemoryMetadataStore::new());
    let registry = Arc::new(Registry::default());
    let mut executor = Executor::new(
        store.clone(),
        registry.clone(),
        Arc::new(StaticDriveResolver::new()),
        DefaultsConfig::default(),
    );
    let root = original.display().to_string();

    let register = format!("new-backup:{},{},diff,blake3,false", root, reflection.display());
    assert_eq!(executor.handle_line(&register), Reply::Success);
    assert_eq!(fs::read_to_string(reflection.join("a.txt")).unwrap(), "first");

    fs::remove_file(original.join("a.txt")).unwrap();
    fs::write(original.join("b.txt"), "second").unwrap();
    assert_eq!(executor.handle_line(&format!("update:delete,{},a.txt,false", root)), Reply::Success);
    assert_eq!(executor.handle_line(&format!("update:create,{},b.txt,false", root)), Reply::Success);
    assert_eq!(executor.handle_line(&format!("backup:{}", root)), Reply::Success);

    let listing: Vec<String> = snapshot(&reflection).into_keys().collect();
    assert_eq!(listing, vec!["b.txt".to_string()]);

    let record = store.get(&root).unwrap().unwrap();
    let factory = registry.change_map(&record.change_map_code).unwrap();
    let original_map = factory.load(&record.original_map, None).unwrap();
    let reflection_map = factory.load(&record.reflection_map, None).unwrap();
    assert_eq!(original_map.root_hash(), reflection_map.root_hash());
    assert!(reflection_map.change_log(original_map.as_ref()).unwrap().is_empty());
}

/// Mirrored pairs follow every update without an explicit backup
#[test]
fn test_mirrored_pair_tracks_updates() {
    let temp_dir = TempDir::new().unwrap();
    let original = temp_dir.path().join("original");
    let reflection = temp_dir.path().join("reflection");
    populate(&original, &[("notes/todo.txt", "milk")]);
    let original = canonical(original);
    let root = original.display().to_string();

    let store = Arc::new(MemoryMetadataStore::new());
    let mut executor = Executor::new(
        store.clone(),
        Arc::new(Registry::default()),
        Arc::new(StaticDriveResolver::new()),
        DefaultsConfig::default(),
    );
    let register = format!("new-backup:{},{},,", root, reflection.display());
    assert_eq!(executor.handle_line(&register), Reply::Success);

    let record = store.get(&root).unwrap().unwrap();
    assert_eq!(record.reflector_code, "diff");
    assert_eq!(record.change_map_code, "blake3");
    assert!(record.drive_label.is_empty());

    fs::rename(original.join("notes"), original.join("lists")).unwrap();
    let rename = format!("update:rename,{},notes,lists,true", root);
    assert_eq!(executor.handle_line(&rename), Reply::Success);
    assert_eq!(snapshot(&original), snapshot(&reflection));

    fs::write(original.join("lists/todo.txt"), "milk, eggs").unwrap();
    let write = format!("update:write,{},lists/todo.txt", root);
    assert_eq!(executor.handle_line(&write), Reply::Success);
    assert_eq!(
        fs::read_to_string(reflection.join("lists/todo.txt")).unwrap(),
        "milk, eggs"
    );
}

/// Unknown roots and malformed lines fail without touching the store
#[test]
fn test_failures_leave_store_untouched() {
    let store = Arc::new(MemoryMetadataStore::new());
    let mut executor = Executor::new(
        store.clone(),
        Arc::new(Registry::default()),
        Arc::new(StaticDriveResolver::new()),
        DefaultsConfig::default(),
    );

    assert_eq!(executor.handle_line("backup:/no/such/root"), Reply::Fail);
    assert_eq!(executor.handle_line("update:create,/no/such/root,a.txt"), Reply::Fail);
    assert_eq!(executor.handle_line("update:teleport,/x,a"), Reply::Fail);
    assert_eq!(executor.handle_line("new-backup:/x"), Reply::Fail);
    assert!(store.keys().unwrap().is_empty());
}
