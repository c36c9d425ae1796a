//! Integration tests for tree serialization

use reflect::registry::Registry;
use reflect::tree::{codec, Blake3Hasher, TreeBuilder};
use std::fs;
use tempfile::TempDir;

/// Names containing every escaped character survive encode/decode
#[test]
fn test_awkward_names_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("root");
    fs::create_dir_all(root.join("a,b")).unwrap();
    fs::write(root.join("a,b").join("x)y|z.txt"), "1").unwrap();
    fs::write(root.join("back\\slash"), "2").unwrap();
    fs::create_dir(root.join("empty")).unwrap();

    let tree = TreeBuilder::new(root, &Blake3Hasher).build().unwrap();
    let decoded = codec::decode(&codec::encode(&tree)).unwrap();

    assert_eq!(decoded, tree);
    assert!(decoded.node_at("a,b/x)y|z.txt").is_some());
    assert!(decoded.node_at("back\\slash").is_some());
    assert!(decoded.node_at("empty").unwrap().is_dir);
}

/// Serialized change maps reload with the same tree and strategy
#[test]
fn test_change_map_round_trip_for_every_strategy() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("docs");
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("sub").join("notes.md"), "# notes").unwrap();

    let registry = Registry::default();
    for code in registry.change_map_codes() {
        let factory = registry.change_map(code).unwrap();
        let map = factory.create(&root).unwrap();
        let loaded = factory.load(&map.serialize(), None).unwrap();

        assert_eq!(loaded.code(), code);
        assert_eq!(loaded.tree(), map.tree());
        assert_eq!(loaded.root_path(), map.root_path());
        assert_eq!(loaded.tree().next_id(), map.tree().next_id());
    }
}

/// Truncated input is rejected rather than half-decoded
#[test]
fn test_truncated_stream_is_malformed() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("a.txt"), "a").unwrap();
    let tree = TreeBuilder::new(temp_dir.path().to_path_buf(), &Blake3Hasher)
        .build()
        .unwrap();
    let encoded = codec::encode(&tree);

    let truncated = &encoded[..encoded.len() / 2];
    assert!(codec::decode(truncated).is_err());
}
