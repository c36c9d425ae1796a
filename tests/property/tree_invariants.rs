//! Property-based tests for encoding, diffing and hashing of trees

use proptest::prelude::*;
use reflect::changemap::log::diff;
use reflect::tree::{codec, Blake3Hasher, NodeHasher, Tree};
use reflect::tree::path;

/// (parent pick, name, is_dir, content) steps that grow a tree
fn steps() -> impl Strategy<Value = Vec<(usize, String, bool, Vec<u8>)>> {
    prop::collection::vec(
        (
            any::<usize>(),
            "[a-z0-9 ,()|\\\\._-]{1,8}",
            any::<bool>(),
            prop::collection::vec(any::<u8>(), 0..16),
        ),
        0..40,
    )
}

fn grow(steps: &[(usize, String, bool, Vec<u8>)]) -> Tree {
    let hasher = Blake3Hasher;
    let mut tree = Tree::new("root");
    let mut dirs = vec![String::new()];
    for (pick, name, is_dir, content) in steps {
        if name == "." || name == ".." {
            continue;
        }
        let parent = dirs[pick % dirs.len()].clone();
        let rel = path::join(&parent, name);
        let hash = hasher.hash_leaf(content, name);
        if tree.add_child(&rel, hash, *is_dir).is_ok() && *is_dir {
            dirs.push(rel);
        }
    }
    tree.rehash(&hasher);
    tree
}

/// decode(encode(T)) is T, ids and names included
#[test]
fn test_codec_round_trip_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&steps(), |steps| {
            let tree = grow(&steps);
            let decoded = codec::decode(&codec::encode(&tree)).unwrap();
            prop_assert_eq!(decoded, tree);
            Ok(())
        })
        .unwrap();
}

/// A tree diffed against itself is empty
#[test]
fn test_self_diff_is_empty_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&steps(), |steps| {
            let tree = grow(&steps);
            let log = diff(&tree, &tree.clone()).unwrap();
            prop_assert!(log.is_empty());
            Ok(())
        })
        .unwrap();
}

/// Changing one leaf changes every ancestor hash and nothing off its path
#[test]
fn test_hash_propagation_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(steps(), any::<usize>()), |(steps, pick)| {
            let mut tree = grow(&steps);
            let leaves: Vec<String> = tree
                .paths()
                .into_iter()
                .filter(|p| !p.is_empty() && !tree.node_at(p).unwrap().is_dir)
                .collect();
            prop_assume!(!leaves.is_empty());
            let target = leaves[pick % leaves.len()].clone();

            let before: Vec<(String, [u8; 32])> = tree
                .paths()
                .into_iter()
                .map(|p| {
                    let hash = tree.node_at(&p).unwrap().hash;
                    (p, hash)
                })
                .collect();

            let hasher = Blake3Hasher;
            tree.update_hash(&target, hasher.hash_leaf(b"\xffchanged\xff", "x")).unwrap();
            tree.rehash(&hasher);

            for (p, old) in before {
                let on_path = p.is_empty() || p == target || target.starts_with(&format!("{}/", p));
                let now = tree.node_at(&p).unwrap().hash;
                if on_path {
                    prop_assert_ne!(now, old, "{} should change", p);
                } else {
                    prop_assert_eq!(now, old, "{} should not change", p);
                }
            }
            Ok(())
        })
        .unwrap();
}
