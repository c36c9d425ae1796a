//! Change map backed by a content-hash tree

use crate::changemap::{split_serialized, ChangeMap, UpdateBatch};
use crate::error::ApiError;
use crate::tree::{codec, path, Blake3Hasher, NodeHasher, Sha256Hasher, Tree, TreeBuilder};
use crate::types::EMPTY_HASH;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Hashing strategy selectable by registry code
pub trait MapStrategy: NodeHasher + Default + Send + 'static {
    const CODE: &'static str;
}

impl MapStrategy for Blake3Hasher {
    const CODE: &'static str = "blake3";
}

impl MapStrategy for Sha256Hasher {
    const CODE: &'static str = "sha256";
}

pub type Blake3ChangeMap = HashedChangeMap<Blake3Hasher>;
pub type Sha256ChangeMap = HashedChangeMap<Sha256Hasher>;

#[derive(Debug, Clone)]
pub struct HashedChangeMap<H: MapStrategy> {
    hasher: H,
    anchor: PathBuf,
    tree: Tree,
}

impl<H: MapStrategy> HashedChangeMap<H> {
    /// Walk `root` and model it
    #[instrument(skip_all, fields(root = %root.display(), strategy = H::CODE))]
    pub fn create(root: &Path) -> Result<Self, ApiError> {
        let root = path::normalize_root(root);
        let anchor = root.parent().map(Path::to_path_buf).unwrap_or_default();
        let hasher = H::default();
        let tree = TreeBuilder::new(root.clone(), &hasher).build()?;
        Ok(Self {
            hasher,
            anchor,
            tree,
        })
    }

    /// Rebuild a map from its serialized form, optionally relocating it
    pub fn load(bytes: &[u8], anchor: Option<&Path>) -> Result<Self, ApiError> {
        let (next_id, stored_anchor, body) = split_serialized(bytes)?;
        let mut tree = codec::decode(body)?;
        if next_id > tree.next_id() {
            tree.set_next_id(next_id);
        }
        Ok(Self {
            hasher: H::default(),
            anchor: anchor.map(Path::to_path_buf).unwrap_or(stored_anchor),
            tree,
        })
    }

    pub fn from_tree(anchor: PathBuf, tree: Tree) -> Self {
        Self {
            hasher: H::default(),
            anchor,
            tree,
        }
    }

    fn disk_path(&self, rel: &str) -> PathBuf {
        path::to_fs_path(&self.root_path(), rel)
    }
}

impl<H: MapStrategy> ChangeMap for HashedChangeMap<H> {
    fn code(&self) -> &'static str {
        H::CODE
    }

    fn hasher(&self) -> &dyn NodeHasher {
        &self.hasher
    }

    fn tree(&self) -> &Tree {
        &self.tree
    }

    fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    fn root_dir(&self) -> &Path {
        &self.anchor
    }

    fn set_root_dir(&mut self, anchor: PathBuf) {
        self.anchor = anchor;
    }

    /// Deletions, directory creations, file creations, file renames,
    /// directory renames, then one rehash.
    #[instrument(skip_all, fields(root = %self.root_path().display()))]
    fn update(&mut self, files: &UpdateBatch, dirs: &UpdateBatch) -> Result<(), ApiError> {
        for rel in files.deletions.iter().chain(dirs.deletions.iter()) {
            self.tree.delete_child(rel)?;
        }

        for rel in &dirs.creations {
            self.tree.add_child(rel, EMPTY_HASH, true)?;
        }

        for rel in &files.creations {
            let hash = self.hasher.hash_file(&self.disk_path(rel))?;
            self.tree.add_child(rel, hash, false)?;
        }

        for (rel, new_name) in &files.renames {
            self.tree.rename_child(rel, new_name)?;
            let (parent, _) = path::split_parent(rel);
            let renamed = path::join(&parent, new_name);
            let hash = self.hasher.hash_file(&self.disk_path(&renamed))?;
            self.tree.update_hash(&renamed, hash)?;
        }

        for (rel, new_name) in &dirs.renames {
            self.tree.rename_child(rel, new_name)?;
        }

        let root_hash = self.tree.rehash(&self.hasher);
        debug!(root_hash = %hex::encode(root_hash), node_count = self.tree.len(), "Applied update batch");
        Ok(())
    }

    fn sync(&mut self, other: &dyn ChangeMap) -> Result<(), ApiError> {
        self.ensure_compatible(other)?;
        let root_name = self.tree.root_name().to_string();
        let mut tree = other.tree().clone();
        tree.set_root_name(root_name);
        tree.rehash(&self.hasher);
        self.tree = tree;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    fn source() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("src");
        fs::create_dir_all(root.join("dir")).unwrap();
        fs::write(root.join("dir").join("a.txt"), "alpha").unwrap();
        fs::write(root.join("b.txt"), "beta").unwrap();
        (temp_dir, root)
    }

    #[test]
    fn test_create_sets_anchor_and_name() {
        let (_guard, root) = source();
        let map = Blake3ChangeMap::create(&root).unwrap();

        assert_eq!(map.root_name(), "src");
        assert_eq!(map.root_path(), path::normalize_root(&root));
        assert_eq!(map.code(), "blake3");
    }

    #[test]
    fn test_serialize_round_trip() {
        let (_guard, root) = source();
        let mut map = Sha256ChangeMap::create(&root).unwrap();
        fs::remove_file(root.join("b.txt")).unwrap();
        map.update(&UpdateBatch::default().delete("b.txt"), &UpdateBatch::default())
            .unwrap();

        let loaded = Sha256ChangeMap::load(&map.serialize(), None).unwrap();
        assert_eq!(loaded.tree(), map.tree());
        assert_eq!(loaded.root_dir(), map.root_dir());
        assert_eq!(loaded.tree().next_id(), map.tree().next_id());
    }

    #[test]
    fn test_load_with_anchor_override() {
        let (_guard, root) = source();
        let map = Blake3ChangeMap::create(&root).unwrap();
        let loaded = Blake3ChangeMap::load(&map.serialize(), Some(Path::new("/mnt/disk"))).unwrap();
        assert_eq!(loaded.root_path(), PathBuf::from("/mnt/disk/src"));
    }

    #[test]
    fn test_load_rejects_missing_delimiter() {
        let err = Blake3ChangeMap::load(b"3:/tmp", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_update_matches_fresh_walk() {
        let (_guard, root) = source();
        let mut map = Blake3ChangeMap::create(&root).unwrap();

        fs::create_dir(root.join("new_dir")).unwrap();
        fs::write(root.join("new_dir").join("c.txt"), "gamma").unwrap();
        fs::rename(root.join("b.txt"), root.join("renamed.txt")).unwrap();
        fs::write(root.join("dir").join("a.txt"), "alpha v2").unwrap();

        let files = UpdateBatch::default()
            .create("new_dir/c.txt")
            .rename("b.txt", "renamed.txt")
            .rename("dir/a.txt", "a.txt");
        let dirs = UpdateBatch::default().create("new_dir");
        map.update(&files, &dirs).unwrap();

        let fresh = Blake3ChangeMap::create(&root).unwrap();
        assert_eq!(map.tree().paths(), fresh.tree().paths());
        for rel in fresh.tree().paths() {
            assert_eq!(
                map.tree().node_at(&rel).unwrap().hash,
                fresh.tree().node_at(&rel).unwrap().hash,
                "hash mismatch at {}",
                rel
            );
        }
    }

    #[test]
    fn test_directory_creation_is_incremental() {
        let (_guard, root) = source();
        let mut map = Blake3ChangeMap::create(&root).unwrap();
        fs::create_dir_all(root.join("nested").join("inner")).unwrap();

        map.update(&UpdateBatch::default(), &UpdateBatch::default().create("nested"))
            .unwrap();

        assert!(map.tree().node_at("nested").is_some());
        assert!(map.tree().node_at("nested/inner").is_none());
    }

    #[test]
    fn test_update_unknown_path_fails() {
        let (_guard, root) = source();
        let mut map = Blake3ChangeMap::create(&root).unwrap();
        let err = map
            .update(&UpdateBatch::default().delete("missing.txt"), &UpdateBatch::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_sync_keeps_receiver_identity() {
        let (guard, root) = source();
        let original = Blake3ChangeMap::create(&root).unwrap();
        let mirror = guard.path().join("mirror");
        fs::create_dir(&mirror).unwrap();
        let mut reflection = Blake3ChangeMap::create(&mirror).unwrap();

        reflection.sync(&original).unwrap();

        assert_eq!(reflection.root_name(), "mirror");
        assert_eq!(reflection.tree().paths(), original.tree().paths());
        assert!(reflection.change_log(&original).unwrap().is_empty());
    }

    #[test]
    fn test_mixed_strategies_are_stale() {
        let (_guard, root) = source();
        let a = Blake3ChangeMap::create(&root).unwrap();
        let b = Sha256ChangeMap::create(&root).unwrap();
        assert_eq!(a.change_log(&b).unwrap_err().kind(), ErrorKind::StaleState);
    }
}
