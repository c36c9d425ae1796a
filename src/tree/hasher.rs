//! Hash computation for tree nodes
//!
//! Leaf digest = H(content || base_name)
//! Directory digest = H(child_hash_1 || ... || child_hash_n || dir_name), children in ascending id order
//! The root directory is digested with an empty name.
//!
//! Both strategies produce 32-byte digests so every tree shares one node layout.

use crate::error::TreeError;
use crate::types::Hash;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Hashing strategy used by a change map
pub trait NodeHasher: Send + Sync {
    /// Digest of a file's content followed by its base name
    fn hash_leaf(&self, content: &[u8], name: &str) -> Hash;

    /// Digest of a directory's child digests (already id-ordered) followed by its name
    fn hash_directory(&self, child_hashes: &[Hash], name: &str) -> Hash;

    /// Read a file from disk and compute its leaf digest
    fn hash_file(&self, file_path: &Path) -> Result<Hash, TreeError> {
        let content = std::fs::read(file_path).map_err(|e| {
            TreeError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to read file {:?}: {}", file_path, e),
            ))
        })?;
        let name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(self.hash_leaf(&content, &name))
    }
}

/// BLAKE3 node hashing
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl NodeHasher for Blake3Hasher {
    fn hash_leaf(&self, content: &[u8], name: &str) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(content);
        hasher.update(name.as_bytes());
        *hasher.finalize().as_bytes()
    }

    fn hash_directory(&self, child_hashes: &[Hash], name: &str) -> Hash {
        let mut hasher = blake3::Hasher::new();
        for child in child_hashes {
            hasher.update(child);
        }
        hasher.update(name.as_bytes());
        *hasher.finalize().as_bytes()
    }
}

/// SHA-256 node hashing
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl NodeHasher for Sha256Hasher {
    fn hash_leaf(&self, content: &[u8], name: &str) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hasher.update(name.as_bytes());
        hasher.finalize().into()
    }

    fn hash_directory(&self, child_hashes: &[Hash], name: &str) -> Hash {
        let mut hasher = Sha256::new();
        for child in child_hashes {
            hasher.update(child);
        }
        hasher.update(name.as_bytes());
        hasher.finalize().into()
    }
}
