//! Change maps: a hash tree anchored on disk
//!
//! A change map pairs a [`Tree`] with the anchor directory that contains the
//! modeled root. It applies batches of filesystem changes to its tree,
//! serializes losslessly, and diffs itself against another map that shares
//! its id space.

pub mod hashed;
pub mod log;

pub use hashed::{Blake3ChangeMap, HashedChangeMap, Sha256ChangeMap};
pub use log::{ChangeLog, Creation, Update};

use crate::error::ApiError;
use crate::tree::{NodeHasher, Tree};
use crate::types::Hash;
use std::path::{Path, PathBuf};

/// Delimiter between the serialized header and the token stream
pub const HEADER_DELIMITER: u8 = 0x02;

/// One kind of change (files or directories) reported against a root
///
/// Every path is relative to the modeled root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateBatch {
    pub deletions: Vec<String>,
    pub creations: Vec<String>,
    /// (current path, new name); a rename to the same name refreshes content
    pub renames: Vec<(String, String)>,
}

impl UpdateBatch {
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.creations.is_empty() && self.renames.is_empty()
    }

    pub fn delete(mut self, path: impl Into<String>) -> Self {
        self.deletions.push(path.into());
        self
    }

    pub fn create(mut self, path: impl Into<String>) -> Self {
        self.creations.push(path.into());
        self
    }

    pub fn rename(mut self, path: impl Into<String>, new_name: impl Into<String>) -> Self {
        self.renames.push((path.into(), new_name.into()));
        self
    }
}

/// A tree anchored on disk, with an interchangeable hashing strategy
pub trait ChangeMap: Send {
    /// Registry code of the strategy that produced this map
    fn code(&self) -> &'static str;

    fn hasher(&self) -> &dyn NodeHasher;

    fn tree(&self) -> &Tree;

    fn tree_mut(&mut self) -> &mut Tree;

    /// Directory that contains the modeled root
    fn root_dir(&self) -> &Path;

    fn set_root_dir(&mut self, anchor: PathBuf);

    /// Apply file and directory changes reported against the modeled root
    fn update(&mut self, files: &UpdateBatch, dirs: &UpdateBatch) -> Result<(), ApiError>;

    fn root_name(&self) -> &str {
        self.tree().root_name()
    }

    fn root_path(&self) -> PathBuf {
        self.root_dir().join(self.root_name())
    }

    fn root_hash(&self) -> Hash {
        self.tree().root_hash()
    }

    /// Header, delimiter, token stream
    fn serialize(&self) -> Vec<u8> {
        let mut out = format!(
            "{}:{}",
            self.tree().next_id(),
            self.root_dir().to_string_lossy()
        )
        .into_bytes();
        out.push(HEADER_DELIMITER);
        out.extend_from_slice(crate::tree::codec::encode(self.tree()).as_bytes());
        out
    }

    /// Replace this map's tree with a deep copy of `other`'s
    ///
    /// The receiver keeps its anchor and root name, which locate it on disk.
    fn sync(&mut self, other: &dyn ChangeMap) -> Result<(), ApiError>;

    /// Operations that turn this map into `other`
    fn change_log(&self, other: &dyn ChangeMap) -> Result<ChangeLog, ApiError> {
        self.ensure_compatible(other)?;
        log::diff(self.tree(), other.tree())
    }

    fn ensure_compatible(&self, other: &dyn ChangeMap) -> Result<(), ApiError> {
        if self.code() != other.code() {
            return Err(ApiError::StaleState(format!(
                "cannot compare a {} map with a {} map",
                self.code(),
                other.code()
            )));
        }
        Ok(())
    }
}

/// Split serialized bytes into (next id, anchor, token stream)
pub(crate) fn split_serialized(bytes: &[u8]) -> Result<(u64, PathBuf, &str), ApiError> {
    let delimiter = bytes
        .iter()
        .position(|b| *b == HEADER_DELIMITER)
        .ok_or_else(|| ApiError::MalformedInput("change map has no header delimiter".to_string()))?;
    let header = std::str::from_utf8(&bytes[..delimiter])
        .map_err(|e| ApiError::MalformedInput(format!("change map header is not UTF-8: {}", e)))?;
    let body = std::str::from_utf8(&bytes[delimiter + 1..])
        .map_err(|e| ApiError::MalformedInput(format!("change map body is not UTF-8: {}", e)))?;
    let (next_id, anchor) = header
        .split_once(':')
        .ok_or_else(|| ApiError::MalformedInput(format!("invalid change map header {:?}", header)))?;
    let next_id = next_id
        .parse()
        .map_err(|_| ApiError::MalformedInput(format!("invalid id counter {:?}", next_id)))?;
    Ok((next_id, PathBuf::from(anchor), body))
}
