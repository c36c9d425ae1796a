//! Tree builder for constructing filesystem Merkle trees

use crate::error::TreeError;
use crate::tree::hasher::NodeHasher;
use crate::tree::model::Tree;
use crate::tree::node::Node;
use crate::tree::path;
use crate::tree::walker::{Entry, Walker, WalkerConfig};
use crate::types::{EMPTY_HASH, ROOT_ID};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, instrument, trace};

/// Tree builder for constructing filesystem Merkle trees
pub struct TreeBuilder<'h> {
    root: PathBuf,
    hasher: &'h dyn NodeHasher,
    walker_config: Option<WalkerConfig>,
}

impl<'h> TreeBuilder<'h> {
    /// Create a new tree builder for the given root path
    pub fn new(root: PathBuf, hasher: &'h dyn NodeHasher) -> Self {
        Self {
            root,
            hasher,
            walker_config: None,
        }
    }

    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = Some(config);
        self
    }

    /// Build the complete Merkle tree from the filesystem
    ///
    /// Ids are assigned in walk order starting at 1, leaves are hashed from
    /// disk, then one bottom-up pass computes every directory hash.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn build(&self) -> Result<Tree, TreeError> {
        let start = Instant::now();
        info!("Starting tree build");

        let metadata = std::fs::metadata(&self.root).map_err(|e| {
            error!("Root is not accessible: {}", e);
            TreeError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to stat root {:?}: {}", self.root, e),
            ))
        })?;
        if !metadata.is_dir() {
            return Err(TreeError::Malformed(format!(
                "root {:?} is not a directory",
                self.root
            )));
        }

        let walker = match &self.walker_config {
            Some(config) => Walker::with_config(self.root.clone(), config.clone()),
            None => Walker::new(self.root.clone()),
        };
        let entries = walker.walk()?;
        debug!(entry_count = entries.len(), "Walked filesystem");

        let root_name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut tree = Tree::new(root_name);

        for (offset, entry) in entries.iter().enumerate() {
            let id = ROOT_ID + 1 + offset as u64;
            let (parent_path, name) = path::split_parent(entry.relative());
            let parent = tree
                .id_of(&parent_path)
                .ok_or_else(|| TreeError::PathNotFound(parent_path.clone()))?;

            let node = match entry {
                Entry::File { path, .. } => {
                    trace!(path = %path.display(), "Hashing file");
                    Node::new(id, name, self.hasher.hash_file(path)?, false)
                }
                Entry::Directory { .. } => Node::new(id, name, EMPTY_HASH, true),
            };
            tree.attach(parent, node)?;
        }

        let root_hash = tree.rehash(self.hasher);

        info!(
            node_count = tree.len(),
            root_hash = %hex::encode(root_hash),
            duration_ms = start.elapsed().as_millis(),
            "Tree build completed"
        );
        Ok(tree)
    }
}
