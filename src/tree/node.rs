//! Filesystem node representation

use crate::types::{Hash, NodeId, EMPTY_HASH};
use std::collections::BTreeSet;

/// One file or directory in the modeled tree.
///
/// Nodes live in the tree's arena and refer to each other by id. `children`
/// is ordered by id, which is the order directory hashes consume child hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub hash: Hash,
    pub is_dir: bool,
    pub parent: Option<NodeId>,
    pub children: BTreeSet<NodeId>,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>, hash: Hash, is_dir: bool) -> Self {
        Self {
            id,
            name: name.into(),
            hash,
            is_dir,
            parent: None,
            children: BTreeSet::new(),
        }
    }

    pub fn directory(id: NodeId, name: impl Into<String>) -> Self {
        Self::new(id, name, EMPTY_HASH, true)
    }
}
