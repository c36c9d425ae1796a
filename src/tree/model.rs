//! In-memory Merkle model of one directory
//!
//! Nodes live in an arena keyed by id. A path index maps every non-root node's
//! root-relative path to its id and is kept exact across mutations. Mutations
//! never recompute ancestor hashes; call [`Tree::rehash`] after a batch.

use crate::error::TreeError;
use crate::tree::hasher::NodeHasher;
use crate::tree::node::Node;
use crate::tree::path;
use crate::types::{Hash, NodeId, ROOT_ID};
use std::collections::HashMap;

/// Complete Merkle tree structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
    index: HashMap<String, NodeId>,
    next_id: NodeId,
}

impl Tree {
    /// Create a tree holding only a root directory
    pub fn new(root_name: impl Into<String>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ID, Node::directory(ROOT_ID, root_name));
        Self {
            nodes,
            index: HashMap::new(),
            next_id: ROOT_ID + 1,
        }
    }

    pub fn root(&self) -> &Node {
        // The root is inserted on construction and never removed
        &self.nodes[&ROOT_ID]
    }

    pub fn root_hash(&self) -> Hash {
        self.root().hash
    }

    pub fn root_name(&self) -> &str {
        &self.root().name
    }

    pub fn set_root_name(&mut self, name: impl Into<String>) {
        if let Some(root) = self.nodes.get_mut(&ROOT_ID) {
            root.name = name.into();
        }
    }

    pub fn next_id(&self) -> NodeId {
        self.next_id
    }

    pub(crate) fn set_next_id(&mut self, next_id: NodeId) {
        self.next_id = next_id;
    }

    /// Number of nodes including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the tree holds nothing but its root
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Look up a node id by root-relative path; the empty path is the root
    pub fn id_of(&self, rel: &str) -> Option<NodeId> {
        let key = path::normalize(rel);
        if key.is_empty() {
            return Some(ROOT_ID);
        }
        self.index.get(&key).copied()
    }

    pub fn node_at(&self, rel: &str) -> Option<&Node> {
        self.id_of(rel).and_then(|id| self.nodes.get(&id))
    }

    /// Children of a node in ascending id order
    pub fn children(&self, id: NodeId) -> Vec<&Node> {
        self.nodes
            .get(&id)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|child| self.nodes.get(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Root-relative path of a node, rebuilt from parent links
    pub fn path_of(&self, id: NodeId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = self.nodes.get(&id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.nodes.get(&parent)?;
        }
        names.reverse();
        Some(names.join("/"))
    }

    /// All indexed paths, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.index.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Resolve a path to the chain of ids from the root's child down to the target
    ///
    /// Fails on the first segment that does not resolve.
    pub fn resolve(&self, rel: &str) -> Result<Vec<NodeId>, TreeError> {
        let mut chain = Vec::new();
        let mut prefix = String::new();
        let mut parent = ROOT_ID;
        for segment in path::segments(rel) {
            prefix = path::join(&prefix, segment);
            let id = self
                .index
                .get(&prefix)
                .copied()
                .ok_or_else(|| TreeError::PathNotFound(prefix.clone()))?;
            let linked = self
                .nodes
                .get(&parent)
                .map(|p| p.children.contains(&id))
                .unwrap_or(false);
            if !linked {
                return Err(TreeError::PathNotFound(prefix));
            }
            chain.push(id);
            parent = id;
        }
        Ok(chain)
    }

    fn resolve_target(&self, rel: &str) -> Result<NodeId, TreeError> {
        self.resolve(rel)?
            .last()
            .copied()
            .ok_or_else(|| TreeError::PathNotFound(String::new()))
    }

    /// Add a node at `rel`; its parent must already exist and be a directory
    pub fn add_child(&mut self, rel: &str, hash: Hash, is_dir: bool) -> Result<NodeId, TreeError> {
        let (parent_path, name) = path::split_parent(rel);
        if name.is_empty() {
            return Err(TreeError::Malformed("cannot add a node at the root path".to_string()));
        }
        let parent = match self.resolve(&parent_path)?.last() {
            Some(id) => *id,
            None => ROOT_ID,
        };
        let id = self.next_id;
        self.attach(parent, Node::new(id, name, hash, is_dir))?;
        Ok(id)
    }

    /// Link a node with a caller-chosen id under `parent`
    ///
    /// Keeps the id counter above every attached id.
    pub(crate) fn attach(&mut self, parent: NodeId, mut node: Node) -> Result<(), TreeError> {
        if self.nodes.contains_key(&node.id) {
            return Err(TreeError::Malformed(format!("duplicate node id {}", node.id)));
        }
        let parent_node = self
            .nodes
            .get(&parent)
            .ok_or(TreeError::NodeNotFound(parent))?;
        if !parent_node.is_dir {
            return Err(TreeError::PathNotFound(format!(
                "{} is not a directory",
                self.path_of(parent).unwrap_or_default()
            )));
        }
        let parent_path = self.path_of(parent).unwrap_or_default();
        let key = path::join(&parent_path, &node.name);
        if self.index.contains_key(&key) {
            return Err(TreeError::PathExists(key));
        }

        let id = node.id;
        node.parent = Some(parent);
        self.index.insert(key, id);
        self.nodes.insert(id, node);
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.insert(id);
        }
        if id >= self.next_id {
            self.next_id = id + 1;
        }
        Ok(())
    }

    /// Remove the node at `rel` together with its whole subtree
    pub fn delete_child(&mut self, rel: &str) -> Result<(), TreeError> {
        let id = self.resolve_target(rel)?;
        let prefix = self.path_of(id).unwrap_or_default();
        let parent = self.nodes.get(&id).and_then(|node| node.parent);

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children.iter().copied());
            }
        }
        let nested = format!("{}/", prefix);
        self.index
            .retain(|key, _| key != &prefix && !key.starts_with(&nested));

        if let Some(parent_node) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent_node.children.remove(&id);
        }
        Ok(())
    }

    /// Rename the node at `rel`, re-keying its subtree in the index
    pub fn rename_child(&mut self, rel: &str, new_name: &str) -> Result<(), TreeError> {
        let id = self.resolve_target(rel)?;
        let old_path = self.path_of(id).unwrap_or_default();
        let (parent_path, old_name) = path::split_parent(&old_path);
        if old_name == new_name {
            return Ok(());
        }
        if new_name.is_empty() || new_name.contains('/') {
            return Err(TreeError::Malformed(format!("invalid node name {:?}", new_name)));
        }
        let new_path = path::join(&parent_path, new_name);
        if self.index.contains_key(&new_path) {
            return Err(TreeError::PathExists(new_path));
        }

        let nested = format!("{}/", old_path);
        let moved: Vec<(String, NodeId)> = self
            .index
            .iter()
            .filter(|(key, _)| *key == &old_path || key.starts_with(&nested))
            .map(|(key, id)| (key.clone(), *id))
            .collect();
        for (key, moved_id) in moved {
            self.index.remove(&key);
            let suffix = &key[old_path.len()..];
            self.index.insert(format!("{}{}", new_path, suffix), moved_id);
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.name = new_name.to_string();
        }
        Ok(())
    }

    /// Replace the stored hash of the node at `rel`
    pub fn update_hash(&mut self, rel: &str, hash: Hash) -> Result<(), TreeError> {
        let id = self.resolve_target(rel)?;
        let node = self.nodes.get_mut(&id).ok_or(TreeError::NodeNotFound(id))?;
        node.hash = hash;
        Ok(())
    }

    /// Recompute every directory hash bottom-up; leaf hashes are taken as is
    ///
    /// The root is hashed without its name.
    pub fn rehash(&mut self, hasher: &dyn NodeHasher) -> Hash {
        self.rehash_node(ROOT_ID, hasher)
    }

    fn rehash_node(&mut self, id: NodeId, hasher: &dyn NodeHasher) -> Hash {
        let (is_dir, children, name, hash) = match self.nodes.get(&id) {
            Some(node) => (
                node.is_dir,
                node.children.iter().copied().collect::<Vec<_>>(),
                if id == ROOT_ID { String::new() } else { node.name.clone() },
                node.hash,
            ),
            None => return crate::types::EMPTY_HASH,
        };
        if !is_dir {
            return hash;
        }
        let child_hashes: Vec<Hash> = children
            .into_iter()
            .map(|child| self.rehash_node(child, hasher))
            .collect();
        let digest = hasher.hash_directory(&child_hashes, &name);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.hash = digest;
        }
        digest
    }

    /// Shift every non-root id up by `offset`, keeping structure and hashes
    ///
    /// Used to place a freshly walked tree in an id range disjoint from another.
    pub fn rebase_ids(&mut self, offset: NodeId) {
        if offset == 0 {
            return;
        }
        let shift = |id: NodeId| if id == ROOT_ID { id } else { id + offset };
        self.nodes = self
            .nodes
            .drain()
            .map(|(id, mut node)| {
                node.id = shift(id);
                node.parent = node.parent.map(shift);
                node.children = node.children.iter().map(|c| shift(*c)).collect();
                (node.id, node)
            })
            .collect();
        for id in self.index.values_mut() {
            *id = shift(*id);
        }
        self.next_id += offset;
    }

    /// Preorder traversal: ids with their depth, children visited in ascending id order
    pub fn preorder(&self) -> Vec<(NodeId, usize)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(ROOT_ID, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            out.push((id, depth));
            if let Some(node) = self.nodes.get(&id) {
                for child in node.children.iter().rev() {
                    stack.push((*child, depth + 1));
                }
            }
        }
        out
    }
}
