//! Change log: the diff between two trees sharing an id space

use crate::error::ApiError;
use crate::tree::path;
use crate::tree::Tree;
use crate::types::{NodeId, ROOT_ID};
use std::fmt;

/// A node present only in the target tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creation {
    /// Where the node goes, in the receiver's naming
    pub path: String,
    /// Where the node lives in the target tree
    pub origin: String,
    pub is_dir: bool,
}

/// A node present in both trees whose hash differs and that is renamed or a leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    /// Current location in the receiver's naming
    pub path: String,
    /// Name the node carries in the target tree
    pub new_name: String,
    /// Location in the target tree
    pub origin: String,
    pub is_dir: bool,
}

impl Update {
    pub fn is_rename(&self) -> bool {
        let (_, name) = path::split_parent(&self.path);
        name != self.new_name
    }

    /// Location after the rename, in the receiver's naming
    pub fn renamed_path(&self) -> String {
        let (parent, _) = path::split_parent(&self.path);
        path::join(&parent, &self.new_name)
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.path, self.new_name)
    }
}

/// Ordered operations that turn the receiver into the target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeLog {
    pub creations: Vec<Creation>,
    pub deletions: Vec<String>,
    pub updates: Vec<Update>,
}

impl ChangeLog {
    pub fn is_empty(&self) -> bool {
        self.creations.is_empty() && self.deletions.is_empty() && self.updates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.creations.len() + self.deletions.len() + self.updates.len()
    }
}

/// Diff `receiver` against `target` level by level, matching nodes by id
pub fn diff(receiver: &Tree, target: &Tree) -> Result<ChangeLog, ApiError> {
    let mut log = ChangeLog::default();
    diff_level(receiver, target, ROOT_ID, "", "", &mut log)?;
    Ok(log)
}

fn diff_level(
    receiver: &Tree,
    target: &Tree,
    id: NodeId,
    receiver_prefix: &str,
    target_prefix: &str,
    log: &mut ChangeLog,
) -> Result<(), ApiError> {
    let (mine, theirs) = match (receiver.get(id), target.get(id)) {
        (Some(mine), Some(theirs)) => (mine, theirs),
        _ => return Err(ApiError::StaleState(format!("node {} missing during diff", id))),
    };

    for child_id in theirs.children.difference(&mine.children) {
        if let Some(child) = target.get(*child_id) {
            log.creations.push(Creation {
                path: path::join(receiver_prefix, &child.name),
                origin: path::join(target_prefix, &child.name),
                is_dir: child.is_dir,
            });
        }
    }

    for child_id in mine.children.difference(&theirs.children) {
        if let Some(child) = receiver.get(*child_id) {
            log.deletions.push(path::join(receiver_prefix, &child.name));
        }
    }

    for child_id in mine.children.intersection(&theirs.children) {
        let (a, b) = match (receiver.get(*child_id), target.get(*child_id)) {
            (Some(a), Some(b)) => (a, b),
            _ => continue,
        };
        if a.is_dir != b.is_dir {
            return Err(ApiError::StaleState(format!(
                "node {} is a {} in one tree and a {} in the other",
                child_id,
                kind(a.is_dir),
                kind(b.is_dir)
            )));
        }
        if a.hash == b.hash {
            continue;
        }
        let receiver_path = path::join(receiver_prefix, &a.name);
        let target_path = path::join(target_prefix, &b.name);
        if a.name != b.name || !a.is_dir {
            log.updates.push(Update {
                path: receiver_path.clone(),
                new_name: b.name.clone(),
                origin: target_path.clone(),
                is_dir: a.is_dir,
            });
        }
        if a.is_dir {
            diff_level(receiver, target, *child_id, &receiver_path, &target_path, log)?;
        }
    }
    Ok(())
}

fn kind(is_dir: bool) -> &'static str {
    if is_dir {
        "directory"
    } else {
        "file"
    }
}
