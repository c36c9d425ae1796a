//! Reflectors: converge a reflection directory onto its original
//!
//! A reflector owns the original and reflection change maps of one backup
//! pair. The filesystem is mutated first; the maps are synced only when every
//! operation succeeded, so a failed cycle is retried in full next time.

use crate::changemap::{ChangeLog, ChangeMap, Creation, Update};
use crate::error::ApiError;
use crate::fsops;
use crate::tree::path;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Strategy that mirrors an original tree onto a reflection
pub trait Reflector: Send {
    /// Registry code of this strategy
    fn code(&self) -> &'static str;

    /// Make the reflection match the original, then sync the reflection map
    fn backup(&mut self) -> Result<(), ApiError>;

    /// Restore the original from the reflection, then sync the original map
    fn recover(&mut self) -> Result<(), ApiError>;

    fn original(&self) -> &dyn ChangeMap;

    fn original_mut(&mut self) -> &mut dyn ChangeMap;

    fn reflection(&self) -> &dyn ChangeMap;

    /// Hand both maps back for persistence
    fn into_maps(self: Box<Self>) -> (Box<dyn ChangeMap>, Box<dyn ChangeMap>);
}

/// Incremental reflector driven by the change log
pub struct DiffReflector {
    original: Box<dyn ChangeMap>,
    reflection: Box<dyn ChangeMap>,
}

impl DiffReflector {
    pub const CODE: &'static str = "diff";

    pub fn new(original: Box<dyn ChangeMap>, reflection: Box<dyn ChangeMap>) -> Self {
        Self {
            original,
            reflection,
        }
    }
}

impl Reflector for DiffReflector {
    fn code(&self) -> &'static str {
        Self::CODE
    }

    #[instrument(skip(self), fields(original = %self.original.root_path().display(), reflection = %self.reflection.root_path().display()))]
    fn backup(&mut self) -> Result<(), ApiError> {
        let start = Instant::now();
        let log = self.reflection.change_log(self.original.as_ref())?;
        if log.is_empty() {
            debug!("Reflection already matches original");
            return Ok(());
        }
        let source = self.original.root_path();
        let target = self.reflection.root_path();
        std::fs::create_dir_all(&target)
            .map_err(|e| ApiError::io(format!("create {}", target.display()), e))?;

        apply_change_log(&log, &source, &target)?;
        self.reflection.sync(self.original.as_ref())?;

        info!(
            creations = log.creations.len(),
            deletions = log.deletions.len(),
            updates = log.updates.len(),
            duration_ms = start.elapsed().as_millis(),
            "Backup completed"
        );
        Ok(())
    }

    fn recover(&mut self) -> Result<(), ApiError> {
        recover_whole(self.original.as_mut(), self.reflection.as_ref())
    }

    fn original(&self) -> &dyn ChangeMap {
        self.original.as_ref()
    }

    fn original_mut(&mut self) -> &mut dyn ChangeMap {
        self.original.as_mut()
    }

    fn reflection(&self) -> &dyn ChangeMap {
        self.reflection.as_ref()
    }

    fn into_maps(self: Box<Self>) -> (Box<dyn ChangeMap>, Box<dyn ChangeMap>) {
        (self.original, self.reflection)
    }
}

/// Whole-tree reflector: wipe the reflection and copy everything
pub struct PlainReflector {
    original: Box<dyn ChangeMap>,
    reflection: Box<dyn ChangeMap>,
}

impl PlainReflector {
    pub const CODE: &'static str = "plain";

    pub fn new(original: Box<dyn ChangeMap>, reflection: Box<dyn ChangeMap>) -> Self {
        Self {
            original,
            reflection,
        }
    }
}

impl Reflector for PlainReflector {
    fn code(&self) -> &'static str {
        Self::CODE
    }

    #[instrument(skip(self), fields(original = %self.original.root_path().display()))]
    fn backup(&mut self) -> Result<(), ApiError> {
        let source = self.original.root_path();
        let target = self.reflection.root_path();
        fsops::clear_dir(&target)?;
        fsops::copy_dir_recursive(&source, &target)?;
        self.reflection.sync(self.original.as_ref())?;
        info!(reflection = %target.display(), "Full copy completed");
        Ok(())
    }

    fn recover(&mut self) -> Result<(), ApiError> {
        recover_whole(self.original.as_mut(), self.reflection.as_ref())
    }

    fn original(&self) -> &dyn ChangeMap {
        self.original.as_ref()
    }

    fn original_mut(&mut self) -> &mut dyn ChangeMap {
        self.original.as_mut()
    }

    fn reflection(&self) -> &dyn ChangeMap {
        self.reflection.as_ref()
    }

    fn into_maps(self: Box<Self>) -> (Box<dyn ChangeMap>, Box<dyn ChangeMap>) {
        (self.original, self.reflection)
    }
}

#[instrument(skip_all, fields(original = %original.root_path().display()))]
fn recover_whole(original: &mut dyn ChangeMap, reflection: &dyn ChangeMap) -> Result<(), ApiError> {
    let source = reflection.root_path();
    let target = original.root_path();
    if fsops::stat(&source)?.is_none() {
        return Err(ApiError::NotFound(format!(
            "reflection {} is not available",
            source.display()
        )));
    }
    fsops::clear_dir(&target)?;
    fsops::copy_dir_recursive(&source, &target)?;
    original.sync(reflection)?;
    info!(reflection = %source.display(), "Recovery completed");
    Ok(())
}

/// Apply a change log computed as `reflection -> original` onto disk
///
/// Deletions, then creations, then updates grouped by parent directory,
/// deepest first. Renames within one directory go through temporary names so
/// swapped names cannot clobber each other. A creation whose target is still
/// occupied by an entry awaiting a rename is staged and moved into place after
/// the updates.
pub fn apply_change_log(log: &ChangeLog, source: &Path, target: &Path) -> Result<(), ApiError> {
    for rel in &log.deletions {
        debug!(path = %rel, "Deleting");
        fsops::remove_all(&path::to_fs_path(target, rel))?;
    }

    let mut staged: Vec<(String, &Creation)> = Vec::new();
    let mut stage_counter = 0;
    for creation in &log.creations {
        let from = path::to_fs_path(source, &creation.origin);
        let to = path::to_fs_path(target, &creation.path);
        if fsops::stat(&to)?.is_some() {
            let (parent, _) = path::split_parent(&creation.path);
            let stage = free_name(target, &parent, ".reflect-stage", &mut stage_counter)?;
            fsops::copy_any(&from, &path::to_fs_path(target, &path::join(&parent, &stage)))?;
            staged.push((stage, creation));
        } else {
            debug!(path = %creation.path, "Creating");
            fsops::copy_any(&from, &to)?;
        }
    }

    apply_updates(&log.updates, source, target)?;

    for (stage, creation) in staged {
        let (parent, _) = path::split_parent(&creation.origin);
        fsops::rename(
            &path::to_fs_path(target, &path::join(&parent, &stage)),
            &path::to_fs_path(target, &creation.origin),
        )?;
    }
    Ok(())
}

/// First `{prefix}-{n}` name not present in `parent`, starting at `*counter`
fn free_name(
    target: &Path,
    parent: &str,
    prefix: &str,
    counter: &mut usize,
) -> Result<String, ApiError> {
    loop {
        let name = format!("{}-{}", prefix, counter);
        *counter += 1;
        if fsops::stat(&path::to_fs_path(target, &path::join(parent, &name)))?.is_none() {
            return Ok(name);
        }
    }
}

fn apply_updates(updates: &[Update], source: &Path, target: &Path) -> Result<(), ApiError> {
    let mut groups: BTreeMap<(Reverse<usize>, String), Vec<&Update>> = BTreeMap::new();
    for update in updates {
        let (parent, _) = path::split_parent(&update.path);
        let depth = path::segments(&parent).len();
        groups.entry((Reverse(depth), parent)).or_default().push(update);
    }

    for ((_, parent), group) in groups {
        let mut parked = Vec::new();
        let mut counter = 0;
        for update in group.iter().filter(|u| u.is_rename()) {
            let temp = path::join(
                &parent,
                &free_name(target, &parent, ".reflect-rename", &mut counter)?,
            );
            fsops::rename(
                &path::to_fs_path(target, &update.path),
                &path::to_fs_path(target, &temp),
            )?;
            parked.push((temp, update));
        }
        for (temp, update) in parked {
            debug!(update = %update, "Renaming");
            fsops::rename(
                &path::to_fs_path(target, &temp),
                &path::to_fs_path(target, &update.renamed_path()),
            )?;
        }
        for update in group.iter().filter(|u| !u.is_dir) {
            fsops::copy_file(
                &path::to_fs_path(source, &update.origin),
                &path::to_fs_path(target, &update.renamed_path()),
            )?;
        }
    }
    Ok(())
}
