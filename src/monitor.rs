//! System Monitor
//!
//! Watches every registered original root and follows reflection drives as
//! they come and go. Each watch is one notify handle pushing into a shared
//! queue; a heartbeat thread pushes ticks into the same queue so watch
//! reconciliation and drive polling run even when the disk is quiet.

use crate::command::{Command, UpdateKind};
use crate::config::DaemonConfig;
use crate::drive::DriveResolver;
use crate::error::ApiError;
use crate::executor::ExecutorHandle;
use crate::fsops::{self, EntryKind};
use crate::store::MetadataStore;
use crate::tree::path;
use crate::tree::walker::{Entry, Walker};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Item on the monitor's fan-in queue
#[derive(Debug)]
pub enum MonitorEvent {
    Fs { root: String, event: Event },
    WatchError { root: String, error: notify::Error },
    Tick,
}

/// Destination for commands produced by the monitor
pub trait CommandSink: Send {
    fn submit(&self, line: String) -> Result<(), ApiError>;
}

impl CommandSink for ExecutorHandle {
    fn submit(&self, line: String) -> Result<(), ApiError> {
        self.notify_blocking(line)
    }
}

impl CommandSink for mpsc::Sender<String> {
    fn submit(&self, line: String) -> Result<(), ApiError> {
        self.send(line)
            .map_err(|_| ApiError::StaleState("command receiver dropped".to_string()))
    }
}

/// Registry of live watches keyed by original root
pub struct WatchSet {
    watches: BTreeMap<String, RecommendedWatcher>,
    tx: mpsc::Sender<MonitorEvent>,
}

impl WatchSet {
    pub fn new(tx: mpsc::Sender<MonitorEvent>) -> Self {
        Self {
            watches: BTreeMap::new(),
            tx,
        }
    }

    /// Start watching `root` recursively; a no-op if already watched
    pub fn watch(&mut self, root: &str) -> Result<(), ApiError> {
        if self.watches.contains_key(root) {
            return Ok(());
        }
        let tx = self.tx.clone();
        let key = root.to_string();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let item = match res {
                Ok(event) => MonitorEvent::Fs {
                    root: key.clone(),
                    event,
                },
                Err(error) => MonitorEvent::WatchError {
                    root: key.clone(),
                    error,
                },
            };
            // Receiver gone means the monitor has stopped
            let _ = tx.send(item);
        })
        .map_err(|e| watch_error(root, e))?;
        watcher
            .watch(Path::new(root), RecursiveMode::Recursive)
            .map_err(|e| watch_error(root, e))?;
        self.watches.insert(root.to_string(), watcher);
        info!(root = %root, "Watching original root");
        Ok(())
    }

    /// Drop the watch on `root`; returns whether one existed
    pub fn unwatch(&mut self, root: &str) -> bool {
        let removed = self.watches.remove(root).is_some();
        if removed {
            info!(root = %root, "Stopped watching original root");
        }
        removed
    }

    pub fn roots(&self) -> Vec<String> {
        self.watches.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Make the watched set equal to `keys`; roots that fail to watch are retried next time
    pub fn reconcile(&mut self, keys: &[String]) {
        let wanted: BTreeSet<&str> = keys.iter().map(String::as_str).collect();
        for root in self.roots() {
            if !wanted.contains(root.as_str()) {
                self.unwatch(&root);
            }
        }
        for root in wanted {
            if let Err(e) = self.watch(root) {
                warn!(root = %root, error = %e, "Failed to watch original root");
            }
        }
    }
}

fn watch_error(root: &str, e: notify::Error) -> ApiError {
    ApiError::io(
        format!("watch {}", root),
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
    )
}

/// Translate one notify event under `root` into update commands
pub fn translate(root: &Path, event: &Event) -> Vec<Command> {
    let rel = |p: &PathBuf| path::relative_to(root, p).filter(|r| !r.is_empty());
    let kind_of = |p: &PathBuf| fsops::stat(p).ok().flatten();
    let mut commands = Vec::new();

    match event.kind {
        EventKind::Create(_) => {
            for p in &event.paths {
                if let Some(r) = rel(p) {
                    created(root, &r, kind_of(p), &mut commands);
                }
            }
        }
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            for p in &event.paths {
                if let (Some(r), Some(EntryKind::File)) = (rel(p), kind_of(p)) {
                    commands.push(update(root, UpdateKind::Write, r, None, false));
                }
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            let (from, to) = (&event.paths[0], &event.paths[1]);
            match (rel(from), rel(to)) {
                (Some(old), Some(new)) => {
                    let (old_parent, _) = path::split_parent(&old);
                    let (new_parent, new_name) = path::split_parent(&new);
                    let kind = kind_of(to);
                    if old_parent == new_parent {
                        let is_dir = kind == Some(EntryKind::Directory);
                        commands.push(update(root, UpdateKind::Rename, old, Some(new_name), is_dir));
                    } else {
                        commands.push(update(root, UpdateKind::Delete, old, None, false));
                        created(root, &new, kind, &mut commands);
                    }
                }
                (Some(old), None) => commands.push(update(root, UpdateKind::Delete, old, None, false)),
                (None, Some(new)) => created(root, &new, kind_of(to), &mut commands),
                (None, None) => {}
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for p in &event.paths {
                if let Some(r) = rel(p) {
                    commands.push(update(root, UpdateKind::Delete, r, None, false));
                }
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            // Lone halves with no known direction: decide by what is on disk now
            for p in &event.paths {
                if let Some(r) = rel(p) {
                    match kind_of(p) {
                        Some(kind) => created(root, &r, Some(kind), &mut commands),
                        None => commands.push(update(root, UpdateKind::Delete, r, None, false)),
                    }
                }
            }
        }
        EventKind::Remove(_) => {
            for p in &event.paths {
                if let Some(r) = rel(p) {
                    commands.push(update(root, UpdateKind::Delete, r, None, false));
                }
            }
        }
        _ => {}
    }
    commands
}

fn update(root: &Path, kind: UpdateKind, rel: String, new_name: Option<String>, is_dir: bool) -> Command {
    Command::Update {
        kind,
        root: root.to_path_buf(),
        path: rel,
        new_name,
        is_dir,
    }
}

/// A directory that appears with contents (moved in, copied in) gets one create per entry
fn created(root: &Path, rel: &str, kind: Option<EntryKind>, commands: &mut Vec<Command>) {
    match kind {
        Some(EntryKind::File) => commands.push(update(root, UpdateKind::Create, rel.to_string(), None, false)),
        Some(EntryKind::Directory) => {
            commands.push(update(root, UpdateKind::Create, rel.to_string(), None, true));
            let walker = Walker::new(path::to_fs_path(root, rel));
            match walker.walk() {
                Ok(entries) => {
                    for entry in entries {
                        let child = path::join(rel, entry.relative());
                        let is_dir = matches!(entry, Entry::Directory { .. });
                        commands.push(update(root, UpdateKind::Create, child, None, is_dir));
                    }
                }
                Err(e) => warn!(path = %rel, error = %e, "Could not walk created directory"),
            }
        }
        Some(EntryKind::Other) | None => {}
    }
}

/// Long-running watch, reconcile and drive-poll loop
pub struct SystemMonitor<S: CommandSink> {
    store: Arc<dyn MetadataStore>,
    resolver: Arc<dyn DriveResolver>,
    sink: S,
    watches: WatchSet,
    rx: mpsc::Receiver<MonitorEvent>,
    tx: mpsc::Sender<MonitorEvent>,
    mounted: BTreeSet<String>,
    poll_interval: Duration,
    last_poll: Option<Instant>,
}

impl<S: CommandSink + 'static> SystemMonitor<S> {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        resolver: Arc<dyn DriveResolver>,
        sink: S,
        config: &DaemonConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            store,
            resolver,
            sink,
            watches: WatchSet::new(tx.clone()),
            rx,
            tx,
            mounted: BTreeSet::new(),
            poll_interval: config.poll_interval(),
            last_poll: None,
        }
    }

    /// Start the heartbeat and monitor threads
    pub fn spawn(self, heartbeat: Duration) -> Result<JoinHandle<()>, ApiError> {
        let ticks = self.tx.clone();
        std::thread::Builder::new()
            .name("reflect-heartbeat".to_string())
            .spawn(move || loop {
                std::thread::sleep(heartbeat);
                if ticks.send(MonitorEvent::Tick).is_err() {
                    break;
                }
            })
            .map_err(|e| ApiError::io("spawn heartbeat thread", e))?;
        std::thread::Builder::new()
            .name("reflect-monitor".to_string())
            .spawn(move || self.run())
            .map_err(|e| ApiError::io("spawn monitor thread", e))
    }

    /// Run until the command sink goes away
    pub fn run(mut self) {
        info!("System monitor started");
        loop {
            if let Err(e) = self.cycle() {
                error!(error = %e, "System monitor stopping");
                break;
            }
        }
    }

    /// One cycle: wait for an event or tick, reconcile watches, poll drives
    pub fn cycle(&mut self) -> Result<(), ApiError> {
        let first = self
            .rx
            .recv()
            .map_err(|_| ApiError::StaleState("monitor queue closed".to_string()))?;
        self.handle(first)?;
        // Drain whatever else is already queued before the housekeeping steps
        while let Ok(item) = self.rx.try_recv() {
            self.handle(item)?;
        }
        self.reconcile_watches();
        self.poll_drives_if_due()
    }

    fn handle(&mut self, item: MonitorEvent) -> Result<(), ApiError> {
        match item {
            MonitorEvent::Fs { root, event } => self.dispatch(&root, &event),
            MonitorEvent::WatchError { root, error } => {
                warn!(root = %root, error = %error, "Watch error");
                Ok(())
            }
            MonitorEvent::Tick => Ok(()),
        }
    }

    fn dispatch(&mut self, root: &str, event: &Event) -> Result<(), ApiError> {
        for command in translate(Path::new(root), event) {
            debug!(command = %command, "Forwarding filesystem change");
            self.sink.submit(command.to_string())?;
        }
        Ok(())
    }

    pub fn reconcile_watches(&mut self) {
        match self.store.keys() {
            Ok(keys) => self.watches.reconcile(&keys),
            Err(e) => warn!(error = %e, "Could not list registered roots"),
        }
    }

    pub fn watched_roots(&self) -> Vec<String> {
        self.watches.roots()
    }

    fn poll_drives_if_due(&mut self) -> Result<(), ApiError> {
        let due = self
            .last_poll
            .map_or(true, |last| last.elapsed() >= self.poll_interval);
        if due {
            self.last_poll = Some(Instant::now());
            self.poll_drives()?;
        }
        Ok(())
    }

    /// Follow drive mount transitions for every registered record
    pub fn poll_drives(&mut self) -> Result<(), ApiError> {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Could not list registered roots");
                return Ok(());
            }
        };
        self.mounted.retain(|key| keys.contains(key));

        for key in keys {
            let record = match self.store.get(&key) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(original = %key, error = %e, "Could not read record");
                    continue;
                }
            };
            if record.drive_label.is_empty() {
                continue;
            }

            match self.resolver.label_to_mount_point(&record.drive_label) {
                Some(mount) if !self.mounted.contains(&key) => {
                    let reflection_root = mount.join(&record.reflection_base);
                    let root = reflection_root.to_string_lossy().to_string();
                    if let Err(e) = self.store.update(&key, &mut |r| r.reflection_root = root.clone()) {
                        warn!(original = %key, error = %e, "Failed to record mount");
                        continue;
                    }
                    self.mounted.insert(key.clone());
                    info!(original = %key, reflection = %reflection_root.display(), "Reflection drive mounted");
                    let backup = Command::Backup {
                        original_root: PathBuf::from(&key),
                    };
                    self.sink.submit(backup.to_string())?;
                }
                Some(_) => {}
                None => {
                    let was_mounted = self.mounted.remove(&key);
                    if was_mounted || !record.reflection_root.is_empty() {
                        if let Err(e) = self.store.update(&key, &mut |r| r.reflection_root.clear()) {
                            warn!(original = %key, error = %e, "Failed to record unmount");
                            continue;
                        }
                        info!(original = %key, label = %record.drive_label, "Reflection drive unmounted");
                    }
                }
            }
        }
        Ok(())
    }
}
