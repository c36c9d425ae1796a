//! Command executor
//!
//! Every mutating operation runs here, one command at a time, on a single
//! dedicated thread. Two kinds of producer share one bounded queue: relay
//! connections submit requests and wait for a reply, the system monitor
//! submits notifications and moves on. The loop ends once every sender is
//! dropped.

use crate::changemap::{ChangeMap, UpdateBatch};
use crate::command::{Command, UpdateKind};
use crate::config::DefaultsConfig;
use crate::drive::DriveResolver;
use crate::error::ApiError;
use crate::registry::Registry;
use crate::store::{self, BackupRecord, MetadataStore};
use crate::tree::path;
use chrono::Utc;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, warn};

/// Coarse outcome reported back to a requester
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Success,
    Fail,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Success => write!(f, "success"),
            Reply::Fail => write!(f, "fail"),
        }
    }
}

/// Work item on the executor queue
#[derive(Debug)]
pub enum Submission {
    /// From the relay; the outcome is sent back through `reply`
    Request {
        line: String,
        reply: oneshot::Sender<Reply>,
    },
    /// From the system monitor; fire and forget
    Notify(String),
}

/// Cloneable producer side of the executor queue
#[derive(Debug, Clone)]
pub struct ExecutorHandle {
    tx: mpsc::Sender<Submission>,
}

impl ExecutorHandle {
    /// Bounded queue with its producer handle and consumer end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Submission>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Submit a request and wait for its outcome
    pub async fn request(&self, line: impl Into<String>) -> Reply {
        let (reply, outcome) = oneshot::channel();
        let submission = Submission::Request {
            line: line.into(),
            reply,
        };
        if self.tx.send(submission).await.is_err() {
            warn!("Executor is gone; failing request");
            return Reply::Fail;
        }
        outcome.await.unwrap_or(Reply::Fail)
    }

    /// Blocking variant of [`ExecutorHandle::request`] for non-async threads
    pub fn blocking_request(&self, line: impl Into<String>) -> Reply {
        let (reply, outcome) = oneshot::channel();
        let submission = Submission::Request {
            line: line.into(),
            reply,
        };
        if self.tx.blocking_send(submission).is_err() {
            return Reply::Fail;
        }
        outcome.blocking_recv().unwrap_or(Reply::Fail)
    }

    /// Queue a system command from a non-async thread
    pub fn notify_blocking(&self, line: impl Into<String>) -> Result<(), ApiError> {
        self.tx
            .blocking_send(Submission::Notify(line.into()))
            .map_err(|_| ApiError::StaleState("executor queue closed".to_string()))
    }
}

/// Single-consumer command state machine
pub struct Executor {
    store: Arc<dyn MetadataStore>,
    registry: Arc<Registry>,
    resolver: Arc<dyn DriveResolver>,
    defaults: DefaultsConfig,
}

impl Executor {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        registry: Arc<Registry>,
        resolver: Arc<dyn DriveResolver>,
        defaults: DefaultsConfig,
    ) -> Self {
        Self {
            store,
            registry,
            resolver,
            defaults,
        }
    }

    /// Start the consumer thread
    pub fn spawn(self, capacity: usize) -> Result<(ExecutorHandle, JoinHandle<()>), ApiError> {
        let (handle, rx) = ExecutorHandle::channel(capacity);
        let thread = std::thread::Builder::new()
            .name("reflect-executor".to_string())
            .spawn(move || self.run(rx))
            .map_err(|e| ApiError::io("spawn executor thread", e))?;
        Ok((handle, thread))
    }

    /// Drain the queue until every sender is dropped
    pub fn run(mut self, mut rx: mpsc::Receiver<Submission>) {
        info!("Executor started");
        while let Some(submission) = rx.blocking_recv() {
            match submission {
                Submission::Request { line, reply } => {
                    let outcome = self.handle_line(&line);
                    if reply.send(outcome).is_err() {
                        debug!(command = %line.trim_end(), "Requester went away before the reply");
                    }
                }
                Submission::Notify(line) => {
                    self.handle_line(&line);
                }
            }
        }
        info!("Executor stopped");
    }

    /// Parse and execute one line, logging any failure in full
    pub fn handle_line(&mut self, line: &str) -> Reply {
        let result = line.parse::<Command>().and_then(|cmd| self.execute(cmd));
        match result {
            Ok(()) => Reply::Success,
            Err(e) => {
                error!(command = %line.trim_end(), kind = ?e.kind(), error = %e, "Command failed");
                Reply::Fail
            }
        }
    }

    pub fn execute(&mut self, command: Command) -> Result<(), ApiError> {
        match command {
            Command::NewBackup {
                original_root,
                reflection_root,
                reflector_code,
                change_map_code,
                mirrored,
            } => self.new_backup(
                &original_root,
                &reflection_root,
                &reflector_code,
                &change_map_code,
                mirrored,
            ),
            Command::Backup { original_root } => self.backup(&key_of(&original_root)),
            Command::Update {
                kind,
                root,
                path,
                new_name,
                is_dir,
            } => self.update(&root, kind, &path, new_name.as_deref(), is_dir),
            Command::Unbackup { original_root } => self.unbackup(&key_of(&original_root)),
            Command::Recover { original_root } => self.recover(&key_of(&original_root)),
        }
    }

    #[instrument(skip(self))]
    fn new_backup(
        &mut self,
        original_root: &Path,
        reflection_root: &Path,
        reflector_code: &str,
        change_map_code: &str,
        mirrored: bool,
    ) -> Result<(), ApiError> {
        let reflector_code = or_default(reflector_code, &self.defaults.reflector);
        let change_map_code = or_default(change_map_code, &self.defaults.change_map);
        let reflector_factory = self.registry.reflector(&reflector_code)?;
        let map_factory = self.registry.change_map(&change_map_code)?;

        let original_root = path::normalize_root(original_root);
        if !original_root.is_dir() {
            return Err(ApiError::NotFound(format!(
                "original root {} is not a directory",
                original_root.display()
            )));
        }
        std::fs::create_dir_all(reflection_root)
            .map_err(|e| ApiError::io(format!("create {}", reflection_root.display()), e))?;
        let reflection_root = path::normalize_root(reflection_root);
        if reflection_root.starts_with(&original_root) || original_root.starts_with(&reflection_root) {
            return Err(ApiError::MalformedInput(
                "original and reflection roots may not contain each other".to_string(),
            ));
        }

        let original = map_factory.create(&original_root)?;
        let mut reflection = map_factory.create(&reflection_root)?;
        // Fresh reflection ids must not collide with the original's
        let offset = original.tree().next_id();
        reflection.tree_mut().rebase_ids(offset);

        let mut reflector = reflector_factory.create(original, reflection);
        reflector.backup()?;
        let (original, reflection) = reflector.into_maps();

        let (drive_label, reflection_base) = match self.resolver.path_to_label(&reflection_root) {
            Some((label, base)) => (label, base.to_string_lossy().to_string()),
            None => (String::new(), String::new()),
        };

        let record = BackupRecord {
            original_root: original_root.to_string_lossy().to_string(),
            reflection_root: reflection_root.to_string_lossy().to_string(),
            reflection_base,
            reflector_code,
            drive_label,
            change_map_code,
            mirrored,
            last_backup: Some(Utc::now()),
            original_map: original.serialize(),
            reflection_map: reflection.serialize(),
        };
        self.store.insert(&record)?;
        info!(
            original = %record.original_root,
            reflection = %record.reflection_root,
            drive_label = %record.drive_label,
            "Registered backup"
        );
        Ok(())
    }

    fn record(&self, key: &str) -> Result<BackupRecord, ApiError> {
        self.store
            .get(key)?
            .ok_or_else(|| store::missing(key))
    }

    fn load_maps(
        &self,
        record: &BackupRecord,
    ) -> Result<(Box<dyn ChangeMap>, Box<dyn ChangeMap>), ApiError> {
        let factory = self.registry.change_map(&record.change_map_code)?;
        let original = factory.load(
            &record.original_map,
            Path::new(&record.original_root).parent(),
        )?;
        let reflection = factory.load(
            &record.reflection_map,
            Path::new(&record.reflection_root).parent(),
        )?;
        Ok((original, reflection))
    }

    fn save_maps(
        &self,
        key: &str,
        original: &dyn ChangeMap,
        reflection: &dyn ChangeMap,
    ) -> Result<(), ApiError> {
        let original_map = original.serialize();
        let reflection_map = reflection.serialize();
        self.store.update(key, &mut |record| {
            record.original_map = original_map.clone();
            record.reflection_map = reflection_map.clone();
            record.last_backup = Some(Utc::now());
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn backup(&mut self, key: &str) -> Result<(), ApiError> {
        let record = self.record(key)?;
        if !record.reflection_available() {
            info!(original = %key, "Reflection drive not mounted; skipping backup");
            return Ok(());
        }
        let (original, reflection) = self.load_maps(&record)?;
        let mut reflector = self
            .registry
            .reflector(&record.reflector_code)?
            .create(original, reflection);
        reflector.backup()?;
        let (original, reflection) = reflector.into_maps();
        self.save_maps(key, original.as_ref(), reflection.as_ref())
    }

    #[instrument(skip(self))]
    fn recover(&mut self, key: &str) -> Result<(), ApiError> {
        let record = self.record(key)?;
        if !record.reflection_available() {
            return Err(ApiError::NotFound(format!(
                "reflection of {} is not mounted",
                key
            )));
        }
        let (original, reflection) = self.load_maps(&record)?;
        let mut reflector = self
            .registry
            .reflector(&record.reflector_code)?
            .create(original, reflection);
        reflector.recover()?;
        let (original, reflection) = reflector.into_maps();
        self.save_maps(key, original.as_ref(), reflection.as_ref())
    }

    #[instrument(skip(self))]
    fn update(
        &mut self,
        root: &Path,
        kind: UpdateKind,
        target: &str,
        new_name: Option<&str>,
        is_dir: bool,
    ) -> Result<(), ApiError> {
        let key = key_of(root);
        let record = self.record(&key)?;
        let rel = path::relative_to(Path::new(&record.original_root), Path::new(target))
            .or_else(|| path::relative_to(root, Path::new(target)))
            .filter(|rel| !rel.is_empty())
            .ok_or_else(|| {
                ApiError::MalformedInput(format!("{} is not below {}", target, key))
            })?;

        let mut batch = UpdateBatch::default();
        match (kind, new_name) {
            (UpdateKind::Create, _) => batch.creations.push(rel),
            (UpdateKind::Delete, _) => batch.deletions.push(rel),
            (UpdateKind::Write, _) if is_dir => {
                debug!(path = %rel, "Ignoring directory write");
                return Ok(());
            }
            (UpdateKind::Write, _) => {
                let (_, name) = path::split_parent(&rel);
                batch.renames.push((rel, name));
            }
            (UpdateKind::Rename, Some(name)) => batch.renames.push((rel, name.to_string())),
            (UpdateKind::Rename, None) => {
                return Err(ApiError::MalformedInput("rename requires a new name".to_string()))
            }
        }
        let (files, dirs) = if is_dir {
            (UpdateBatch::default(), batch)
        } else {
            (batch, UpdateBatch::default())
        };

        let factory = self.registry.change_map(&record.change_map_code)?;
        let mut original = factory.load(
            &record.original_map,
            Path::new(&record.original_root).parent(),
        )?;
        original.update(&files, &dirs)?;
        let serialized = original.serialize();
        let record = self.store.update(&key, &mut |record| {
            record.original_map = serialized.clone();
        })?;

        if record.mirrored && record.reflection_available() {
            self.backup(&key)?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn unbackup(&mut self, key: &str) -> Result<(), ApiError> {
        if !self.store.delete(key)? {
            return Err(store::missing(key));
        }
        info!(original = %key, "Unregistered backup");
        Ok(())
    }
}

/// Store key for a root as given on the wire
pub fn key_of(root: &Path) -> String {
    path::normalize_root(root).to_string_lossy().to_string()
}

fn or_default(code: &str, default: &str) -> String {
    if code.is_empty() {
        default.to_string()
    } else {
        code.to_string()
    }
}
