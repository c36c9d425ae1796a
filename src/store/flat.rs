//! Flat-file metadata store: one comma-separated row per record
//!
//! The whole file is rewritten on every mutation, through a temporary file
//! renamed into place. Memory only changes once the file has been replaced.

use crate::error::ApiError;
use crate::store::{missing, BackupRecord, MetadataStore};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FlatFileMetadataStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, BackupRecord>>,
}

impl FlatFileMetadataStore {
    /// Load the file at `path`, or start empty when it does not exist yet
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ApiError> {
        let path = path.as_ref().to_path_buf();
        let mut records = BTreeMap::new();
        match fs::read_to_string(&path) {
            Ok(contents) => {
                for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                    let record = BackupRecord::from_row(line)?;
                    records.insert(record.key().to_string(), record);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ApiError::io(format!("read {}", path.display()), e)),
        }
        debug!(path = %path.display(), records = records.len(), "Loaded flat metadata file");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    fn write_to_disk(&self, records: &BTreeMap<String, BackupRecord>) -> Result<(), ApiError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ApiError::io(format!("create {}", parent.display()), e))?;
        }
        let mut contents = String::new();
        for record in records.values() {
            contents.push_str(&record.to_row());
            contents.push('\n');
        }
        let temp = self.path.with_extension("tmp");
        fs::write(&temp, contents)
            .map_err(|e| ApiError::io(format!("write {}", temp.display()), e))?;
        fs::rename(&temp, &self.path)
            .map_err(|e| ApiError::io(format!("replace {}", self.path.display()), e))
    }
}

impl MetadataStore for FlatFileMetadataStore {
    fn get(&self, key: &str) -> Result<Option<BackupRecord>, ApiError> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn insert(&self, record: &BackupRecord) -> Result<(), ApiError> {
        let mut records = self.records.lock();
        let mut staged = records.clone();
        staged.insert(record.key().to_string(), record.clone());
        self.write_to_disk(&staged)?;
        *records = staged;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, ApiError> {
        let mut records = self.records.lock();
        if !records.contains_key(key) {
            return Ok(false);
        }
        let mut staged = records.clone();
        staged.remove(key);
        self.write_to_disk(&staged)?;
        *records = staged;
        Ok(true)
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&mut BackupRecord),
    ) -> Result<BackupRecord, ApiError> {
        let mut records = self.records.lock();
        let mut record = records.get(key).cloned().ok_or_else(|| missing(key))?;
        apply(&mut record);
        if record.key() != key {
            return Err(ApiError::MalformedInput(format!(
                "update may not change the key of {}",
                key
            )));
        }
        let mut staged = records.clone();
        staged.insert(key.to_string(), record.clone());
        self.write_to_disk(&staged)?;
        *records = staged;
        Ok(record)
    }

    fn keys(&self) -> Result<Vec<String>, ApiError> {
        Ok(self.records.lock().keys().cloned().collect())
    }
}
