//! Sled-backed metadata store

use crate::error::ApiError;
use crate::store::{missing, BackupRecord, MetadataStore};
use parking_lot::Mutex;
use std::path::Path;

/// Sled-based implementation of MetadataStore
///
/// Records are bincode-encoded under their original root. Every mutation is
/// flushed before returning.
pub struct SledMetadataStore {
    db: sled::Db,
    write_lock: Mutex<()>,
}

impl SledMetadataStore {
    /// Open (or create) a store at the given directory
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ApiError> {
        let db = sled::open(path)
            .map_err(|e| ApiError::Store(format!("Failed to open sled database: {}", e)))?;
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), ApiError> {
        self.db
            .flush()
            .map_err(|e| ApiError::Store(format!("Failed to flush database: {}", e)))?;
        Ok(())
    }

    fn put(&self, record: &BackupRecord) -> Result<(), ApiError> {
        let value = bincode::serialize(record)
            .map_err(|e| ApiError::Store(format!("Failed to serialize backup record: {}", e)))?;
        self.db
            .insert(record.key().as_bytes(), value)
            .map_err(|e| ApiError::Store(format!("Failed to put backup record: {}", e)))?;
        self.flush()
    }
}

impl MetadataStore for SledMetadataStore {
    fn get(&self, key: &str) -> Result<Option<BackupRecord>, ApiError> {
        match self
            .db
            .get(key.as_bytes())
            .map_err(|e| ApiError::Store(format!("Failed to get backup record: {}", e)))?
        {
            Some(value) => {
                let record: BackupRecord = bincode::deserialize(&value).map_err(|e| {
                    ApiError::Store(format!("Failed to deserialize backup record: {}", e))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn insert(&self, record: &BackupRecord) -> Result<(), ApiError> {
        let _guard = self.write_lock.lock();
        self.put(record)
    }

    fn delete(&self, key: &str) -> Result<bool, ApiError> {
        let _guard = self.write_lock.lock();
        let removed = self
            .db
            .remove(key.as_bytes())
            .map_err(|e| ApiError::Store(format!("Failed to delete backup record: {}", e)))?;
        self.flush()?;
        Ok(removed.is_some())
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&mut BackupRecord),
    ) -> Result<BackupRecord, ApiError> {
        let _guard = self.write_lock.lock();
        let mut record = self.get(key)?.ok_or_else(|| missing(key))?;
        apply(&mut record);
        if record.key() != key {
            return Err(ApiError::MalformedInput(format!(
                "update may not change the key of {}",
                key
            )));
        }
        self.put(&record)?;
        Ok(record)
    }

    fn keys(&self) -> Result<Vec<String>, ApiError> {
        let mut keys = Vec::new();
        for item in self.db.iter().keys() {
            let key = item.map_err(|e| ApiError::Store(format!("Failed to iterate store: {}", e)))?;
            keys.push(String::from_utf8_lossy(&key).to_string());
        }
        Ok(keys)
    }
}
