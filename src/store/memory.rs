//! In-memory metadata store

use crate::error::ApiError;
use crate::store::{missing, BackupRecord, MetadataStore};
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct MemoryMetadataStore {
    records: Mutex<BTreeMap<String, BackupRecord>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn get(&self, key: &str) -> Result<Option<BackupRecord>, ApiError> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn insert(&self, record: &BackupRecord) -> Result<(), ApiError> {
        self.records
            .lock()
            .insert(record.key().to_string(), record.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, ApiError> {
        Ok(self.records.lock().remove(key).is_some())
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&mut BackupRecord),
    ) -> Result<BackupRecord, ApiError> {
        let mut records = self.records.lock();
        let record = records.get_mut(key).ok_or_else(|| missing(key))?;
        apply(record);
        Ok(record.clone())
    }

    fn keys(&self) -> Result<Vec<String>, ApiError> {
        Ok(self.records.lock().keys().cloned().collect())
    }
}
