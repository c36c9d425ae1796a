//! Backup metadata store
//!
//! One [`BackupRecord`] per registered original root, keyed by that root's
//! path. Every backend locks internally and writes through on each mutation,
//! so the executor and the monitor can share one handle.

pub mod flat;
pub mod memory;
pub mod persistence;
pub mod record;

pub use flat::FlatFileMetadataStore;
pub use memory::MemoryMetadataStore;
pub use persistence::SledMetadataStore;
pub use record::BackupRecord;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::ApiError;
use std::sync::Arc;
use tracing::info;

/// Metadata store interface
pub trait MetadataStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<BackupRecord>, ApiError>;

    /// Insert or replace the record stored under its original root
    fn insert(&self, record: &BackupRecord) -> Result<(), ApiError>;

    /// Remove a record; returns whether it existed
    fn delete(&self, key: &str) -> Result<bool, ApiError>;

    /// Read-modify-write one record atomically with respect to other callers
    ///
    /// Fails with not-found when no record is stored under `key`.
    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&mut BackupRecord),
    ) -> Result<BackupRecord, ApiError>;

    /// All stored keys, sorted
    fn keys(&self) -> Result<Vec<String>, ApiError>;
}

/// Open the backend selected by configuration
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn MetadataStore>, ApiError> {
    info!(backend = ?config.backend, path = %config.path.display(), "Opening metadata store");
    let store: Arc<dyn MetadataStore> = match config.backend {
        StorageBackend::Sled => Arc::new(SledMetadataStore::new(&config.path)?),
        StorageBackend::Flat => Arc::new(FlatFileMetadataStore::open(&config.path)?),
    };
    Ok(store)
}

pub(crate) fn missing(key: &str) -> ApiError {
    ApiError::NotFound(format!("no backup registered for {}", key))
}
