use std::sync::Arc;

use super::{DocumentStore, ExtractionStore, StorageResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoragesStatus {
    #[default]
    Created,
    Initialized,
    Finalized,
}

enum ManagedStorage {
    Documents(Arc<dyn DocumentStore>),
    Extractions(Arc<dyn ExtractionStore>),
}

impl ManagedStorage {
    async fn initialize(&self) -> StorageResult<()> {
        match self {
            ManagedStorage::Documents(storage) => storage.initialize().await,
            ManagedStorage::Extractions(storage) => storage.initialize().await,
        }
    }

    async fn finalize(&self) -> StorageResult<()> {
        match self {
            ManagedStorage::Documents(storage) => storage.finalize().await,
            ManagedStorage::Extractions(storage) => storage.finalize().await,
        }
    }
}

/// sequentially initializes registered backends so startup failures are reported in order
#[derive(Default)]
pub struct StorageManager {
    status: StoragesStatus,
    storages: Vec<ManagedStorage>,
}

impl StorageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StoragesStatus {
        self.status
    }

    pub fn register_documents(&mut self, storage: Arc<dyn DocumentStore>) {
        self.storages.push(ManagedStorage::Documents(storage));
    }

    pub fn register_extractions(&mut self, storage: Arc<dyn ExtractionStore>) {
        self.storages.push(ManagedStorage::Extractions(storage));
    }

    pub async fn initialize_all(&mut self) -> StorageResult<()> {
        if self.status == StoragesStatus::Initialized {
            return Ok(());
        }

        for storage in &self.storages {
            storage.initialize().await?;
        }

        self.status = StoragesStatus::Initialized;
        Ok(())
    }

    /// Flushes every backend; keeps going past failures and reports the first.
    pub async fn finalize_all(&mut self) -> StorageResult<()> {
        let mut first_error = None;
        for storage in &self.storages {
            if let Err(err) = storage.finalize().await {
                first_error.get_or_insert(err);
            }
        }
        self.status = StoragesStatus::Finalized;
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
