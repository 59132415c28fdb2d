use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::io::{ensure_parent_dir, load_or_default, write_json_file};
use super::{Extraction, ExtractionStore, NewExtraction, StorageResult};

#[derive(Clone, Debug)]
pub struct JsonExtractionConfig {
    pub working_dir: PathBuf,
    pub namespace: String,
    pub workspace: Option<String>,
}

pub struct JsonExtractionStorage {
    file_path: PathBuf,
    data: Arc<RwLock<HashMap<String, Extraction>>>,
    dirty: AtomicBool,
}

impl JsonExtractionStorage {
    pub fn new(config: JsonExtractionConfig) -> Self {
        let JsonExtractionConfig {
            working_dir,
            namespace,
            workspace,
        } = config;

        let workspace_dir = match workspace.as_deref() {
            Some(ws) if !ws.is_empty() => working_dir.join(ws),
            _ => working_dir,
        };

        Self {
            file_path: workspace_dir.join(format!("kv_store_{}.json", namespace)),
            data: Arc::new(RwLock::new(HashMap::new())),
            dirty: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ExtractionStore for JsonExtractionStorage {
    async fn initialize(&self) -> StorageResult<()> {
        ensure_parent_dir(&self.file_path).await?;
        let data: HashMap<String, Extraction> = load_or_default(&self.file_path).await?;
        *self.data.write().await = data;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn finalize(&self) -> StorageResult<()> {
        self.sync_if_dirty().await
    }

    async fn record(&self, new: NewExtraction) -> StorageResult<Extraction> {
        let extraction = Extraction {
            id: Uuid::new_v4().to_string(),
            document_id: new.document_id,
            schema: new.schema,
            extraction: new.extraction,
            extraction_metadata: new.extraction_metadata,
            metadata: new.metadata,
            created_at: Utc::now(),
        };

        self.data
            .write()
            .await
            .insert(extraction.id.clone(), extraction.clone());
        self.dirty.store(true, Ordering::SeqCst);

        if let Err(err) = self.sync_if_dirty().await {
            self.data.write().await.remove(&extraction.id);
            return Err(err);
        }
        Ok(extraction)
    }

    async fn for_document(&self, document_id: &str) -> StorageResult<Vec<Extraction>> {
        let guard = self.data.read().await;
        let mut rows: Vec<Extraction> = guard
            .values()
            .filter(|row| row.document_id == document_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn sync_if_dirty(&self) -> StorageResult<()> {
        // the write lock doubles as the flush lock
        let guard = self.data.write().await;
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(err) = write_json_file(&self.file_path, &*guard).await {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(err);
        }
        Ok(())
    }
}
