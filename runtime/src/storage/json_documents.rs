use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering as AtomicOrdering},
};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::io::{ensure_parent_dir, load_or_default, write_json_file};
use super::{
    Document, DocumentPatch, DocumentStatus, DocumentStore, NewDocument, StorageResult,
    UpdateOutcome,
};

#[derive(Clone, Debug)]
pub struct JsonDocumentConfig {
    pub working_dir: PathBuf,
    pub namespace: String,
    pub workspace: Option<String>,
}

/// Document table backed by a single json file.
///
/// Rows live in a sharded map so writers touching different ids never wait on
/// each other; same-id writes serialize on the shard entry, last writer wins.
/// Every mutation is flushed before the call returns.
pub struct JsonDocumentStorage {
    final_namespace: String,
    file_path: PathBuf,
    data: DashMap<String, Document>,
    dirty: AtomicBool,
    flush_lock: Mutex<()>,
}

impl JsonDocumentStorage {
    pub fn new(config: JsonDocumentConfig) -> Self {
        let JsonDocumentConfig {
            working_dir,
            namespace,
            workspace,
        } = config;

        let (workspace_prefix, workspace_dir) = match workspace.as_deref() {
            Some(ws) if !ws.is_empty() => (ws.to_string(), working_dir.join(ws)),
            _ => ("_".to_string(), working_dir.clone()),
        };

        let final_namespace = format!("{}_{}", workspace_prefix, namespace);
        let file_path = workspace_dir.join(format!("doc_status_{}.json", namespace));

        Self {
            final_namespace,
            file_path,
            data: DashMap::new(),
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn file_path(&self) -> &PathBuf {
        &self.file_path
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for JsonDocumentStorage {
    async fn initialize(&self) -> StorageResult<()> {
        ensure_parent_dir(&self.file_path).await?;
        let rows: HashMap<String, Document> = load_or_default(&self.file_path).await?;
        self.data.clear();
        for (id, document) in rows {
            self.data.insert(id, document);
        }
        self.dirty.store(false, AtomicOrdering::SeqCst);
        debug!(namespace = %self.final_namespace, rows = self.data.len(), "document store loaded");
        Ok(())
    }

    async fn finalize(&self) -> StorageResult<()> {
        self.sync_if_dirty().await
    }

    async fn create(&self, new: NewDocument) -> StorageResult<Document> {
        let id = Uuid::new_v4().to_string();
        let document = Document::new(id.clone(), new, Utc::now());
        self.data.insert(id.clone(), document.clone());
        self.mark_dirty();

        self.flush_or_rollback(|| {
            self.data.remove(&id);
        })
        .await?;
        Ok(document)
    }

    async fn update(&self, id: &str, patch: DocumentPatch) -> StorageResult<UpdateOutcome> {
        let (previous, updated, changed) = {
            let Some(mut entry) = self.data.get_mut(id) else {
                return Ok(UpdateOutcome::NotFound);
            };
            let previous = entry.clone();
            let changed = entry.apply(&patch, Utc::now())?;
            (previous, entry.clone(), changed)
        };

        if !changed {
            return Ok(UpdateOutcome::Updated(updated));
        }

        self.mark_dirty();
        self.flush_or_rollback(|| {
            warn!(document_id = %id, "rolling back unflushed document update");
            self.data.insert(id.to_string(), previous);
        })
        .await?;
        Ok(UpdateOutcome::Updated(updated))
    }

    async fn get_by_id(&self, id: &str) -> StorageResult<Option<Document>> {
        Ok(self.data.get(id).map(|entry| entry.value().clone()))
    }

    async fn get_recent(&self, limit: usize) -> StorageResult<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .data
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        docs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        docs.truncate(limit);
        Ok(docs)
    }

    async fn status_counts(&self) -> StorageResult<HashMap<DocumentStatus, usize>> {
        let mut counts: HashMap<DocumentStatus, usize> = HashMap::new();
        for entry in self.data.iter() {
            *counts.entry(entry.value().status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn delete(&self, ids: &[String]) -> StorageResult<()> {
        let mut removed_any = false;
        for id in ids {
            if self.data.remove(id).is_some() {
                removed_any = true;
            }
        }
        if removed_any {
            self.mark_dirty();
            self.sync_if_dirty().await?;
        }
        Ok(())
    }

    async fn sync_if_dirty(&self) -> StorageResult<()> {
        let _guard = self.flush_lock.lock().await;
        self.write_snapshot().await
    }
}

impl JsonDocumentStorage {
    /// Flushes, undoing the caller's in-memory change on failure. The undo runs
    /// before the flush lock is released so no later snapshot can carry it.
    async fn flush_or_rollback(&self, rollback: impl FnOnce()) -> StorageResult<()> {
        let _guard = self.flush_lock.lock().await;
        let result = self.write_snapshot().await;
        if result.is_err() {
            rollback();
        }
        result
    }

    /// Callers hold `flush_lock`.
    async fn write_snapshot(&self) -> StorageResult<()> {
        if !self.dirty.swap(false, AtomicOrdering::SeqCst) {
            return Ok(());
        }

        let snapshot: BTreeMap<String, Document> = self
            .data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        if let Err(err) = write_json_file(&self.file_path, &snapshot).await {
            self.mark_dirty();
            warn!(
                namespace = %self.final_namespace,
                error = %err,
                "failed to write document store"
            );
            return Err(err);
        }
        Ok(())
    }
}
