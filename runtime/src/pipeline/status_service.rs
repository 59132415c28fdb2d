use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::storage::{
    Document, DocumentPatch, DocumentStatus, DocumentStore, NewDocument, StoreError, UpdateOutcome,
};

/// The four structured fields the pipeline persists from a parse result.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArtifacts {
    pub markdown: String,
    pub chunks: Value,
    pub splits: Value,
    pub metadata: Value,
}

impl ParsedArtifacts {
    /// Missing fields get empty containers so a completed row never carries nulls.
    pub fn from_provider(output: Value) -> Self {
        let mut map = match output {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let markdown = match map.remove("markdown") {
            Some(Value::String(text)) => text,
            _ => String::new(),
        };
        Self {
            markdown,
            chunks: non_null(map.remove("chunks"), Value::Array(Vec::new())),
            splits: non_null(map.remove("splits"), Value::Array(Vec::new())),
            metadata: non_null(map.remove("metadata"), Value::Object(Map::new())),
        }
    }

    fn into_patch(self) -> DocumentPatch {
        DocumentPatch::completed(self.markdown, self.chunks, self.splits, self.metadata)
    }
}

fn non_null(value: Option<Value>, empty: Value) -> Value {
    match value {
        Some(Value::Null) | None => empty,
        Some(value) => value,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("document {0} no longer exists")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Wraps the record store with the writes the ingestion pipeline performs.
#[derive(Clone)]
pub struct DocumentStatusService {
    store: Arc<dyn DocumentStore>,
}

impl DocumentStatusService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn open(&self, new: NewDocument) -> Result<Document, StoreError> {
        let document = self.store.create(new).await?;
        info!(document_id = %document.id, filename = %document.filename, "document record created");
        Ok(document)
    }

    pub async fn mark_completed(
        &self,
        document_id: &str,
        artifacts: ParsedArtifacts,
    ) -> Result<Document, PersistenceError> {
        match self.store.update(document_id, artifacts.into_patch()).await? {
            UpdateOutcome::Updated(document) => {
                info!(document_id = %document_id, "document parsed and stored");
                Ok(document)
            }
            UpdateOutcome::NotFound => Err(PersistenceError::NotFound(document_id.to_string())),
        }
    }

    /// Compensating write after a failed step. Best effort: failures are
    /// logged and never retried.
    pub async fn mark_failed(&self, document_id: &str) {
        match self
            .store
            .update(document_id, DocumentPatch::status(DocumentStatus::Failed))
            .await
        {
            Ok(UpdateOutcome::Updated(_)) => {
                info!(document_id = %document_id, "document marked failed");
            }
            Ok(UpdateOutcome::NotFound) => {
                warn!(
                    document_id = %document_id,
                    "document vanished before it could be marked failed"
                );
            }
            Err(err) => {
                warn!(
                    document_id = %document_id,
                    error = %err,
                    "failed to mark document as failed"
                );
            }
        }
    }
}
