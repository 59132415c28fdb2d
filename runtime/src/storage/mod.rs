use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

pub mod io;
pub mod json_documents;
pub mod json_extractions;
pub mod manager;

pub use json_documents::{JsonDocumentConfig, JsonDocumentStorage};
pub use json_extractions::{JsonExtractionConfig, JsonExtractionStorage};
pub use manager::{StorageManager, StoragesStatus};

pub type StorageResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("document {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("document {id}: {reason}")]
    InvalidPatch { id: String, reason: &'static str },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum DocumentStatus {
    Pending,
    #[default]
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }

    /// Forward-only: pending -> processing -> {completed | failed}.
    pub fn can_become(self, next: DocumentStatus) -> bool {
        if self == next {
            return true;
        }
        match self {
            DocumentStatus::Pending => next != DocumentStatus::Pending,
            DocumentStatus::Processing => next.is_terminal(),
            DocumentStatus::Completed | DocumentStatus::Failed => false,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Document {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub markdown: Option<String>,
    #[serde(default)]
    #[ts(type = "unknown")]
    pub chunks: Option<Value>,
    #[serde(default)]
    #[ts(type = "unknown")]
    pub splits: Option<Value>,
    #[serde(default)]
    #[ts(type = "unknown")]
    pub metadata: Option<Value>,
    pub status: DocumentStatus,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(id: String, new: NewDocument, now: DateTime<Utc>) -> Self {
        Self {
            id,
            filename: new.filename,
            file_url: new.file_url,
            markdown: None,
            chunks: None,
            splits: None,
            metadata: None,
            status: DocumentStatus::Processing,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a partial update in place. Returns whether anything changed;
    /// `updated_at` only moves when it did.
    pub fn apply(&mut self, patch: &DocumentPatch, now: DateTime<Utc>) -> StorageResult<bool> {
        let next_status = patch.status.unwrap_or(self.status);
        if !self.status.can_become(next_status) {
            return Err(StoreError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next_status,
            });
        }
        if patch.carries_artifacts() && next_status != DocumentStatus::Completed {
            return Err(StoreError::InvalidPatch {
                id: self.id.clone(),
                reason: "parse artifacts can only be stored on a completed document",
            });
        }
        if self.status == DocumentStatus::Completed && !self.holds_artifacts(patch) {
            return Err(StoreError::InvalidPatch {
                id: self.id.clone(),
                reason: "a completed document's artifacts cannot be rewritten",
            });
        }
        if next_status == DocumentStatus::Completed
            && self.markdown.is_none()
            && patch.markdown.is_none()
        {
            return Err(StoreError::InvalidPatch {
                id: self.id.clone(),
                reason: "a completed document requires markdown",
            });
        }

        let before = self.clone();
        self.status = next_status;
        if let Some(markdown) = &patch.markdown {
            self.markdown = Some(markdown.clone());
        }
        if let Some(chunks) = &patch.chunks {
            self.chunks = Some(chunks.clone());
        }
        if let Some(splits) = &patch.splits {
            self.splits = Some(splits.clone());
        }
        if let Some(metadata) = &patch.metadata {
            self.metadata = Some(metadata.clone());
        }
        if let Some(file_url) = &patch.file_url {
            self.file_url = Some(file_url.clone());
        }
        if self.status == DocumentStatus::Completed {
            self.chunks.get_or_insert_with(|| Value::Array(Vec::new()));
            self.splits.get_or_insert_with(|| Value::Array(Vec::new()));
            self.metadata.get_or_insert_with(|| Value::Object(Map::new()));
        }

        let changed = *self != before;
        if changed {
            self.updated_at = now;
        }
        Ok(changed)
    }

    /// True when every artifact the patch carries is already stored as is.
    fn holds_artifacts(&self, patch: &DocumentPatch) -> bool {
        fn same<T: PartialEq>(stored: &Option<T>, incoming: &Option<T>) -> bool {
            incoming.is_none() || stored == incoming
        }
        same(&self.markdown, &patch.markdown)
            && same(&self.chunks, &patch.chunks)
            && same(&self.splits, &patch.splits)
            && same(&self.metadata, &patch.metadata)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub filename: String,
    pub file_url: Option<String>,
}

impl NewDocument {
    pub fn named(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            file_url: None,
        }
    }

    pub fn with_file_url(mut self, url: Option<String>) -> Self {
        self.file_url = url;
        self
    }
}

/// Field-level update. `None` leaves the stored column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    pub status: Option<DocumentStatus>,
    pub markdown: Option<String>,
    pub chunks: Option<Value>,
    pub splits: Option<Value>,
    pub metadata: Option<Value>,
    pub file_url: Option<String>,
}

impl DocumentPatch {
    pub fn status(status: DocumentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn completed(markdown: String, chunks: Value, splits: Value, metadata: Value) -> Self {
        Self {
            status: Some(DocumentStatus::Completed),
            markdown: Some(markdown),
            chunks: Some(chunks),
            splits: Some(splits),
            metadata: Some(metadata),
            file_url: None,
        }
    }

    fn carries_artifacts(&self) -> bool {
        self.markdown.is_some()
            || self.chunks.is_some()
            || self.splits.is_some()
            || self.metadata.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated(Document),
    NotFound,
}

impl UpdateOutcome {
    pub fn is_not_found(&self) -> bool {
        matches!(self, UpdateOutcome::NotFound)
    }

    pub fn document(self) -> Option<Document> {
        match self {
            UpdateOutcome::Updated(document) => Some(document),
            UpdateOutcome::NotFound => None,
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn initialize(&self) -> StorageResult<()>;
    async fn finalize(&self) -> StorageResult<()>;

    /// New rows start at `processing`.
    async fn create(&self, new: NewDocument) -> StorageResult<Document>;
    async fn update(&self, id: &str, patch: DocumentPatch) -> StorageResult<UpdateOutcome>;

    async fn get_by_id(&self, id: &str) -> StorageResult<Option<Document>>;
    /// Newest first by `created_at`.
    async fn get_recent(&self, limit: usize) -> StorageResult<Vec<Document>>;
    async fn status_counts(&self) -> StorageResult<HashMap<DocumentStatus, usize>>;

    async fn delete(&self, ids: &[String]) -> StorageResult<()>;

    async fn sync_if_dirty(&self) -> StorageResult<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Extraction {
    pub id: String,
    pub document_id: String,
    #[ts(type = "unknown")]
    pub schema: Value,
    #[ts(type = "unknown")]
    pub extraction: Value,
    #[serde(default)]
    #[ts(type = "unknown")]
    pub extraction_metadata: Option<Value>,
    #[serde(default)]
    #[ts(type = "unknown")]
    pub metadata: Option<Value>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExtraction {
    pub document_id: String,
    pub schema: Value,
    pub extraction: Value,
    pub extraction_metadata: Option<Value>,
    pub metadata: Option<Value>,
}

impl NewExtraction {
    /// Splits a provider extract response into its stored columns. A response
    /// without an `extraction` key is stored whole.
    pub fn from_provider(document_id: impl Into<String>, schema: Value, output: Value) -> Self {
        let (extraction, extraction_metadata, metadata) = match output {
            Value::Object(mut map) => {
                let extraction_metadata = map.remove("extraction_metadata");
                let metadata = map.remove("metadata");
                let extraction = match map.remove("extraction") {
                    Some(extraction) => extraction,
                    None => Value::Object(map),
                };
                (extraction, extraction_metadata, metadata)
            }
            other => (other, None, None),
        };

        Self {
            document_id: document_id.into(),
            schema,
            extraction,
            extraction_metadata,
            metadata,
        }
    }
}

#[async_trait]
pub trait ExtractionStore: Send + Sync {
    async fn initialize(&self) -> StorageResult<()>;
    async fn finalize(&self) -> StorageResult<()>;

    async fn record(&self, new: NewExtraction) -> StorageResult<Extraction>;
    /// Oldest first.
    async fn for_document(&self, document_id: &str) -> StorageResult<Vec<Extraction>>;

    async fn sync_if_dirty(&self) -> StorageResult<()>;
}
