#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use diligence_runtime::{
    provider::{Endpoint, ProviderForm, ProviderResponse, ProviderTransport, TransportError},
    proxy::{ParseRequest, ParseService, ProxyError},
    storage::{
        Document, DocumentPatch, DocumentStatus, DocumentStore, JsonDocumentConfig,
        JsonDocumentStorage, JsonExtractionConfig, JsonExtractionStorage, ExtractionStore,
        NewDocument, StorageResult, StoreError, UpdateOutcome,
    },
};
use serde_json::{Value, json};
use tempfile::TempDir;

pub fn temp_working_dir() -> TempDir {
    TempDir::new().expect("create temp dir")
}

pub fn document_config(dir: &TempDir) -> JsonDocumentConfig {
    JsonDocumentConfig {
        working_dir: dir.path().into(),
        namespace: "documents".to_string(),
        workspace: None,
    }
}

pub async fn document_store(dir: &TempDir) -> anyhow::Result<Arc<JsonDocumentStorage>> {
    let store = Arc::new(JsonDocumentStorage::new(document_config(dir)));
    store.initialize().await?;
    Ok(store)
}

pub async fn extraction_store(dir: &TempDir) -> anyhow::Result<Arc<JsonExtractionStorage>> {
    let store = Arc::new(JsonExtractionStorage::new(JsonExtractionConfig {
        working_dir: dir.path().into(),
        namespace: "extractions".to_string(),
        workspace: None,
    }));
    store.initialize().await?;
    Ok(store)
}

pub fn parsed_body(markdown: &str) -> Value {
    json!({
        "markdown": markdown,
        "chunks": [{ "id": "c1", "markdown": markdown, "type": "text" }],
        "splits": [],
        "metadata": { "page_count": 1 }
    })
}

type Responder = dyn Fn(Endpoint, &ProviderForm) -> ProviderResponse + Send + Sync;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub endpoint: Endpoint,
    pub api_key: String,
    pub form: ProviderForm,
}

/// Provider stand-in that answers from a closure and remembers every request.
pub struct RecordingTransport {
    responder: Box<Responder>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingTransport {
    pub fn new(
        responder: impl Fn(Endpoint, &ProviderForm) -> ProviderResponse + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(move |_, _| ProviderResponse {
            status: 200,
            body: body.clone(),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ProviderTransport for RecordingTransport {
    async fn send(
        &self,
        endpoint: Endpoint,
        api_key: &str,
        form: ProviderForm,
    ) -> Result<ProviderResponse, TransportError> {
        let response = (self.responder)(endpoint, &form);
        self.calls.lock().unwrap().push(RecordedCall {
            endpoint,
            api_key: api_key.to_string(),
            form,
        });
        Ok(response)
    }
}

type ParseFn = dyn Fn(&ParseRequest) -> Result<Value, ProxyError> + Send + Sync;

/// Parse service double with an optional artificial delay.
pub struct FakeParser {
    handler: Box<ParseFn>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeParser {
    pub fn new(
        handler: impl Fn(&ParseRequest) -> Result<Value, ProxyError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(|_| Ok(parsed_body("# Parsed")))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParseService for FakeParser {
    async fn parse(&self, request: ParseRequest) -> Result<Value, ProxyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(&request)
    }
}

/// Wraps the json store and fails chosen operations on demand.
pub struct FlakyStore {
    inner: Arc<JsonDocumentStorage>,
    pub fail_create: AtomicBool,
    pub fail_completion: AtomicBool,
    pub fail_mark_failed: AtomicBool,
    pub update_attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<JsonDocumentStorage>) -> Self {
        Self {
            inner,
            fail_create: AtomicBool::new(false),
            fail_completion: AtomicBool::new(false),
            fail_mark_failed: AtomicBool::new(false),
            update_attempts: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &Arc<JsonDocumentStorage> {
        &self.inner
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn initialize(&self) -> StorageResult<()> {
        self.inner.initialize().await
    }

    async fn finalize(&self) -> StorageResult<()> {
        self.inner.finalize().await
    }

    async fn create(&self, new: NewDocument) -> StorageResult<Document> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        self.inner.create(new).await
    }

    async fn update(&self, id: &str, patch: DocumentPatch) -> StorageResult<UpdateOutcome> {
        self.update_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = match patch.status {
            Some(DocumentStatus::Completed) => self.fail_completion.load(Ordering::SeqCst),
            Some(DocumentStatus::Failed) => self.fail_mark_failed.load(Ordering::SeqCst),
            _ => false,
        };
        if failing {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.update(id, patch).await
    }

    async fn get_by_id(&self, id: &str) -> StorageResult<Option<Document>> {
        self.inner.get_by_id(id).await
    }

    async fn get_recent(&self, limit: usize) -> StorageResult<Vec<Document>> {
        self.inner.get_recent(limit).await
    }

    async fn status_counts(&self) -> StorageResult<HashMap<DocumentStatus, usize>> {
        self.inner.status_counts().await
    }

    async fn delete(&self, ids: &[String]) -> StorageResult<()> {
        self.inner.delete(ids).await
    }

    async fn sync_if_dirty(&self) -> StorageResult<()> {
        self.inner.sync_if_dirty().await
    }
}
