use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::{
    proxy::{ExtractRequest, ExtractService, ProxyError},
    storage::{
        DocumentStatus, DocumentStore, Extraction, ExtractionStore, NewExtraction, StoreError,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("document {0} not found")]
    DocumentNotFound(String),
    #[error("document {id} is {status}, extraction needs a completed document")]
    NotCompleted { id: String, status: DocumentStatus },
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs schema extraction over a parsed Document's markdown and keeps the result.
pub struct ExtractionService {
    documents: Arc<dyn DocumentStore>,
    extractions: Arc<dyn ExtractionStore>,
    extractor: Arc<dyn ExtractService>,
}

impl ExtractionService {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        extractions: Arc<dyn ExtractionStore>,
        extractor: Arc<dyn ExtractService>,
    ) -> Self {
        Self {
            documents,
            extractions,
            extractor,
        }
    }

    pub async fn extract(
        &self,
        document_id: &str,
        schema: Value,
        model: Option<String>,
    ) -> Result<Extraction, ExtractionError> {
        let document = self
            .documents
            .get_by_id(document_id)
            .await?
            .ok_or_else(|| ExtractionError::DocumentNotFound(document_id.to_string()))?;

        if document.status != DocumentStatus::Completed {
            return Err(ExtractionError::NotCompleted {
                id: document.id,
                status: document.status,
            });
        }
        let markdown = document
            .markdown
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| ProxyError::invalid_input("document has no markdown to extract from"))?;

        let request = ExtractRequest::inline(markdown, schema.clone()).with_model(model);
        let output = self.extractor.extract(request).await?;

        let extraction = self
            .extractions
            .record(NewExtraction::from_provider(document_id, schema, output))
            .await?;
        info!(document_id = %document_id, extraction_id = %extraction.id, "extraction stored");
        Ok(extraction)
    }

    pub async fn list(&self, document_id: &str) -> Result<Vec<Extraction>, ExtractionError> {
        if self.documents.get_by_id(document_id).await?.is_none() {
            return Err(ExtractionError::DocumentNotFound(document_id.to_string()));
        }
        Ok(self.extractions.for_document(document_id).await?)
    }
}
