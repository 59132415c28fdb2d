use std::sync::Arc;

use crate::{
    config::AppConfig,
    pipeline::{ExtractionService, Orchestrator},
    provider::ProviderTransport,
    proxy::{ApiKey, ExtractProxy, ExtractService, ParseProxy, ParseService},
    storage::{DocumentStore, ExtractionStore, StoragesStatus},
};

/// Shared handles behind every route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub documents: Arc<dyn DocumentStore>,
    pub extractions: Arc<dyn ExtractionStore>,
    pub parser: Arc<dyn ParseService>,
    pub extractor: Arc<dyn ExtractService>,
    pub orchestrator: Arc<Orchestrator>,
    pub extraction_service: Arc<ExtractionService>,
    pub storages_status: StoragesStatus,
}

impl AppState {
    /// Builds both proxies over one transport and wires the orchestrator and
    /// extraction service to them.
    pub fn new(
        config: AppConfig,
        documents: Arc<dyn DocumentStore>,
        extractions: Arc<dyn ExtractionStore>,
        transport: Arc<dyn ProviderTransport>,
        api_key: Option<ApiKey>,
        storages_status: StoragesStatus,
    ) -> Self {
        let parser: Arc<dyn ParseService> =
            Arc::new(ParseProxy::new(transport.clone(), api_key.clone()));
        let extractor: Arc<dyn ExtractService> = Arc::new(ExtractProxy::new(transport, api_key));

        let orchestrator = Arc::new(Orchestrator::new(
            documents.clone(),
            parser.clone(),
            config.ingest.clone(),
        ));
        let extraction_service = Arc::new(ExtractionService::new(
            documents.clone(),
            extractions.clone(),
            extractor.clone(),
        ));

        Self {
            config: Arc::new(config),
            documents,
            extractions,
            parser,
            extractor,
            orchestrator,
            extraction_service,
            storages_status,
        }
    }
}
