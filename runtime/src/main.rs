use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use diligence_runtime::{
    AppState,
    config::{API_KEY_VAR, load_config, provider_api_key},
    provider::{HttpProvider, ProviderTransport},
    routes,
    storage::{
        DocumentStore, ExtractionStore, JsonDocumentConfig, JsonDocumentStorage,
        JsonExtractionConfig, JsonExtractionStorage, StorageManager,
    },
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(error = ?err, "Server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_tracing();

    if let Err(err) = dotenv() {
        warn!(error = %err, "No .env file loaded");
    }

    let config = load_config().await?;

    let api_key = provider_api_key();
    if api_key.is_none() {
        error!(
            var = API_KEY_VAR,
            "Provider credential is not set; parse and extract requests will fail"
        );
    }

    let working_dir = config.working_dir.clone();
    let workspace = config.effective_workspace();

    let documents = Arc::new(JsonDocumentStorage::new(JsonDocumentConfig {
        working_dir: working_dir.clone(),
        namespace: "documents".into(),
        workspace: workspace.clone(),
    }));
    let extractions = Arc::new(JsonExtractionStorage::new(JsonExtractionConfig {
        working_dir: working_dir.clone(),
        namespace: "extractions".into(),
        workspace: workspace.clone(),
    }));
    info!(path = %documents.file_path().display(), "Document store location");

    let mut storage_manager = StorageManager::new();
    storage_manager.register_documents(documents.clone());
    storage_manager.register_extractions(extractions.clone());
    storage_manager
        .initialize_all()
        .await
        .context("Failed to initialize storages")?;

    let transport: Arc<dyn ProviderTransport> = Arc::new(
        HttpProvider::new(&config.provider).context("Failed to build provider client")?,
    );

    let documents: Arc<dyn DocumentStore> = documents;
    let extractions: Arc<dyn ExtractionStore> = extractions;
    let state = Arc::new(AppState::new(
        config.clone(),
        documents,
        extractions,
        transport,
        api_key,
        storage_manager.status(),
    ));

    let addr_string = format!("{}:{}", config.server.host, config.server.port);
    let addr = addr_string
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid server address: {addr_string}"))?;
    info!(host = %config.server.host, port = config.server.port, "Loaded configuration");

    let app = routes::router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener on {addr}"))?;
    info!(%addr, "Ingestion server listening");

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(err) = storage_manager.finalize_all().await {
        warn!(error = %err, "Failed to finalize storages");
    }

    server_result.context("Server encountered a fatal error")?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received termination signal (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received termination signal (SIGTERM)");
        }
    }
}
