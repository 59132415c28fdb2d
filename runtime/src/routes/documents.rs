use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use tracing::{info, warn};

use super::types::{
    DocumentListResponse, ExtractionBody, ExtractionListResponse, ListQuery, UploadResponse,
};
use crate::{
    AppState,
    pipeline::{ExtractionError, FileSubmission},
    storage::{Document, Extraction},
};

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 200;

pub fn document_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/documents/upload", post(upload_documents))
        .route("/documents", get(list_documents))
        .route("/documents/{id}", get(get_document))
        .route(
            "/documents/{id}/extractions",
            post(create_extraction).get(list_extractions),
        )
}

async fn upload_documents(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        (
            StatusCode::BAD_REQUEST,
            format!("invalid multipart payload: {err}"),
        )
    })? {
        match field.name() {
            Some("file") => {
                // empty or unnamed parts fail individually
                let filename = field.file_name().map(str::to_string).unwrap_or_default();
                let data = field.bytes().await.map_err(|err| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("failed to read upload field: {err}"),
                    )
                })?;
                files.push(FileSubmission::upload(filename, data.to_vec()));
            }
            Some("document_url") => {
                let url = field.text().await.map_err(|err| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("failed to read document_url field: {err}"),
                    )
                })?;
                let url = url.trim();
                if !url.is_empty() {
                    files.push(FileSubmission::url(url));
                }
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "provide at least one file or document_url field".to_string(),
        ));
    }

    let session = state.orchestrator.session();
    let results = session.submit_batch(files).await;
    let response = UploadResponse::from_files(results);
    info!(
        completed = response.completed,
        failed = response.failed,
        "upload batch settled"
    );
    Ok(Json(response))
}

async fn list_documents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<DocumentListResponse>, (StatusCode, String)> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let documents = state.documents.get_recent(limit).await.map_err(|err| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to load documents: {err}"),
        )
    })?;
    let status_counts = state
        .documents
        .status_counts()
        .await
        .map_err(|err| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to count documents: {err}"),
            )
        })?
        .into_iter()
        .map(|(status, count)| (status.as_str().to_string(), count))
        .collect();

    Ok(Json(DocumentListResponse {
        documents,
        status_counts,
    }))
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Document>, (StatusCode, String)> {
    state
        .documents
        .get_by_id(&id)
        .await
        .map_err(|err| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to load document {id}: {err}"),
            )
        })?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("document {id} not found")))
}

async fn create_extraction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ExtractionBody>,
) -> Result<Json<Extraction>, (StatusCode, String)> {
    state
        .extraction_service
        .extract(&id, body.schema, body.model)
        .await
        .map(Json)
        .map_err(extraction_failure)
}

async fn list_extractions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ExtractionListResponse>, (StatusCode, String)> {
    let extractions = state
        .extraction_service
        .list(&id)
        .await
        .map_err(extraction_failure)?;
    Ok(Json(ExtractionListResponse {
        document_id: id,
        extractions,
    }))
}

fn extraction_failure(err: ExtractionError) -> (StatusCode, String) {
    let status = match &err {
        ExtractionError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
        ExtractionError::NotCompleted { .. } => StatusCode::CONFLICT,
        ExtractionError::Proxy(proxy) => proxy.status_code(),
        ExtractionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %err, "extraction request failed");
    }
    (status, err.to_string())
}
