use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::StatusCode,
    routing::post,
};
use serde_json::Value;

use crate::{
    AppState,
    proxy::{ExtractRequest, ParseRequest, ProxyError},
};

pub fn proxy_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ade-parse", post(ade_parse).options(preflight))
        .route("/ade-extract", post(ade_extract).options(preflight))
}

/// Browsers send a preflight before the multipart POST. The CORS layer adds the headers.
async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn ade_parse(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ProxyError> {
    let mut multipart = multipart.map_err(rejected)?;

    let mut document = None;
    let mut document_url = None;
    let mut model = None;
    let mut split = None;

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "document" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "document".to_string());
                let bytes = field.bytes().await.map_err(malformed)?;
                document = Some((filename, bytes.to_vec()));
            }
            "document_url" => document_url = Some(text(field).await?),
            "model" => model = Some(text(field).await?),
            "split" => split = Some(text(field).await?),
            _ => {}
        }
    }

    let request = ParseRequest::from_parts(document, document_url, model, split)?;
    let output = state.parser.parse(request).await?;
    Ok(Json(output))
}

async fn ade_extract(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ProxyError> {
    let mut multipart = multipart.map_err(rejected)?;

    let mut markdown = None;
    let mut markdown_url = None;
    let mut schema = None;
    let mut model = None;

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "markdown" => markdown = Some(text(field).await?),
            "markdown_url" => markdown_url = Some(text(field).await?),
            "schema" => schema = Some(text(field).await?),
            "model" => model = Some(text(field).await?),
            _ => {}
        }
    }

    let request = ExtractRequest::from_parts(markdown, markdown_url, schema, model)?;
    let output = state.extractor.extract(request).await?;
    Ok(Json(output))
}

async fn text(field: Field<'_>) -> Result<String, ProxyError> {
    field.text().await.map_err(malformed)
}

fn rejected(err: MultipartRejection) -> ProxyError {
    ProxyError::invalid_input(format!("expected a multipart form: {err}"))
}

fn malformed(err: MultipartError) -> ProxyError {
    ProxyError::invalid_input(format!("invalid multipart payload: {err}"))
}
