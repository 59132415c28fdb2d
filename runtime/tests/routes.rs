mod common;

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use diligence_runtime::{
    AppState,
    config::AppConfig,
    provider::{Endpoint, ProviderResponse, ProviderTransport},
    proxy::ApiKey,
    routes,
    storage::{DocumentPatch, DocumentStatus, DocumentStore, NewDocument, StoragesStatus},
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use common::{RecordingTransport, document_store, extraction_store, parsed_body, temp_working_dir};

const BOUNDARY: &str = "test-boundary";

struct Harness {
    _dir: TempDir,
    app: Router,
    state: Arc<AppState>,
    transport: Arc<RecordingTransport>,
}

async fn harness(api_key: Option<&str>) -> anyhow::Result<Harness> {
    let dir = temp_working_dir();
    let documents = document_store(&dir).await?;
    let extractions = extraction_store(&dir).await?;
    let transport = Arc::new(RecordingTransport::new(|endpoint, _| match endpoint {
        Endpoint::Parse => ProviderResponse {
            status: 200,
            body: parsed_body("# Annual report\nRevenue: 10"),
        },
        Endpoint::Extract => ProviderResponse {
            status: 200,
            body: json!({ "extraction": { "revenue": 10 }, "extraction_metadata": {} }),
        },
    }));

    let config = AppConfig::from_yaml(&format!(
        "server:\n  host: 127.0.0.1\n  port: 0\nworking_dir: {}\n",
        dir.path().display()
    ))?;
    let state = Arc::new(AppState::new(
        config,
        documents,
        extractions,
        transport.clone() as Arc<dyn ProviderTransport>,
        ApiKey::new(api_key.map(str::to_string)),
        StoragesStatus::Initialized,
    ));

    Ok(Harness {
        _dir: dir,
        app: routes::router(state.clone()),
        state,
        transport,
    })
}

fn multipart(parts: &[(&str, Option<&str>, &str)]) -> Body {
    let mut body = String::new();
    for (name, filename, value) in parts {
        body.push_str(&format!("--{BOUNDARY}\r\n"));
        match filename {
            Some(filename) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
            )),
            None => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
            )),
        }
        body.push_str(value);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    Body::from(body)
}

fn multipart_request(uri: &str, parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(multipart(parts))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn options_preflight_is_answered_with_cors_headers() -> anyhow::Result<()> {
    let h = harness(Some("test-key")).await?;

    for uri in ["/ade-parse", "/ade-extract"] {
        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri(uri)
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,apikey")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        assert!(body.is_empty());
    }
    assert_eq!(h.transport.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn plain_options_request_is_ok() -> anyhow::Result<()> {
    let h = harness(Some("test-key")).await?;
    let response = h
        .app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/ade-parse")
                .header(header::ORIGIN, "http://localhost:5173")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    Ok(())
}

#[tokio::test]
async fn parse_without_a_source_is_a_bad_request() -> anyhow::Result<()> {
    let h = harness(Some("test-key")).await?;
    let response = h
        .app
        .oneshot(multipart_request("/ade-parse", &[("model", None, "dpt-2-latest")]))
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap_or_default().contains("document"));
    assert_eq!(h.transport.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn non_multipart_body_is_a_bad_request() -> anyhow::Result<()> {
    let h = harness(Some("test-key")).await?;
    let response = h
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/ade-extract")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].is_string());
    Ok(())
}

#[tokio::test]
async fn unconfigured_server_returns_500() -> anyhow::Result<()> {
    let h = harness(None).await?;
    let response = h
        .app
        .oneshot(multipart_request(
            "/ade-parse",
            &[("document_url", None, "https://files.test/a.pdf")],
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.transport.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn parse_returns_provider_json() -> anyhow::Result<()> {
    let h = harness(Some("test-key")).await?;
    let response = h
        .app
        .oneshot(multipart_request(
            "/ade-parse",
            &[("document", Some("report.pdf"), "%PDF-1.7")],
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["markdown"], "# Annual report\nRevenue: 10");
    assert_eq!(
        h.transport.calls()[0].form.text_value("model"),
        Some("dpt-2-latest")
    );
    Ok(())
}

#[tokio::test]
async fn upload_then_extract_end_to_end() -> anyhow::Result<()> {
    let h = harness(Some("test-key")).await?;

    let response = h
        .app
        .clone()
        .oneshot(multipart_request(
            "/documents/upload",
            &[
                ("file", Some("annual.pdf"), "%PDF-1.7"),
                ("document_url", None, "https://files.test/q3.pdf"),
            ],
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let upload = json_body(response).await;
    assert_eq!(upload["completed"], 2);
    assert_eq!(upload["files"][0]["status"], "completed");
    assert_eq!(upload["files"][1]["name"], "q3.pdf");
    let document_id = upload["files"][0]["documentId"]
        .as_str()
        .expect("document id")
        .to_string();

    let response = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/documents?limit=1").body(Body::empty())?)
        .await?;
    let listing = json_body(response).await;
    assert_eq!(listing["documents"].as_array().map(Vec::len), Some(1));
    assert_eq!(listing["status_counts"]["completed"], 2);

    let schema = json!({
        "type": "object",
        "properties": { "revenue": { "type": "number" } }
    });
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/documents/{document_id}/extractions"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "schema": schema }).to_string()))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let extraction = json_body(response).await;
    assert_eq!(extraction["extraction"]["revenue"], 10);

    let extract_call = h
        .transport
        .calls()
        .into_iter()
        .find(|call| call.endpoint == Endpoint::Extract)
        .expect("extract call");
    assert_eq!(
        extract_call.form.text_value("markdown"),
        Some("# Annual report\nRevenue: 10")
    );

    let response = h
        .app
        .oneshot(
            Request::builder()
                .uri(format!("/documents/{document_id}/extractions"))
                .body(Body::empty())?,
        )
        .await?;
    let listed = json_body(response).await;
    assert_eq!(listed["extractions"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn empty_upload_fails_alone() -> anyhow::Result<()> {
    let h = harness(Some("test-key")).await?;

    let response = h
        .app
        .oneshot(multipart_request(
            "/documents/upload",
            &[
                ("file", Some("good.pdf"), "%PDF-1.7"),
                ("file", Some("empty.pdf"), ""),
                ("file", Some("also-good.pdf"), "%PDF-1.7"),
            ],
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let upload = json_body(response).await;
    assert_eq!(upload["completed"], 2);
    assert_eq!(upload["failed"], 1);
    assert_eq!(upload["files"][0]["status"], "completed");
    assert_eq!(upload["files"][1]["status"], "failed");
    assert_eq!(upload["files"][1]["failureReason"], "invalid_input");
    assert!(upload["files"][1]["documentId"].is_null());
    assert_eq!(upload["files"][2]["status"], "completed");

    assert_eq!(h.transport.call_count(), 2);
    assert_eq!(h.state.documents.get_recent(10).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn upload_without_parts_is_a_bad_request() -> anyhow::Result<()> {
    let h = harness(Some("test-key")).await?;
    let response = h
        .app
        .oneshot(multipart_request("/documents/upload", &[("note", None, "hi")]))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.transport.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn extraction_needs_a_completed_document() -> anyhow::Result<()> {
    let h = harness(Some("test-key")).await?;
    let failed = h.state.documents.create(NewDocument::named("bad.pdf")).await?;
    h.state
        .documents
        .update(&failed.id, DocumentPatch::status(DocumentStatus::Failed))
        .await?;

    let body = json!({ "schema": { "type": "object" } }).to_string();
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/documents/{}/extractions", failed.id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.clone()))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/documents/missing/extractions")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = h
        .app
        .oneshot(Request::builder().uri("/documents/missing").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(h.transport.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn health_reports_ok() -> anyhow::Result<()> {
    let h = harness(None).await?;
    let response = h
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&body[..], b"ok");
    Ok(())
}
