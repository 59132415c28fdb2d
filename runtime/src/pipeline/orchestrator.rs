use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    board::ProjectionBoard,
    stage::{FileEvent, FileProjection},
    status_service::{DocumentStatusService, ParsedArtifacts},
};
use crate::{
    config::IngestConfig,
    proxy::{DocumentSource, ParseRequest, ParseService, ProxyError},
    storage::{DocumentStore, NewDocument},
};

/// One file handed to the pipeline by the submitting client.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSubmission {
    pub name: String,
    pub size: u64,
    pub source: DocumentSource,
}

impl FileSubmission {
    pub fn upload(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        Self {
            size: bytes.len() as u64,
            source: DocumentSource::Upload {
                filename: name.clone(),
                bytes,
            },
            name,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: name_from_url(&url),
            size: 0,
            source: DocumentSource::Url(url),
        }
    }

    fn new_document(&self) -> NewDocument {
        let file_url = match &self.source {
            DocumentSource::Url(url) => Some(url.clone()),
            DocumentSource::Upload { .. } => None,
        };
        NewDocument::named(self.name.clone()).with_file_url(file_url)
    }

    /// Checks the submission the same way the parse proxy checks caller input.
    fn into_request(self, config: &IngestConfig) -> Result<ParseRequest, ProxyError> {
        let (document, document_url) = match self.source {
            DocumentSource::Upload { filename, bytes } => (Some((filename, bytes)), None),
            DocumentSource::Url(url) => (None, Some(url)),
        };
        ParseRequest::from_parts(
            document,
            document_url,
            config.parse_model.clone(),
            config.split.clone(),
        )
    }
}

fn name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.rfind(|segment| !segment.is_empty()))
                .map(str::to_string)
        })
        .unwrap_or_else(|| url.to_string())
}

/// Drives each submitted file through record creation, parsing and
/// persistence. Holds no per-session state; see [`IngestSession`].
pub struct Orchestrator {
    status: DocumentStatusService,
    parser: Arc<dyn ParseService>,
    config: IngestConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        parser: Arc<dyn ParseService>,
        config: IngestConfig,
    ) -> Self {
        Self {
            status: DocumentStatusService::new(store),
            parser,
            config,
        }
    }

    pub fn session(self: &Arc<Self>) -> IngestSession {
        IngestSession {
            orchestrator: Arc::clone(self),
            board: ProjectionBoard::new(),
        }
    }

    async fn run_file(
        &self,
        board: &ProjectionBoard,
        mut projection: FileProjection,
        file: FileSubmission,
    ) -> FileProjection {
        let new_document = file.new_document();
        let name = file.name.clone();
        let request = match file.into_request(&self.config) {
            Ok(request) => request,
            Err(err) => {
                warn!(file = %name, error = %err, "submission rejected");
                advance(board, &mut projection, FileEvent::Rejected(err.to_string()));
                return projection;
            }
        };

        let document = match self.status.open(new_document).await {
            Ok(document) => document,
            Err(err) => {
                error!(file = %name, error = %err, "record creation failed");
                advance(
                    board,
                    &mut projection,
                    FileEvent::RecordCreationFailed(err.to_string()),
                );
                return projection;
            }
        };
        advance(
            board,
            &mut projection,
            FileEvent::RecordCreated {
                document_id: document.id.clone(),
            },
        );

        let deadline = self.config.parse_deadline();
        let parsed = match timeout(deadline, self.parser.parse(request)).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                warn!(document_id = %document.id, kind = err.kind(), error = %err, "parse failed");
                let event = FileEvent::ParseFailed(err.to_string());
                return self.fail(board, projection, &document.id, event).await;
            }
            Err(_) => {
                warn!(
                    document_id = %document.id,
                    deadline_secs = deadline.as_secs(),
                    "parse deadline elapsed"
                );
                let event = FileEvent::ParseTimedOut(format!(
                    "parse did not finish within {}s",
                    deadline.as_secs()
                ));
                return self.fail(board, projection, &document.id, event).await;
            }
        };

        let artifacts = ParsedArtifacts::from_provider(parsed);
        match self.status.mark_completed(&document.id, artifacts).await {
            Ok(_) => {
                advance(board, &mut projection, FileEvent::Persisted);
                projection
            }
            Err(err) => {
                error!(document_id = %document.id, error = %err, "failed to persist parse result");
                self.fail(
                    board,
                    projection,
                    &document.id,
                    FileEvent::PersistenceFailed(err.to_string()),
                )
                .await
            }
        }
    }

    async fn fail(
        &self,
        board: &ProjectionBoard,
        mut projection: FileProjection,
        document_id: &str,
        event: FileEvent,
    ) -> FileProjection {
        advance(board, &mut projection, event);
        self.status.mark_failed(document_id).await;
        projection
    }
}

fn advance(board: &ProjectionBoard, projection: &mut FileProjection, event: FileEvent) {
    *projection = projection.apply(&event);
    board.apply(&projection.id, &event);
}

/// One submitting client's view: a board of projections plus the entry
/// points that feed it. Dropping the session discards the projections.
pub struct IngestSession {
    orchestrator: Arc<Orchestrator>,
    board: ProjectionBoard,
}

impl IngestSession {
    pub fn board(&self) -> &ProjectionBoard {
        &self.board
    }

    pub async fn submit(&self, file: FileSubmission) -> FileProjection {
        let projection = self.register(&file);
        self.orchestrator.run_file(&self.board, projection, file).await
    }

    /// Runs every file to a terminal stage. Files are independent; results
    /// come back in submission order.
    pub async fn submit_batch(&self, files: Vec<FileSubmission>) -> Vec<FileProjection> {
        let jobs: Vec<(FileProjection, FileSubmission)> = files
            .into_iter()
            .map(|file| (self.register(&file), file))
            .collect();

        info!(files = jobs.len(), "ingesting batch");
        let orchestrator = &self.orchestrator;
        let board = &self.board;
        stream::iter(jobs)
            .map(|(projection, file)| orchestrator.run_file(board, projection, file))
            .buffered(orchestrator.config.max_parallel())
            .collect()
            .await
    }

    fn register(&self, file: &FileSubmission) -> FileProjection {
        let projection =
            FileProjection::uploading(Uuid::new_v4().to_string(), &file.name, file.size);
        self.board.register(projection.clone());
        projection
    }
}
