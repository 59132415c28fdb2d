pub mod board;
pub mod extraction;
pub mod orchestrator;
pub mod stage;
pub mod status_service;

pub use board::ProjectionBoard;
pub use extraction::{ExtractionError, ExtractionService};
pub use orchestrator::{FileSubmission, IngestSession, Orchestrator};
pub use stage::{FailureReason, FileEvent, FileProjection, FileStage};
pub use status_service::{DocumentStatusService, ParsedArtifacts, PersistenceError};
