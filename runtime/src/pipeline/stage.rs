//! Per-file ingestion state machine.
//!
//! `uploading -> parsing -> {completed | failed}`. Transitions are pure: the
//! orchestrator feeds [`FileEvent`]s in as each network step settles and
//! publishes the resulting [`FileProjection`]. Terminal stages absorb every
//! later event.

use serde::Serialize;
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum FileStage {
    Uploading,
    Parsing,
    Completed,
    Failed,
}

impl FileStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, FileStage::Completed | FileStage::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum FailureReason {
    InvalidInput,
    RecordCreationFailed,
    ParseFailed,
    ParseTimeout,
    PersistenceFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Rejected(String),
    RecordCreated { document_id: String },
    RecordCreationFailed(String),
    ParseFailed(String),
    ParseTimedOut(String),
    Persisted,
    PersistenceFailed(String),
}

/// What the submitting client sees for one file. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FileProjection {
    pub id: String,
    pub name: String,
    #[ts(type = "number")]
    pub size: u64,
    pub status: FileStage,
    pub error: Option<String>,
    pub failure_reason: Option<FailureReason>,
    pub document_id: Option<String>,
}

impl FileProjection {
    pub fn uploading(id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
            status: FileStage::Uploading,
            error: None,
            failure_reason: None,
            document_id: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns the next projection; events that do not apply to the current
    /// stage leave it unchanged.
    pub fn apply(&self, event: &FileEvent) -> FileProjection {
        let mut next = self.clone();
        match (self.status, event) {
            (FileStage::Uploading, FileEvent::Rejected(error)) => {
                next.fail(FailureReason::InvalidInput, error);
            }
            (FileStage::Uploading, FileEvent::RecordCreated { document_id }) => {
                next.status = FileStage::Parsing;
                next.document_id = Some(document_id.clone());
            }
            (FileStage::Uploading, FileEvent::RecordCreationFailed(error)) => {
                next.fail(FailureReason::RecordCreationFailed, error);
            }
            (FileStage::Parsing, FileEvent::ParseFailed(error)) => {
                next.fail(FailureReason::ParseFailed, error);
            }
            (FileStage::Parsing, FileEvent::ParseTimedOut(error)) => {
                next.fail(FailureReason::ParseTimeout, error);
            }
            (FileStage::Parsing, FileEvent::PersistenceFailed(error)) => {
                next.fail(FailureReason::PersistenceFailed, error);
            }
            (FileStage::Parsing, FileEvent::Persisted) => {
                next.status = FileStage::Completed;
            }
            _ => {}
        }
        next
    }

    fn fail(&mut self, reason: FailureReason, error: &str) {
        self.status = FileStage::Failed;
        self.failure_reason = Some(reason);
        self.error = Some(error.to_string());
    }
}
