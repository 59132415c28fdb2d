use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::{
    pipeline::{FileProjection, FileStage},
    storage::{Document, Extraction},
};

#[derive(Serialize, TS)]
#[ts(export)]
pub struct UploadResponse {
    pub files: Vec<FileProjection>,
    #[ts(type = "number")]
    pub completed: usize,
    #[ts(type = "number")]
    pub failed: usize,
}

impl UploadResponse {
    pub fn from_files(files: Vec<FileProjection>) -> Self {
        let completed = files
            .iter()
            .filter(|file| file.status == FileStage::Completed)
            .count();
        let failed = files
            .iter()
            .filter(|file| file.status == FileStage::Failed)
            .count();
        Self {
            files,
            completed,
            failed,
        }
    }
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct DocumentListResponse {
    pub documents: Vec<Document>,
    #[ts(type = "Record<string, number>")]
    pub status_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct ExtractionBody {
    #[serde(default)]
    #[ts(type = "unknown")]
    pub schema: Value,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct ExtractionListResponse {
    pub document_id: String,
    pub extractions: Vec<Extraction>,
}
