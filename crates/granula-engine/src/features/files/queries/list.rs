//! List files query

use granula_common::types::FileSummary;
use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::ingest::ChunkEngine;

/// Query to list every file with its derived status, oldest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListFilesQuery;

/// Response for the list files query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub files: Vec<FileSummary>,
    pub total: usize,
}

impl Request<EngineResult<ListFilesResponse>> for ListFilesQuery {}

pub async fn handle(engine: &ChunkEngine, _query: ListFilesQuery) -> EngineResult<ListFilesResponse> {
    let files = engine.list_files().await?;
    Ok(ListFilesResponse {
        total: files.len(),
        files,
    })
}
