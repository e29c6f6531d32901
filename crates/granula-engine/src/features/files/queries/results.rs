//! Get file results query
//!
//! Pages through the result rows of a file in chunk ordinal, then row order.

use granula_common::types::ResultsPage;
use mediator::Request;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::features::shared::PaginationParams;
use crate::ingest::ChunkEngine;

/// Query to get a page of result rows for a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileResultsQuery {
    pub file_id: Uuid,
    #[serde(flatten)]
    pub pagination: PaginationParams,
}

impl GetFileResultsQuery {
    pub fn new(file_id: Uuid, limit: Option<u32>, offset: Option<u64>) -> Self {
        Self {
            file_id,
            pagination: PaginationParams::new(limit, offset),
        }
    }
}

impl Request<EngineResult<ResultsPage>> for GetFileResultsQuery {}

#[tracing::instrument(skip(engine, query), fields(file_id = %query.file_id))]
pub async fn handle(engine: &ChunkEngine, query: GetFileResultsQuery) -> EngineResult<ResultsPage> {
    let limit = query.pagination.limit();
    let offset = query.pagination.offset();

    let page = engine.results(query.file_id, limit, offset).await?;
    tracing::debug!(returned = page.items.len(), total = page.total, "Results fetched");
    Ok(page)
}
