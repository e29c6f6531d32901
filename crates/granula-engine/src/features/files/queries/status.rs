//! Get file status query
//!
//! Returns the live, derived progress of one file.

use granula_common::types::StatusView;
use mediator::Request;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::ingest::ChunkEngine;

/// Query to get the status of a file by ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileStatusQuery {
    pub file_id: Uuid,
}

impl Request<EngineResult<StatusView>> for GetFileStatusQuery {}

pub async fn handle(engine: &ChunkEngine, query: GetFileStatusQuery) -> EngineResult<StatusView> {
    engine.status(query.file_id).await
}
