//! Chunk processing seam
//!
//! Implement this trait for any per-chunk transformation (CSV row extraction,
//! aggregation, enrichment, etc.)

use async_trait::async_trait;
use granula_common::types::{ChunkRecord, FileRecord};

use crate::error::EngineResult;

/// The external processing function run once per chunk attempt
#[async_trait]
pub trait ChunkProcessor: Send + Sync {
    /// Process the rows covered by `chunk`
    ///
    /// # Returns
    /// One payload per result row, in row order. Any error counts as a failed
    /// attempt and goes through the retry policy.
    async fn process(
        &self,
        file: &FileRecord,
        chunk: &ChunkRecord,
    ) -> EngineResult<Vec<serde_json::Value>>;

    /// Processor name for logging
    fn name(&self) -> &str;
}
