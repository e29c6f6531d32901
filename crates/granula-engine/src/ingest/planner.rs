//! Chunk planner
//!
//! Splits a file's logical size into contiguous row ranges, persists the file
//! with one `queued` chunk per range, then enqueues the chunks in ordinal order.

use chrono::Utc;
use granula_common::types::{ChunkRecord, FileRecord, MAX_PRIORITY, MIN_PRIORITY};
use std::sync::Arc;
use uuid::Uuid;

use super::queue::{ChunkRef, PriorityTaskQueue};
use crate::error::{EngineError, EngineResult};
use crate::store::ChunkStore;

/// Everything needed to plan one accepted upload
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub file_id: Uuid,
    pub filename: String,
    pub source_path: String,
    /// Data rows in the file
    pub logical_size: u64,
    /// Rows per chunk
    pub chunk_size: u64,
    pub priority: i32,
    /// Byte position of each chunk's first row, in ordinal order; empty when unknown
    pub byte_offsets: Vec<u64>,
}

/// Split `[0, logical_size)` into ranges of `chunk_size` rows
///
/// The last range absorbs the remainder. An empty file yields no ranges.
pub fn partition(logical_size: u64, chunk_size: u64) -> EngineResult<Vec<(u64, u64)>> {
    if chunk_size == 0 {
        return Err(EngineError::InvalidInput(
            "chunk size must be greater than 0".into(),
        ));
    }

    let count = logical_size.div_ceil(chunk_size);
    if count > u64::from(u32::MAX) {
        return Err(EngineError::InvalidInput(format!(
            "{} rows with chunk size {} produce too many chunks",
            logical_size, chunk_size
        )));
    }

    Ok((0..count)
        .map(|i| {
            let start = i * chunk_size;
            (start, (start + chunk_size).min(logical_size))
        })
        .collect())
}

pub struct ChunkPlanner {
    store: Arc<dyn ChunkStore>,
    queue: Arc<PriorityTaskQueue>,
}

impl ChunkPlanner {
    pub fn new(store: Arc<dyn ChunkStore>, queue: Arc<PriorityTaskQueue>) -> Self {
        Self { store, queue }
    }

    /// Persist the file and its chunks, then enqueue every chunk
    ///
    /// Returns the chunk count. Nothing is persisted when the request is rejected.
    #[tracing::instrument(skip(self, request), fields(file_id = %request.file_id))]
    pub async fn plan(&self, request: PlanRequest) -> EngineResult<u32> {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&request.priority) {
            return Err(EngineError::InvalidInput(format!(
                "priority {} outside {}..={}",
                request.priority, MIN_PRIORITY, MAX_PRIORITY
            )));
        }
        if self.queue.is_closed() {
            return Err(EngineError::QueueClosed);
        }

        let ranges = partition(request.logical_size, request.chunk_size)?;
        if !request.byte_offsets.is_empty() && request.byte_offsets.len() != ranges.len() {
            return Err(EngineError::InvalidInput(format!(
                "{} byte offsets for {} chunks",
                request.byte_offsets.len(),
                ranges.len()
            )));
        }

        let chunks: Vec<ChunkRecord> = ranges
            .iter()
            .zip(0u32..)
            .map(|(&(start, end), ordinal)| {
                let chunk = ChunkRecord::queued(request.file_id, ordinal, start, end);
                match request.byte_offsets.get(ordinal as usize) {
                    Some(&offset) => chunk.with_byte_offset(offset),
                    None => chunk,
                }
            })
            .collect();
        let total_chunks = chunks.len() as u32;

        let file = FileRecord {
            id: request.file_id,
            filename: request.filename,
            source_path: request.source_path,
            total_chunks,
            priority: request.priority,
            created_at: Utc::now(),
        };

        self.store.create_file_with_chunks(&file, &chunks).await?;

        for chunk in &chunks {
            let chunk_ref = ChunkRef {
                chunk_id: chunk.id,
                file_id: chunk.file_id,
                ordinal: chunk.ordinal,
            };
            if let Err(e) = self.queue.enqueue(chunk_ref, file.priority) {
                // Persisted as queued; recovery picks these up on the next start
                tracing::warn!(
                    chunk_id = %chunk.id,
                    error = %e,
                    "Chunk persisted but not enqueued"
                );
            }
        }

        tracing::info!(
            filename = %file.filename,
            rows = request.logical_size,
            chunks = total_chunks,
            priority = file.priority,
            "File planned"
        );

        Ok(total_chunks)
    }
}
