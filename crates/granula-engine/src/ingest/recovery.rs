//! Startup recovery
//!
//! The queue is not durable. After a restart every chunk the store still holds
//! as `processing` or `queued` must be put back on the queue, otherwise its
//! file never reaches a terminal status.

use serde::{Deserialize, Serialize};

use super::queue::{ChunkRef, PriorityTaskQueue};
use crate::error::EngineResult;
use crate::store::ChunkStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Chunks moved from `processing` back to `queued`
    pub reset: u64,
    /// Chunks put back on the queue
    pub requeued: u64,
}

/// Reset in-flight chunks and rebuild the queue from the store
///
/// Chunks are enqueued by file priority (highest first), then file age, then
/// ordinal, so dispatch order matches what an uninterrupted run would have
/// produced. Attempt counts are kept. Run this before workers start.
pub async fn recover(store: &dyn ChunkStore, queue: &PriorityTaskQueue) -> EngineResult<RecoveryReport> {
    let reset = store.reset_in_flight().await?;

    let pending = store.pending_chunks().await?;
    let mut requeued = 0;
    for chunk in pending {
        queue.enqueue(
            ChunkRef {
                chunk_id: chunk.chunk_id,
                file_id: chunk.file_id,
                ordinal: chunk.ordinal,
            },
            chunk.priority,
        )?;
        requeued += 1;
    }

    tracing::info!(reset, requeued, "Recovery completed");

    Ok(RecoveryReport { reset, requeued })
}
