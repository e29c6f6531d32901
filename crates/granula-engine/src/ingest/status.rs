//! Status aggregation
//!
//! File status is never stored. It is derived on every read from a live count
//! of the file's chunk states.

use granula_common::types::{ChunkCounts, FileStatus, StatusView};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::store::ChunkStore;

/// Derive the overall file status from chunk counts
///
/// Precedence: all completed, then all terminal with a failure, then nothing
/// started yet, otherwise processing. A file without chunks is completed.
pub fn derive_status(counts: &ChunkCounts) -> FileStatus {
    let total = counts.total();
    if counts.completed == total {
        FileStatus::Completed
    } else if counts.terminal() == total {
        FileStatus::CompletedWithErrors
    } else if counts.started() == 0 {
        FileStatus::Queued
    } else {
        FileStatus::Processing
    }
}

/// `100 * terminal / total`, rounded to two decimals; 100 for a file without chunks
pub fn progress_percent(counts: &ChunkCounts) -> f64 {
    let total = counts.total();
    if total == 0 {
        return 100.0;
    }
    let raw = 100.0 * f64::from(counts.terminal()) / f64::from(total);
    (raw * 100.0).round() / 100.0
}

pub fn status_view(file_id: Uuid, counts: &ChunkCounts) -> StatusView {
    StatusView {
        file_id,
        status: derive_status(counts),
        total_chunks: counts.total(),
        processed_chunks: counts.completed,
        failed_chunks: counts.failed,
        progress_percent: progress_percent(counts),
    }
}

/// Read-only status queries against the store
#[derive(Clone)]
pub struct StatusAggregator {
    store: Arc<dyn ChunkStore>,
}

impl StatusAggregator {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self { store }
    }

    pub async fn status(&self, file_id: Uuid) -> EngineResult<StatusView> {
        let file = self
            .store
            .get_file(file_id)
            .await?
            .ok_or(EngineError::FileNotFound(file_id))?;

        let counts = self.store.chunk_counts(file.id).await?;
        if counts.total() != file.total_chunks {
            tracing::warn!(
                file_id = %file_id,
                expected = file.total_chunks,
                found = counts.total(),
                "Chunk count does not match the planned total"
            );
        }

        Ok(status_view(file_id, &counts))
    }
}
