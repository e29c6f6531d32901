//! In-memory chunk store
//!
//! Used by the `process` CLI mode and by tests. All state lives behind one
//! tokio `RwLock`, so every trait operation is atomic with respect to the others.

use async_trait::async_trait;
use chrono::Utc;
use granula_common::types::{ChunkCounts, ChunkRecord, ChunkStatus, FileRecord, ResultRow};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ChunkStore, PendingChunk};
use crate::error::{EngineError, EngineResult};

#[derive(Default)]
struct MemoryState {
    files: HashMap<Uuid, FileRecord>,
    chunks: HashMap<Uuid, ChunkRecord>,
    /// Chunk ids per file, in ordinal order
    file_chunks: HashMap<Uuid, Vec<Uuid>>,
    /// Result rows keyed by producing chunk
    results: HashMap<Uuid, Vec<ResultRow>>,
}

impl MemoryState {
    fn processing_chunk_mut(&mut self, chunk_id: Uuid) -> EngineResult<&mut ChunkRecord> {
        match self.chunks.get_mut(&chunk_id) {
            Some(chunk) if chunk.status == ChunkStatus::Processing => Ok(chunk),
            _ => Err(EngineError::ChunkNotFound(chunk_id)),
        }
    }
}

#[derive(Default)]
pub struct MemoryChunkStore {
    state: RwLock<MemoryState>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn create_file_with_chunks(
        &self,
        file: &FileRecord,
        chunks: &[ChunkRecord],
    ) -> EngineResult<()> {
        let mut state = self.state.write().await;
        if state.files.contains_key(&file.id) {
            return Err(EngineError::InvalidInput(format!(
                "file {} already exists",
                file.id
            )));
        }

        let mut ordered: Vec<&ChunkRecord> = chunks.iter().collect();
        ordered.sort_by_key(|c| c.ordinal);

        state
            .file_chunks
            .insert(file.id, ordered.iter().map(|c| c.id).collect());
        for chunk in ordered {
            state.chunks.insert(chunk.id, chunk.clone());
        }
        state.files.insert(file.id, file.clone());
        Ok(())
    }

    async fn get_file(&self, file_id: Uuid) -> EngineResult<Option<FileRecord>> {
        Ok(self.state.read().await.files.get(&file_id).cloned())
    }

    async fn get_chunk(&self, chunk_id: Uuid) -> EngineResult<Option<ChunkRecord>> {
        Ok(self.state.read().await.chunks.get(&chunk_id).cloned())
    }

    async fn claim_chunk(&self, chunk_id: Uuid) -> EngineResult<Option<ChunkRecord>> {
        let mut state = self.state.write().await;
        match state.chunks.get_mut(&chunk_id) {
            Some(chunk) if chunk.status == ChunkStatus::Queued => {
                chunk.status = ChunkStatus::Processing;
                chunk.updated_at = Utc::now();
                Ok(Some(chunk.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn complete_chunk(&self, chunk_id: Uuid, rows: Vec<ResultRow>) -> EngineResult<()> {
        let mut state = self.state.write().await;
        let chunk = state.processing_chunk_mut(chunk_id)?;
        chunk.status = ChunkStatus::Completed;
        chunk.updated_at = Utc::now();
        state.results.insert(chunk_id, rows);
        Ok(())
    }

    async fn record_failure(
        &self,
        chunk_id: Uuid,
        attempts: u32,
        error: &str,
        next: ChunkStatus,
    ) -> EngineResult<()> {
        let mut state = self.state.write().await;
        let chunk = state.processing_chunk_mut(chunk_id)?;
        chunk.status = next;
        chunk.attempts = attempts;
        chunk.last_error = Some(error.to_string());
        chunk.updated_at = Utc::now();
        Ok(())
    }

    async fn chunk_counts(&self, file_id: Uuid) -> EngineResult<ChunkCounts> {
        let state = self.state.read().await;
        let ids = state
            .file_chunks
            .get(&file_id)
            .ok_or(EngineError::FileNotFound(file_id))?;

        let mut counts = ChunkCounts::default();
        for chunk in ids.iter().filter_map(|id| state.chunks.get(id)) {
            match chunk.status {
                ChunkStatus::Queued => {
                    counts.queued += 1;
                    if chunk.attempts > 0 {
                        counts.retrying += 1;
                    }
                }
                ChunkStatus::Processing => counts.processing += 1,
                ChunkStatus::Completed => counts.completed += 1,
                ChunkStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn list_results(
        &self,
        file_id: Uuid,
        limit: u32,
        offset: u64,
    ) -> EngineResult<(Vec<ResultRow>, u64)> {
        let state = self.state.read().await;
        let ids = state
            .file_chunks
            .get(&file_id)
            .ok_or(EngineError::FileNotFound(file_id))?;

        // file_chunks is already in ordinal order; rows within a chunk keep row order
        let mut rows: Vec<&ResultRow> = ids
            .iter()
            .filter_map(|id| state.results.get(id))
            .flatten()
            .collect();
        rows.sort_by_key(|r| (r.ordinal, r.row_index));

        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn reset_in_flight(&self) -> EngineResult<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut reset = 0;
        for chunk in state.chunks.values_mut() {
            if chunk.status == ChunkStatus::Processing {
                chunk.status = ChunkStatus::Queued;
                chunk.updated_at = now;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn pending_chunks(&self) -> EngineResult<Vec<PendingChunk>> {
        let state = self.state.read().await;
        let mut files: Vec<&FileRecord> = state.files.values().collect();
        files.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });

        let mut pending = Vec::new();
        for file in files {
            let Some(ids) = state.file_chunks.get(&file.id) else {
                continue;
            };
            for chunk in ids.iter().filter_map(|id| state.chunks.get(id)) {
                if chunk.status == ChunkStatus::Queued {
                    pending.push(PendingChunk {
                        chunk_id: chunk.id,
                        file_id: file.id,
                        ordinal: chunk.ordinal,
                        priority: file.priority,
                    });
                }
            }
        }
        Ok(pending)
    }

    async fn list_files(&self) -> EngineResult<Vec<FileRecord>> {
        let state = self.state.read().await;
        let mut files: Vec<FileRecord> = state.files.values().cloned().collect();
        files.sort_by_key(|f| f.created_at);
        Ok(files)
    }
}
