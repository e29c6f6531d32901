//! Persistent store contract
//!
//! The engine reads and writes file, chunk and result state only through
//! [`ChunkStore`]. The store, not the in-memory queue, is the durable source
//! of truth; the queue can always be rebuilt from [`ChunkStore::pending_chunks`].
//!
//! Implementations:
//! - [`MemoryChunkStore`]: process-local state behind a tokio `RwLock`
//! - [`PgChunkStore`]: PostgreSQL via `sqlx`

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use granula_common::types::{ChunkCounts, ChunkRecord, ChunkStatus, FileRecord, ResultRow};
use uuid::Uuid;

use crate::error::EngineResult;

pub use memory::MemoryChunkStore;
pub use postgres::PgChunkStore;

/// A `queued` chunk together with the priority of its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChunk {
    pub chunk_id: Uuid,
    pub file_id: Uuid,
    pub ordinal: u32,
    pub priority: i32,
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Persist a file and all of its `queued` chunks in one atomic write
    async fn create_file_with_chunks(
        &self,
        file: &FileRecord,
        chunks: &[ChunkRecord],
    ) -> EngineResult<()>;

    async fn get_file(&self, file_id: Uuid) -> EngineResult<Option<FileRecord>>;

    async fn get_chunk(&self, chunk_id: Uuid) -> EngineResult<Option<ChunkRecord>>;

    /// Move a chunk from `queued` to `processing`
    ///
    /// Returns `None` when the chunk is not `queued`, which makes a stale or
    /// duplicate task harmless.
    async fn claim_chunk(&self, chunk_id: Uuid) -> EngineResult<Option<ChunkRecord>>;

    /// Replace the chunk's result rows and mark it `completed`, atomically
    ///
    /// Fails with `ChunkNotFound` if the chunk is not currently `processing`.
    async fn complete_chunk(&self, chunk_id: Uuid, rows: Vec<ResultRow>) -> EngineResult<()>;

    /// Record a failed execution and move the chunk out of `processing`
    ///
    /// `next` is `Queued` on the retry path and `Failed` once retries are
    /// exhausted. Fails with `ChunkNotFound` if the chunk is not `processing`.
    async fn record_failure(
        &self,
        chunk_id: Uuid,
        attempts: u32,
        error: &str,
        next: ChunkStatus,
    ) -> EngineResult<()>;

    /// Live per-state chunk counts for a file
    async fn chunk_counts(&self, file_id: Uuid) -> EngineResult<ChunkCounts>;

    /// Result rows ordered by chunk ordinal then row index, with the total count
    async fn list_results(
        &self,
        file_id: Uuid,
        limit: u32,
        offset: u64,
    ) -> EngineResult<(Vec<ResultRow>, u64)>;

    /// Move every `processing` chunk back to `queued`, keeping its attempt count
    async fn reset_in_flight(&self) -> EngineResult<u64>;

    /// Every `queued` chunk, in (priority desc, file created asc, ordinal asc) order
    async fn pending_chunks(&self) -> EngineResult<Vec<PendingChunk>>;

    /// All files, oldest first
    async fn list_files(&self) -> EngineResult<Vec<FileRecord>>;
}
