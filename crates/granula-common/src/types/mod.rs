//! Common types used across Granula

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GranulaError;

/// Lowest accepted submission priority.
pub const MIN_PRIORITY: i32 = 0;

/// Highest accepted submission priority.
pub const MAX_PRIORITY: i32 = 10;

/// Priority used when a submission does not carry one.
pub const DEFAULT_PRIORITY: i32 = 0;

// ============================================================================
// Status Enums
// ============================================================================

/// Chunk state machine
///
/// `queued -> processing -> completed` on success, `processing -> queued` on a
/// retryable failure and `processing -> failed` once retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Queued => "queued",
            ChunkStatus::Processing => "processing",
            ChunkStatus::Completed => "completed",
            ChunkStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChunkStatus::Completed | ChunkStatus::Failed)
    }
}

impl std::str::FromStr for ChunkStatus {
    type Err = GranulaError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "queued" => Ok(ChunkStatus::Queued),
            "processing" => Ok(ChunkStatus::Processing),
            "completed" => Ok(ChunkStatus::Completed),
            "failed" => Ok(ChunkStatus::Failed),
            other => Err(GranulaError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File-level status, always derived from the chunk states of the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Queued,
    Processing,
    Completed,
    CompletedWithErrors,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Queued => "queued",
            FileStatus::Processing => "processing",
            FileStatus::Completed => "completed",
            FileStatus::CompletedWithErrors => "completed_with_errors",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::CompletedWithErrors)
    }
}

impl std::str::FromStr for FileStatus {
    type Err = GranulaError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "queued" => Ok(FileStatus::Queued),
            "processing" => Ok(FileStatus::Processing),
            "completed" => Ok(FileStatus::Completed),
            "completed_with_errors" => Ok(FileStatus::CompletedWithErrors),
            other => Err(GranulaError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Persistent Records
// ============================================================================

/// One uploaded artifact.
///
/// Created together with its chunks once the chunk count is known and never
/// written again afterwards; the file status is derived on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique identifier for the file
    pub id: Uuid,

    /// Sanitised original filename
    pub filename: String,

    /// Location of the uploaded bytes, read by the chunk processor
    pub source_path: String,

    /// Number of chunks the planner produced
    pub total_chunks: u32,

    /// Submission priority, higher is served first
    pub priority: i32,

    pub created_at: DateTime<Utc>,
}

/// One independently schedulable unit of work.
///
/// Covers the data rows `[start_row, end_row)` of its file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: Uuid,
    pub file_id: Uuid,

    /// 0-based position of the chunk within its file
    pub ordinal: u32,

    /// First row covered (inclusive)
    pub start_row: u64,

    /// Row after the last one covered (exclusive)
    pub end_row: u64,

    /// Byte position of `start_row` in the source, when the planner knows it
    #[serde(default)]
    pub byte_offset: Option<u64>,

    pub status: ChunkStatus,

    /// Failed executions so far
    pub attempts: u32,

    /// Error of the most recent failed execution
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChunkRecord {
    /// Create a fresh `queued` chunk descriptor
    pub fn queued(file_id: Uuid, ordinal: u32, start_row: u64, end_row: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            file_id,
            ordinal,
            start_row,
            end_row,
            byte_offset: None,
            status: ChunkStatus::Queued,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_byte_offset(mut self, offset: u64) -> Self {
        self.byte_offset = Some(offset);
        self
    }

    pub fn row_count(&self) -> u64 {
        self.end_row.saturating_sub(self.start_row)
    }
}

/// Output of one successfully processed chunk row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: Uuid,
    pub file_id: Uuid,
    pub chunk_id: Uuid,

    /// Ordinal of the producing chunk
    pub ordinal: u32,

    /// Position of the row within the producing chunk
    pub row_index: u32,

    /// Ordered field values (or any structured aggregate)
    pub payload: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

impl ResultRow {
    pub fn new(chunk: &ChunkRecord, row_index: u32, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_id: chunk.file_id,
            chunk_id: chunk.id,
            ordinal: chunk.ordinal,
            row_index,
            payload,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Aggregates and Views
// ============================================================================

/// Live per-state chunk counts for one file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkCounts {
    /// Chunks in `queued`, including ones waiting for a retry
    pub queued: u32,
    /// Subset of `queued` that already failed at least once
    pub retrying: u32,
    pub processing: u32,
    pub completed: u32,
    pub failed: u32,
}

impl ChunkCounts {
    pub fn total(&self) -> u32 {
        self.queued + self.processing + self.completed + self.failed
    }

    pub fn terminal(&self) -> u32 {
        self.completed + self.failed
    }

    /// Chunks that have been dispatched at least once
    pub fn started(&self) -> u32 {
        self.processing + self.completed + self.failed + self.retrying
    }
}

/// File progress as returned by the status query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub file_id: Uuid,
    pub status: FileStatus,
    pub total_chunks: u32,
    pub processed_chunks: u32,
    pub failed_chunks: u32,
    pub progress_percent: f64,
}

/// A page of result rows for one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsPage {
    pub file_id: Uuid,
    pub items: Vec<ResultRow>,
    /// Result rows stored for the file, regardless of paging
    pub total: u64,
    pub limit: u32,
    pub offset: u64,
}

/// File listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub filename: String,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub status: StatusView,
}
