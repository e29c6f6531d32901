//! Engine error types

use std::time::Duration;
use uuid::Uuid;

/// Errors surfaced by the chunk engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Caller-supplied data was rejected before anything was persisted
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A single chunk execution failed; the retry controller decides what happens next
    #[error("Chunk processing failed: {0}")]
    TransientChunk(String),

    /// A chunk failed on every allowed attempt and is now `failed`
    #[error("Chunk {chunk_id} failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        chunk_id: Uuid,
        attempts: u32,
        last_error: String,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("File not found: {0}")]
    FileNotFound(Uuid),

    #[error("Chunk not found: {0}")]
    ChunkNotFound(Uuid),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The scheduler was shut down while work was still pending
    #[error("Queue closed")]
    QueueClosed,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl EngineError {
    /// Whether another attempt at the same chunk may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::TransientChunk(_)
                | EngineError::StoreUnavailable(_)
                | EngineError::Io(_)
                | EngineError::Csv(_)
        )
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::StoreUnavailable(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for EngineError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        EngineError::StoreUnavailable(format!("migration failed: {}", err))
    }
}

impl From<granula_common::GranulaError> for EngineError {
    fn from(err: granula_common::GranulaError) -> Self {
        EngineError::InvalidInput(err.to_string())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EngineError::TransientChunk("boom".into()).is_retryable());
        assert!(EngineError::StoreUnavailable("down".into()).is_retryable());
        assert!(!EngineError::InvalidInput("bad".into()).is_retryable());
        assert!(!EngineError::FileNotFound(Uuid::nil()).is_retryable());
        assert!(!EngineError::QueueClosed.is_retryable());
    }

    #[test]
    fn test_exhausted_message_names_chunk() {
        let id = Uuid::new_v4();
        let err = EngineError::ExhaustedRetries {
            chunk_id: id,
            attempts: 4,
            last_error: "parse error".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains("4 attempts"));
    }
}
