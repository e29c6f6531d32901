//! Register upload command
//!
//! Accepts an uploaded CSV that is already on local disk: validates its
//! structure, counts data rows and hands the file to the planner.

use mediator::Request;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::features::shared::sanitize_filename;
use crate::ingest::{inspect_csv, ChunkEngine, PlanRequest};
use granula_common::types::{MAX_PRIORITY, MIN_PRIORITY};

/// Command to accept an uploaded CSV file
///
/// # Examples
///
/// ```rust,ignore
/// use granula_engine::features::files::commands::RegisterUploadCommand;
///
/// let command = RegisterUploadCommand {
///     source_path: "/var/uploads/3f1c.csv".into(),
///     filename: Some("sales.csv".to_string()),
///     priority: Some(8),
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUploadCommand {
    /// Where the uploaded bytes are stored
    pub source_path: PathBuf,

    /// Original client filename; defaults to the file name of `source_path`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// 0-10, higher is served first; defaults to the configured priority
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

/// Response from registering an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterUploadResponse {
    pub file_id: Uuid,
    pub filename: String,
    pub rows: u64,
    pub total_chunks: u32,
    pub priority: i32,
}

impl Request<EngineResult<RegisterUploadResponse>> for RegisterUploadCommand {}

impl RegisterUploadCommand {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            filename: None,
            priority: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if let Some(priority) = self.priority {
            if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
                return Err(EngineError::InvalidInput(format!(
                    "priority must be between {} and {}",
                    MIN_PRIORITY, MAX_PRIORITY
                )));
            }
        }
        Ok(())
    }

    fn display_name(&self) -> String {
        let raw = self.filename.clone().unwrap_or_else(|| {
            self.source_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.csv".to_string())
        });
        sanitize_filename(&raw)
    }
}

#[tracing::instrument(skip(engine, command), fields(path = %command.source_path.display()))]
pub async fn handle(
    engine: &ChunkEngine,
    command: RegisterUploadCommand,
) -> EngineResult<RegisterUploadResponse> {
    command.validate()?;

    let filename = command.display_name();
    let priority = command.priority.unwrap_or(engine.config().default_priority);

    let chunk_size = engine.config().chunk_size;
    let path = command.source_path.clone();
    let summary = tokio::task::spawn_blocking(move || inspect_csv(&path, chunk_size))
        .await
        .map_err(|e| EngineError::InvalidInput(format!("CSV inspection failed: {}", e)))??;

    let file_id = Uuid::new_v4();
    let total_chunks = engine
        .plan(PlanRequest {
            file_id,
            filename: filename.clone(),
            source_path: command.source_path.display().to_string(),
            logical_size: summary.data_rows,
            chunk_size,
            priority,
            byte_offsets: summary.chunk_offsets,
        })
        .await?;

    tracing::info!(
        file_id = %file_id,
        filename = %filename,
        rows = summary.data_rows,
        columns = summary.columns,
        total_chunks,
        "Upload registered"
    );

    Ok(RegisterUploadResponse {
        file_id,
        filename,
        rows: summary.data_rows,
        total_chunks,
        priority,
    })
}
