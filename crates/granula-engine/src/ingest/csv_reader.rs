//! CSV inspection and the default chunk processor

use async_trait::async_trait;
use granula_common::types::{ChunkRecord, FileRecord};
use std::path::{Path, PathBuf};

use super::processor::ChunkProcessor;
use crate::error::{EngineError, EngineResult};

/// Shape of an accepted CSV upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvSummary {
    pub columns: usize,
    pub data_rows: u64,
    /// Byte position of the first row of each `chunk_size` block
    pub chunk_offsets: Vec<u64>,
}

/// Validate a CSV file, count its data rows and locate its chunk boundaries
///
/// Requires UTF-8 content, a non-empty header row, the header's column count
/// on every data row and at least one data row. Every `chunk_size`-th row's
/// byte position is recorded so a chunk can seek straight to its first row.
pub fn inspect_csv(path: &Path, chunk_size: u64) -> EngineResult<CsvSummary> {
    if chunk_size == 0 {
        return Err(EngineError::InvalidInput(
            "chunk size must be greater than 0".into(),
        ));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers = reader
        .headers()
        .map_err(|e| EngineError::InvalidInput(format!("unreadable header row: {}", e)))?
        .clone();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(EngineError::InvalidInput("CSV has no header row".into()));
    }

    let mut data_rows = 0u64;
    let mut chunk_offsets = Vec::new();
    let mut record = csv::StringRecord::new();
    loop {
        let position = reader.position().clone();
        let row = data_rows + 1;
        let more = reader
            .read_record(&mut record)
            .map_err(|e| EngineError::InvalidInput(format!("row {}: {}", row, e)))?;
        if !more {
            break;
        }
        if record.len() != headers.len() {
            return Err(EngineError::InvalidInput(format!(
                "row {} has {} columns, expected {}",
                row,
                record.len(),
                headers.len()
            )));
        }
        if data_rows % chunk_size == 0 {
            chunk_offsets.push(position.byte());
        }
        data_rows += 1;
    }

    if data_rows == 0 {
        return Err(EngineError::InvalidInput("CSV has no data rows".into()));
    }

    Ok(CsvSummary {
        columns: headers.len(),
        data_rows,
        chunk_offsets,
    })
}

/// Emits each data row of the chunk's range as a JSON array of its fields
#[derive(Debug, Clone, Default)]
pub struct CsvChunkProcessor;

impl CsvChunkProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Read rows `[start, end)`, seeking to `byte_offset` when the chunk carries one
    fn read_range(
        path: &Path,
        start: u64,
        end: u64,
        byte_offset: Option<u64>,
    ) -> EngineResult<Vec<serde_json::Value>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|e| EngineError::TransientChunk(format!("cannot open {}: {}", path.display(), e)))?;

        let wanted = end.saturating_sub(start);
        let skip = match byte_offset {
            Some(byte) => {
                let mut position = csv::Position::new();
                // Record 0 is the header row
                position.set_byte(byte).set_record(start.saturating_add(1));
                reader
                    .seek(position)
                    .map_err(|e| EngineError::TransientChunk(format!("cannot seek to byte {}: {}", byte, e)))?;
                0
            }
            None => usize::try_from(start)
                .map_err(|_| EngineError::TransientChunk(format!("start row {} out of range", start)))?,
        };

        let mut payloads = Vec::new();
        for record in reader.records().skip(skip) {
            if payloads.len() as u64 == wanted {
                break;
            }
            let record = record.map_err(|e| EngineError::TransientChunk(e.to_string()))?;
            payloads.push(serde_json::Value::Array(
                record
                    .iter()
                    .map(|field| serde_json::Value::String(field.to_string()))
                    .collect(),
            ));
        }

        if (payloads.len() as u64) < wanted {
            return Err(EngineError::TransientChunk(format!(
                "rows [{}, {}) exceed the file, only {} available",
                start,
                end,
                payloads.len()
            )));
        }

        Ok(payloads)
    }
}

#[async_trait]
impl ChunkProcessor for CsvChunkProcessor {
    async fn process(
        &self,
        file: &FileRecord,
        chunk: &ChunkRecord,
    ) -> EngineResult<Vec<serde_json::Value>> {
        let path = PathBuf::from(&file.source_path);
        let (start, end, byte_offset) = (chunk.start_row, chunk.end_row, chunk.byte_offset);

        tokio::task::spawn_blocking(move || Self::read_range(&path, start, end, byte_offset))
            .await
            .map_err(|e| EngineError::TransientChunk(format!("reader task failed: {}", e)))?
    }

    fn name(&self) -> &str {
        "csv"
    }
}
