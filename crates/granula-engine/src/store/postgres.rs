//! PostgreSQL chunk store
//!
//! Claims use `UPDATE ... WHERE status = 'queued' RETURNING`, so two workers
//! can never hold the same chunk. Completion and result replacement share one
//! transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use granula_common::types::{ChunkCounts, ChunkRecord, ChunkStatus, FileRecord, ResultRow};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use super::{ChunkStore, PendingChunk};
use crate::config::DatabaseConfig;
use crate::error::{EngineError, EngineResult};

const CHUNK_COLUMNS: &str = "id, file_id, ordinal, start_row, end_row, byte_offset, status, \
                             attempts, last_error, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct FileRow {
    id: Uuid,
    filename: String,
    source_path: String,
    total_chunks: i32,
    priority: i32,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    id: Uuid,
    file_id: Uuid,
    ordinal: i32,
    start_row: i64,
    end_row: i64,
    byte_offset: Option<i64>,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ResultRowRecord {
    id: Uuid,
    file_id: Uuid,
    chunk_id: Uuid,
    ordinal: i32,
    row_index: i32,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct StatusCountRow {
    status: String,
    count: i64,
    retried: i64,
}

#[derive(sqlx::FromRow)]
struct PendingRow {
    id: Uuid,
    file_id: Uuid,
    ordinal: i32,
    priority: i32,
}

fn column<T, S>(value: S, name: &str) -> EngineResult<T>
where
    T: TryFrom<S>,
{
    T::try_from(value)
        .map_err(|_| EngineError::StoreUnavailable(format!("column '{}' out of range", name)))
}

impl TryFrom<FileRow> for FileRecord {
    type Error = EngineError;

    fn try_from(row: FileRow) -> EngineResult<Self> {
        Ok(FileRecord {
            id: row.id,
            filename: row.filename,
            source_path: row.source_path,
            total_chunks: column(row.total_chunks, "total_chunks")?,
            priority: row.priority,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<ChunkRow> for ChunkRecord {
    type Error = EngineError;

    fn try_from(row: ChunkRow) -> EngineResult<Self> {
        Ok(ChunkRecord {
            id: row.id,
            file_id: row.file_id,
            ordinal: column(row.ordinal, "ordinal")?,
            start_row: column(row.start_row, "start_row")?,
            end_row: column(row.end_row, "end_row")?,
            byte_offset: row
                .byte_offset
                .map(|offset| column(offset, "byte_offset"))
                .transpose()?,
            status: row
                .status
                .parse()
                .map_err(|e| EngineError::StoreUnavailable(format!("{}", e)))?,
            attempts: column(row.attempts, "attempts")?,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<ResultRowRecord> for ResultRow {
    type Error = EngineError;

    fn try_from(row: ResultRowRecord) -> EngineResult<Self> {
        Ok(ResultRow {
            id: row.id,
            file_id: row.file_id,
            chunk_id: row.chunk_id,
            ordinal: column(row.ordinal, "ordinal")?,
            row_index: column(row.row_index, "row_index")?,
            payload: row.payload,
            created_at: row.created_at,
        })
    }
}

/// Chunk store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgChunkStore {
    pool: PgPool,
}

impl PgChunkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> EngineResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "Database connection pool established"
        );

        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> EngineResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn require_file(&self, file_id: Uuid) -> EngineResult<()> {
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM files WHERE id = $1")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;

        exists
            .map(|_| ())
            .ok_or(EngineError::FileNotFound(file_id))
    }
}

#[async_trait]
impl ChunkStore for PgChunkStore {
    async fn create_file_with_chunks(
        &self,
        file: &FileRecord,
        chunks: &[ChunkRecord],
    ) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO files (id, filename, source_path, total_chunks, priority, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(file.id)
        .bind(&file.filename)
        .bind(&file.source_path)
        .bind(column::<i32, _>(file.total_chunks, "total_chunks")?)
        .bind(file.priority)
        .bind(file.created_at)
        .execute(&mut *tx)
        .await?;

        if !chunks.is_empty() {
            let mut ids = Vec::with_capacity(chunks.len());
            let mut ordinals = Vec::with_capacity(chunks.len());
            let mut starts = Vec::with_capacity(chunks.len());
            let mut ends = Vec::with_capacity(chunks.len());
            let mut offsets = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                ids.push(chunk.id);
                ordinals.push(column::<i32, _>(chunk.ordinal, "ordinal")?);
                starts.push(column::<i64, _>(chunk.start_row, "start_row")?);
                ends.push(column::<i64, _>(chunk.end_row, "end_row")?);
                offsets.push(
                    chunk
                        .byte_offset
                        .map(|offset| column::<i64, _>(offset, "byte_offset"))
                        .transpose()?,
                );
            }

            sqlx::query(
                r#"
                INSERT INTO chunks
                    (id, file_id, ordinal, start_row, end_row, byte_offset, status, attempts)
                SELECT c.id, $2, c.ordinal, c.start_row, c.end_row, c.byte_offset, 'queued', 0
                FROM UNNEST($1::uuid[], $3::int[], $4::bigint[], $5::bigint[], $6::bigint[])
                    AS c(id, ordinal, start_row, end_row, byte_offset)
                "#,
            )
            .bind(&ids)
            .bind(file.id)
            .bind(&ordinals)
            .bind(&starts)
            .bind(&ends)
            .bind(&offsets)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_file(&self, file_id: Uuid) -> EngineResult<Option<FileRecord>> {
        sqlx::query_as::<_, FileRow>(
            r#"
            SELECT id, filename, source_path, total_chunks, priority, created_at
            FROM files
            WHERE id = $1
            "#,
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?
        .map(FileRecord::try_from)
        .transpose()
    }

    async fn get_chunk(&self, chunk_id: Uuid) -> EngineResult<Option<ChunkRecord>> {
        sqlx::query_as::<_, ChunkRow>(&format!(
            "SELECT {} FROM chunks WHERE id = $1",
            CHUNK_COLUMNS
        ))
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?
        .map(ChunkRecord::try_from)
        .transpose()
    }

    async fn claim_chunk(&self, chunk_id: Uuid) -> EngineResult<Option<ChunkRecord>> {
        sqlx::query_as::<_, ChunkRow>(&format!(
            r#"
            UPDATE chunks
            SET status = 'processing', updated_at = NOW()
            WHERE id = $1 AND status = 'queued'
            RETURNING {}
            "#,
            CHUNK_COLUMNS
        ))
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?
        .map(ChunkRecord::try_from)
        .transpose()
    }

    async fn complete_chunk(&self, chunk_id: Uuid, rows: Vec<ResultRow>) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;

        let updated: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE chunks
            SET status = 'completed', updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING id
            "#,
        )
        .bind(chunk_id)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            tx.rollback().await?;
            return Err(EngineError::ChunkNotFound(chunk_id));
        }

        sqlx::query("DELETE FROM result_rows WHERE chunk_id = $1")
            .bind(chunk_id)
            .execute(&mut *tx)
            .await?;

        if !rows.is_empty() {
            let mut ids = Vec::with_capacity(rows.len());
            let mut file_ids = Vec::with_capacity(rows.len());
            let mut ordinals = Vec::with_capacity(rows.len());
            let mut row_indexes = Vec::with_capacity(rows.len());
            let mut payloads = Vec::with_capacity(rows.len());
            for row in rows {
                ids.push(row.id);
                file_ids.push(row.file_id);
                ordinals.push(column::<i32, _>(row.ordinal, "ordinal")?);
                row_indexes.push(column::<i32, _>(row.row_index, "row_index")?);
                payloads.push(row.payload);
            }

            sqlx::query(
                r#"
                INSERT INTO result_rows (id, file_id, chunk_id, ordinal, row_index, payload)
                SELECT r.id, r.file_id, $2, r.ordinal, r.row_index, r.payload
                FROM UNNEST($1::uuid[], $3::uuid[], $4::int[], $5::int[], $6::jsonb[])
                    AS r(id, file_id, ordinal, row_index, payload)
                "#,
            )
            .bind(&ids)
            .bind(chunk_id)
            .bind(&file_ids)
            .bind(&ordinals)
            .bind(&row_indexes)
            .bind(&payloads)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record_failure(
        &self,
        chunk_id: Uuid,
        attempts: u32,
        error: &str,
        next: ChunkStatus,
    ) -> EngineResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE chunks
            SET status = $1, attempts = $2, last_error = $3, updated_at = NOW()
            WHERE id = $4 AND status = 'processing'
            "#,
        )
        .bind(next.as_str())
        .bind(column::<i32, _>(attempts, "attempts")?)
        .bind(error)
        .bind(chunk_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::ChunkNotFound(chunk_id));
        }
        Ok(())
    }

    async fn chunk_counts(&self, file_id: Uuid) -> EngineResult<ChunkCounts> {
        self.require_file(file_id).await?;

        let rows = sqlx::query_as::<_, StatusCountRow>(
            r#"
            SELECT status,
                   COUNT(*) AS count,
                   COUNT(*) FILTER (WHERE attempts > 0) AS retried
            FROM chunks
            WHERE file_id = $1
            GROUP BY status
            "#,
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = ChunkCounts::default();
        for row in rows {
            let count: u32 = column(row.count, "count")?;
            match row.status.parse::<ChunkStatus>() {
                Ok(ChunkStatus::Queued) => {
                    counts.queued = count;
                    counts.retrying = column(row.retried, "retried")?;
                }
                Ok(ChunkStatus::Processing) => counts.processing = count,
                Ok(ChunkStatus::Completed) => counts.completed = count,
                Ok(ChunkStatus::Failed) => counts.failed = count,
                Err(e) => tracing::warn!(file_id = %file_id, error = %e, "Ignoring unknown chunk status"),
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
        self.require_file(file_id).await?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM result_rows WHERE file_id = $1")
                .bind(file_id)
                .fetch_one(&self.pool)
                .await?;

        let rows = sqlx::query_as::<_, ResultRowRecord>(
            r#"
            SELECT id, file_id, chunk_id, ordinal, row_index, payload, created_at
            FROM result_rows
            WHERE file_id = $1
            ORDER BY ordinal ASC, row_index ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(file_id)
        .bind(i64::from(limit))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(ResultRow::try_from)
            .collect::<EngineResult<Vec<_>>>()?;
        Ok((items, column(total, "total")?))
    }

    async fn reset_in_flight(&self) -> EngineResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE chunks
            SET status = 'queued', updated_at = NOW()
            WHERE status = 'processing'
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn pending_chunks(&self) -> EngineResult<Vec<PendingChunk>> {
        let rows = sqlx::query_as::<_, PendingRow>(
            r#"
            SELECT c.id, c.file_id, c.ordinal, f.priority
            FROM chunks c
            JOIN files f ON f.id = c.file_id
            WHERE c.status = 'queued'
            ORDER BY f.priority DESC, f.created_at ASC, f.id ASC, c.ordinal ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(PendingChunk {
                    chunk_id: row.id,
                    file_id: row.file_id,
                    ordinal: column(row.ordinal, "ordinal")?,
                    priority: row.priority,
                })
            })
            .collect()
    }

    async fn list_files(&self) -> EngineResult<Vec<FileRecord>> {
        sqlx::query_as::<_, FileRow>(
            r#"
            SELECT id, filename, source_path, total_chunks, priority, created_at
            FROM files
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(FileRecord::try_from)
        .collect()
    }
}
