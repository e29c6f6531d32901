//! Common test utilities for Granula engine integration tests
//!
//! - [`ScriptedProcessor`]: fails, panics or sleeps on demand per chunk ordinal,
//!   records every attempt and tracks peak concurrency
//! - [`FlakyStore`]: wraps [`MemoryChunkStore`] and fails a configurable number
//!   of `complete_chunk` calls
//! - helpers to build engines and plan requests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use granula_common::types::{ChunkCounts, ChunkRecord, ChunkStatus, FileRecord, ResultRow};
use granula_engine::config::EngineConfig;
use granula_engine::ingest::{ChunkEngine, ChunkProcessor, PlanRequest};
use granula_engine::store::{ChunkStore, MemoryChunkStore, PendingChunk};
use granula_engine::{EngineError, EngineResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// How the scripted processor treats one chunk ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    /// Fail the first `n` attempts, then succeed
    FailTimes(u32),
    FailAlways,
    PanicAlways,
}

/// One processor invocation
#[derive(Debug, Clone)]
pub struct Attempt {
    pub file_id: Uuid,
    pub chunk_id: Uuid,
    pub ordinal: u32,
    pub at: Instant,
}

#[derive(Default)]
pub struct ScriptedProcessor {
    behaviors: Mutex<HashMap<u32, Behavior>>,
    default_behavior: Mutex<Option<Behavior>>,
    work_time: Mutex<Duration>,
    rows_per_chunk: AtomicU32,
    calls: Mutex<HashMap<Uuid, u32>>,
    attempts: Mutex<Vec<Attempt>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedProcessor {
    pub fn new() -> Self {
        let processor = Self::default();
        processor.rows_per_chunk.store(1, Ordering::SeqCst);
        processor
    }

    pub fn with_behavior(self, ordinal: u32, behavior: Behavior) -> Self {
        self.behaviors.lock().unwrap().insert(ordinal, behavior);
        self
    }

    pub fn with_default(self, behavior: Behavior) -> Self {
        *self.default_behavior.lock().unwrap() = Some(behavior);
        self
    }

    pub fn with_work_time(self, work_time: Duration) -> Self {
        *self.work_time.lock().unwrap() = work_time;
        self
    }

    pub fn with_rows_per_chunk(self, rows: u32) -> Self {
        self.rows_per_chunk.store(rows, Ordering::SeqCst);
        self
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, chunk_id: Uuid) -> Vec<Attempt> {
        self.attempts()
            .into_iter()
            .filter(|a| a.chunk_id == chunk_id)
            .collect()
    }

    /// Highest number of simultaneous `process` calls observed
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, ordinal: u32) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(&ordinal)
            .copied()
            .or(*self.default_behavior.lock().unwrap())
            .unwrap_or(Behavior::Succeed)
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChunkProcessor for ScriptedProcessor {
    async fn process(
        &self,
        file: &FileRecord,
        chunk: &ChunkRecord,
    ) -> EngineResult<Vec<serde_json::Value>> {
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = RunningGuard(&self.running);
        self.peak.fetch_max(now_running, Ordering::SeqCst);

        self.attempts.lock().unwrap().push(Attempt {
            file_id: file.id,
            chunk_id: chunk.id,
            ordinal: chunk.ordinal,
            at: Instant::now(),
        });
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(chunk.id).or_insert(0);
            *count += 1;
            *count
        };

        let work_time = *self.work_time.lock().unwrap();
        if !work_time.is_zero() {
            tokio::time::sleep(work_time).await;
        }

        match self.behavior_for(chunk.ordinal) {
            Behavior::Succeed => {}
            Behavior::FailTimes(n) if call > n => {}
            Behavior::FailTimes(_) | Behavior::FailAlways => {
                return Err(EngineError::TransientChunk(format!(
                    "scripted failure on call {}",
                    call
                )));
            }
            Behavior::PanicAlways => panic!("scripted panic for ordinal {}", chunk.ordinal),
        }

        let rows = self.rows_per_chunk.load(Ordering::SeqCst);
        Ok((0..rows)
            .map(|row| serde_json::json!([chunk.ordinal, row]))
            .collect())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Memory store whose first `failures` completions report the store as unavailable
///
/// Claims and failure writes can be made to fail the same way.
pub struct FlakyStore {
    inner: MemoryChunkStore,
    remaining_failures: AtomicU32,
    remaining_record_failures: AtomicU32,
    remaining_claim_failures: AtomicU32,
}

impl FlakyStore {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: MemoryChunkStore::new(),
            remaining_failures: AtomicU32::new(failures),
            remaining_record_failures: AtomicU32::new(0),
            remaining_claim_failures: AtomicU32::new(0),
        }
    }

    /// Also fail the first `failures` calls to `record_failure`
    pub fn with_record_failures(self, failures: u32) -> Self {
        self.remaining_record_failures.store(failures, Ordering::SeqCst);
        self
    }

    /// Also fail the first `failures` claims
    pub fn with_claim_failures(self, failures: u32) -> Self {
        self.remaining_claim_failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn claim_failures_remaining(&self) -> u32 {
        self.remaining_claim_failures.load(Ordering::SeqCst)
    }
}

fn take_failure(remaining: &AtomicU32) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ChunkStore for FlakyStore {
    async fn create_file_with_chunks(
        &self,
        file: &FileRecord,
        chunks: &[ChunkRecord],
    ) -> EngineResult<()> {
        self.inner.create_file_with_chunks(file, chunks).await
    }

    async fn get_file(&self, file_id: Uuid) -> EngineResult<Option<FileRecord>> {
        self.inner.get_file(file_id).await
    }

    async fn get_chunk(&self, chunk_id: Uuid) -> EngineResult<Option<ChunkRecord>> {
        self.inner.get_chunk(chunk_id).await
    }

    async fn claim_chunk(&self, chunk_id: Uuid) -> EngineResult<Option<ChunkRecord>> {
        if take_failure(&self.remaining_claim_failures) {
            return Err(EngineError::StoreUnavailable("pool timed out".into()));
        }
        self.inner.claim_chunk(chunk_id).await
    }

    async fn complete_chunk(&self, chunk_id: Uuid, rows: Vec<ResultRow>) -> EngineResult<()> {
        if take_failure(&self.remaining_failures) {
            return Err(EngineError::StoreUnavailable("connection reset".into()));
        }
        self.inner.complete_chunk(chunk_id, rows).await
    }

    async fn record_failure(
        &self,
        chunk_id: Uuid,
        attempts: u32,
        error: &str,
        next: ChunkStatus,
    ) -> EngineResult<()> {
        if take_failure(&self.remaining_record_failures) {
            return Err(EngineError::StoreUnavailable("connection refused".into()));
        }
        self.inner.record_failure(chunk_id, attempts, error, next).await
    }

    async fn chunk_counts(&self, file_id: Uuid) -> EngineResult<ChunkCounts> {
        self.inner.chunk_counts(file_id).await
    }

    async fn list_results(
        &self,
        file_id: Uuid,
        limit: u32,
        offset: u64,
    ) -> EngineResult<(Vec<ResultRow>, u64)> {
        self.inner.list_results(file_id, limit, offset).await
    }

    async fn reset_in_flight(&self) -> EngineResult<u64> {
        self.inner.reset_in_flight().await
    }

    async fn pending_chunks(&self) -> EngineResult<Vec<PendingChunk>> {
        self.inner.pending_chunks().await
    }

    async fn list_files(&self) -> EngineResult<Vec<FileRecord>> {
        self.inner.list_files().await
    }
}

/// Fast-retry configuration for tests
pub fn test_config(max_concurrency: usize) -> EngineConfig {
    EngineConfig::default()
        .with_max_concurrency(max_concurrency)
        .with_backoff(Duration::from_millis(10), Duration::from_millis(50))
}

pub fn plan_request(logical_size: u64, chunk_size: u64, priority: i32) -> PlanRequest {
    PlanRequest {
        file_id: Uuid::new_v4(),
        filename: "test.csv".into(),
        source_path: "/dev/null".into(),
        logical_size,
        chunk_size,
        priority,
        byte_offsets: Vec::new(),
    }
}

pub fn engine_with(
    config: EngineConfig,
    store: Arc<dyn ChunkStore>,
    processor: Arc<ScriptedProcessor>,
) -> ChunkEngine {
    ChunkEngine::start(config, store, processor).unwrap()
}

pub const POLL: Duration = Duration::from_millis(5);
pub const TIMEOUT: Duration = Duration::from_secs(10);
