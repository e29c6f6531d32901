//! Engine facade
//!
//! One [`ChunkEngine`] per process owns the queue and the worker pool and wires
//! them to a store and a processor.

use granula_common::types::{FileSummary, ResultsPage, StatusView};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use super::backoff::BackoffPolicy;
use super::planner::{ChunkPlanner, PlanRequest};
use super::processor::ChunkProcessor;
use super::queue::PriorityTaskQueue;
use super::recovery::{self, RecoveryReport};
use super::retry::{RetryController, RetryPolicy};
use super::status::StatusAggregator;
use super::worker::WorkerPool;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::store::ChunkStore;

pub struct ChunkEngine {
    config: EngineConfig,
    store: Arc<dyn ChunkStore>,
    queue: Arc<PriorityTaskQueue>,
    planner: ChunkPlanner,
    aggregator: StatusAggregator,
    controller: Arc<RetryController>,
    pool: Mutex<Option<WorkerPool>>,
}

impl ChunkEngine {
    /// Build an engine without starting workers
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ChunkStore>,
        processor: Arc<dyn ChunkProcessor>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let queue = Arc::new(PriorityTaskQueue::new());
        let controller = Arc::new(RetryController::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            processor,
            RetryPolicy {
                max_retries: config.max_retries,
                backoff: BackoffPolicy::new(config.base_backoff, config.max_backoff),
            },
        ));

        Ok(Self {
            planner: ChunkPlanner::new(Arc::clone(&store), Arc::clone(&queue)),
            aggregator: StatusAggregator::new(Arc::clone(&store)),
            config,
            store,
            queue,
            controller,
            pool: Mutex::new(None),
        })
    }

    /// Build an engine and start its workers
    pub fn start(
        config: EngineConfig,
        store: Arc<dyn ChunkStore>,
        processor: Arc<dyn ChunkProcessor>,
    ) -> EngineResult<Self> {
        let engine = Self::new(config, store, processor)?;
        engine.spawn_workers()?;
        Ok(engine)
    }

    /// Start the worker pool; a no-op if it is already running
    pub fn spawn_workers(&self) -> EngineResult<()> {
        if self.queue.is_closed() {
            return Err(EngineError::QueueClosed);
        }

        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.is_none() {
            *pool = Some(WorkerPool::start(
                self.config.max_concurrency,
                Arc::clone(&self.queue),
                Arc::clone(&self.store),
                Arc::clone(&self.controller),
            ));
        }
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn ChunkStore> {
        Arc::clone(&self.store)
    }

    /// Chunks currently being executed by the pool
    pub fn in_flight(&self) -> usize {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, WorkerPool::in_flight)
    }

    /// Split a file into chunks and queue them; returns the chunk count
    pub async fn plan(&self, request: PlanRequest) -> EngineResult<u32> {
        self.planner.plan(request).await
    }

    pub async fn status(&self, file_id: Uuid) -> EngineResult<StatusView> {
        self.aggregator.status(file_id).await
    }

    /// Result rows of a file ordered by chunk ordinal then row index
    pub async fn results(&self, file_id: Uuid, limit: u32, offset: u64) -> EngineResult<ResultsPage> {
        let (items, total) = self.store.list_results(file_id, limit, offset).await?;
        Ok(ResultsPage {
            file_id,
            items,
            total,
            limit,
            offset,
        })
    }

    pub async fn list_files(&self) -> EngineResult<Vec<FileSummary>> {
        let files = self.store.list_files().await?;
        let mut summaries = Vec::with_capacity(files.len());
        for file in files {
            let status = self.aggregator.status(file.id).await?;
            summaries.push(FileSummary {
                filename: file.filename,
                priority: file.priority,
                created_at: file.created_at,
                status,
            });
        }
        Ok(summaries)
    }

    /// Re-enqueue everything the store still holds as unfinished
    pub async fn recover(&self) -> EngineResult<RecoveryReport> {
        recovery::recover(self.store.as_ref(), &self.queue).await
    }

    /// Poll the status until the file is terminal
    pub async fn wait_until_terminal(&self, file_id: Uuid, poll: Duration) -> EngineResult<StatusView> {
        loop {
            let view = self.status(file_id).await?;
            if view.status.is_terminal() {
                return Ok(view);
            }
            if self.queue.is_closed() {
                return Err(EngineError::QueueClosed);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Like [`wait_until_terminal`](Self::wait_until_terminal), bounded by `timeout`
    pub async fn wait_until_terminal_for(
        &self,
        file_id: Uuid,
        poll: Duration,
        timeout: Duration,
    ) -> EngineResult<StatusView> {
        tokio::time::timeout(timeout, self.wait_until_terminal(file_id, poll))
            .await
            .map_err(|_| EngineError::Timeout(timeout))?
    }

    /// Stop dispatching, let in-flight chunks finish and join the workers
    ///
    /// Chunks still queued stay queued in the store for the next recovery.
    pub async fn shutdown(&self) {
        tracing::info!(pending = self.queue.len(), "Shutting down chunk engine");
        self.queue.close();

        let pool = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pool) = pool {
            pool.join().await;
        }
    }
}
