//! Retry/backoff controller
//!
//! Runs one claimed chunk through the processor and owns every transition out
//! of `processing`:
//!
//! - success: result rows written and chunk `completed`
//! - failure with retries left: attempts incremented, chunk back to `queued`,
//!   re-enqueued after the backoff delay from a detached timer task
//! - failure with no retries left: chunk `failed` with the last error
//!
//! A retried chunk never holds a worker slot while it waits.

use futures::FutureExt;
use granula_common::types::{ChunkRecord, ChunkStatus, ResultRow};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::backoff::BackoffPolicy;
use super::processor::ChunkProcessor;
use super::queue::{ChunkRef, PriorityTaskQueue};
use crate::error::{EngineError, EngineResult};
use crate::store::ChunkStore;

/// What happened to a chunk after one execution
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Completed { rows: usize },
    RetryScheduled { attempts: u32, delay: Duration },
    Failed { attempts: u32, error: String },
}

/// Retry limits
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed after the first failed attempt
    ///
    /// A chunk runs at most `max_retries + 1` times, so with the default of 3
    /// it is retried after 1, 2 and 4 base delays and then failed. The stored
    /// attempt count of a failed chunk is `max_retries + 1`, not `max_retries`.
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
}

pub struct RetryController {
    store: Arc<dyn ChunkStore>,
    queue: Arc<PriorityTaskQueue>,
    processor: Arc<dyn ChunkProcessor>,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        queue: Arc<PriorityTaskQueue>,
        processor: Arc<dyn ChunkProcessor>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            queue,
            processor,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Execute a chunk the caller has already claimed
    ///
    /// Processing errors never propagate; they become `RetryScheduled` or
    /// `Failed`. Errors that another attempt cannot fix (see
    /// [`EngineError::is_retryable`]) fail the chunk without retries. Writing
    /// the failure is itself retried on the backoff schedule while the store
    /// is unavailable. `Err` is returned only when the chunk is no longer ours
    /// to record or the engine shuts down first, in which case recovery
    /// picks the chunk up.
    #[tracing::instrument(
        skip(self, chunk),
        fields(chunk_id = %chunk.id, file_id = %chunk.file_id, ordinal = chunk.ordinal)
    )]
    pub async fn execute(&self, chunk: ChunkRecord, priority: i32) -> EngineResult<ChunkOutcome> {
        let (error, retryable) = match self.attempt(&chunk).await {
            Ok(rows) => {
                tracing::debug!(rows, "Chunk completed");
                return Ok(ChunkOutcome::Completed { rows });
            }
            Err(e) => (e.to_string(), e.is_retryable()),
        };

        let attempts = chunk.attempts.saturating_add(1);
        if retryable && attempts <= self.policy.max_retries {
            let delay = self.policy.backoff.delay(attempts);
            self.persist_failure(chunk.id, attempts, &error, ChunkStatus::Queued)
                .await?;

            tracing::warn!(
                attempt = attempts,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Chunk failed, will retry"
            );

            self.schedule_retry(&chunk, priority, delay);
            Ok(ChunkOutcome::RetryScheduled { attempts, delay })
        } else {
            self.persist_failure(chunk.id, attempts, &error, ChunkStatus::Failed)
                .await?;

            let exhausted = EngineError::ExhaustedRetries {
                chunk_id: chunk.id,
                attempts,
                last_error: error.clone(),
            };
            tracing::error!(error = %exhausted, retryable, "Chunk failed permanently");

            Ok(ChunkOutcome::Failed { attempts, error })
        }
    }

    /// One processing attempt: load the file, run the processor, store results
    async fn attempt(&self, chunk: &ChunkRecord) -> EngineResult<usize> {
        let file = self
            .store
            .get_file(chunk.file_id)
            .await?
            .ok_or(EngineError::FileNotFound(chunk.file_id))?;

        let payloads = AssertUnwindSafe(self.processor.process(&file, chunk))
            .catch_unwind()
            .await
            .map_err(|panic| {
                EngineError::TransientChunk(format!(
                    "processor '{}' panicked: {}",
                    self.processor.name(),
                    panic_message(panic.as_ref())
                ))
            })??;

        let rows: Vec<ResultRow> = payloads
            .into_iter()
            .zip(0u32..)
            .map(|(payload, index)| ResultRow::new(chunk, index, payload))
            .collect();
        let count = rows.len();

        self.store.complete_chunk(chunk.id, rows).await?;
        Ok(count)
    }

    /// Record a failed execution, retrying the write while the store is unavailable
    ///
    /// The chunk stays `processing` (and keeps its worker slot) until the write
    /// lands, so it can never be claimed twice.
    async fn persist_failure(
        &self,
        chunk_id: Uuid,
        attempts: u32,
        error: &str,
        next: ChunkStatus,
    ) -> EngineResult<()> {
        let mut write_attempt = 0u32;
        loop {
            match self.store.record_failure(chunk_id, attempts, error, next).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && !self.queue.is_closed() => {
                    write_attempt = write_attempt.saturating_add(1);
                    let delay = self.policy.backoff.delay(write_attempt);
                    tracing::warn!(
                        chunk_id = %chunk_id,
                        next = %next,
                        write_attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Could not record chunk failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn schedule_retry(&self, chunk: &ChunkRecord, priority: i32, delay: Duration) {
        let queue = Arc::clone(&self.queue);
        let chunk_ref = ChunkRef {
            chunk_id: chunk.id,
            file_id: chunk.file_id,
            ordinal: chunk.ordinal,
        };

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queue.enqueue(chunk_ref, priority) {
                tracing::debug!(
                    chunk_id = %chunk_ref.chunk_id,
                    error = %e,
                    "Retry not enqueued, chunk stays queued for recovery"
                );
            }
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ingest::planner::{ChunkPlanner, PlanRequest};
    use crate::store::MemoryChunkStore;
    use async_trait::async_trait;
    use granula_common::types::FileRecord;
    use uuid::Uuid;

    struct AlwaysFails;

    #[async_trait]
    impl ChunkProcessor for AlwaysFails {
        async fn process(
            &self,
            _file: &FileRecord,
            _chunk: &ChunkRecord,
        ) -> EngineResult<Vec<serde_json::Value>> {
            Err(EngineError::TransientChunk("disk on fire".into()))
        }

        fn name(&self) -> &str {
            "always-fails"
        }
    }

    struct Rejects;

    #[async_trait]
    impl ChunkProcessor for Rejects {
        async fn process(
            &self,
            _file: &FileRecord,
            _chunk: &ChunkRecord,
        ) -> EngineResult<Vec<serde_json::Value>> {
            Err(EngineError::InvalidInput("unsupported encoding".into()))
        }

        fn name(&self) -> &str {
            "rejects"
        }
    }

    struct Panics;

    #[async_trait]
    impl ChunkProcessor for Panics {
        async fn process(
            &self,
            _file: &FileRecord,
            _chunk: &ChunkRecord,
        ) -> EngineResult<Vec<serde_json::Value>> {
            panic!("index out of bounds")
        }

        fn name(&self) -> &str {
            "panics"
        }
    }

    async fn setup(
        processor: Arc<dyn ChunkProcessor>,
        max_retries: u32,
    ) -> (Arc<MemoryChunkStore>, Arc<PriorityTaskQueue>, RetryController) {
        let store = Arc::new(MemoryChunkStore::new());
        let queue = Arc::new(PriorityTaskQueue::new());
        ChunkPlanner::new(store.clone(), queue.clone())
            .plan(PlanRequest {
                file_id: Uuid::new_v4(),
                filename: "f.csv".into(),
                source_path: "/dev/null".into(),
                logical_size: 10,
                chunk_size: 10,
                priority: 3,
                byte_offsets: Vec::new(),
            })
            .await
            .unwrap();

        let controller = RetryController::new(
            store.clone(),
            queue.clone(),
            processor,
            RetryPolicy {
                max_retries,
                backoff: BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(30)),
            },
        );
        (store, queue, controller)
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_requeues_after_delay() {
        let (store, queue, controller) = setup(Arc::new(AlwaysFails), 3).await;
        let task = queue.try_dequeue().unwrap();
        let chunk = store.claim_chunk(task.chunk.chunk_id).await.unwrap().unwrap();

        let outcome = controller.execute(chunk, task.priority).await.unwrap();
        assert_eq!(
            outcome,
            ChunkOutcome::RetryScheduled {
                attempts: 1,
                delay: Duration::from_secs(1)
            }
        );

        let stored = store.get_chunk(task.chunk.chunk_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ChunkStatus::Queued);
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.last_error.as_deref(), Some("Chunk processing failed: disk on fire"));
        assert!(queue.is_empty());

        let requeued = queue.dequeue().await.unwrap();
        assert_eq!(requeued.chunk, task.chunk);
        assert_eq!(requeued.priority, 3);
        assert!(requeued.sequence > task.sequence);
    }

    #[tokio::test]
    async fn test_zero_retries_fails_immediately() {
        let (store, queue, controller) = setup(Arc::new(AlwaysFails), 0).await;
        let task = queue.try_dequeue().unwrap();
        let chunk = store.claim_chunk(task.chunk.chunk_id).await.unwrap().unwrap();

        let outcome = controller.execute(chunk, task.priority).await.unwrap();
        assert!(matches!(outcome, ChunkOutcome::Failed { attempts: 1, .. }));

        let stored = store.get_chunk(task.chunk.chunk_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ChunkStatus::Failed);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_without_retry() {
        let (store, queue, controller) = setup(Arc::new(Rejects), 3).await;
        let task = queue.try_dequeue().unwrap();
        let chunk = store.claim_chunk(task.chunk.chunk_id).await.unwrap().unwrap();

        let outcome = controller.execute(chunk, task.priority).await.unwrap();
        assert!(matches!(outcome, ChunkOutcome::Failed { attempts: 1, .. }));

        let stored = store.get_chunk(task.chunk.chunk_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ChunkStatus::Failed);
        assert!(stored.last_error.unwrap().contains("unsupported encoding"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_panic_counts_as_failed_attempt() {
        let (store, queue, controller) = setup(Arc::new(Panics), 0).await;
        let task = queue.try_dequeue().unwrap();
        let chunk = store.claim_chunk(task.chunk.chunk_id).await.unwrap().unwrap();

        let outcome = controller.execute(chunk, task.priority).await.unwrap();
        match outcome {
            ChunkOutcome::Failed { error, .. } => assert!(error.contains("index out of bounds")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unclaimed_chunk_cannot_be_recorded() {
        let (store, queue, controller) = setup(Arc::new(AlwaysFails), 3).await;
        let task = queue.try_dequeue().unwrap();
        // Not claimed: still queued, so the failure cannot be recorded
        let chunk = store.get_chunk(task.chunk.chunk_id).await.unwrap().unwrap();

        let result = controller.execute(chunk, task.priority).await;
        assert!(matches!(result, Err(EngineError::ChunkNotFound(_))));
    }
}
