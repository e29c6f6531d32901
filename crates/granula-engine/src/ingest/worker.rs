//! Bounded worker pool
//!
//! A fixed set of tokio tasks, each looping: dequeue, acquire a semaphore
//! permit, claim the chunk, run it through the retry controller. The
//! semaphore caps chunks in `processing` across all files.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::queue::{PriorityTaskQueue, Task};
use super::retry::{ChunkOutcome, RetryController};
use crate::store::ChunkStore;

pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers on the current runtime
    pub fn start(
        size: usize,
        queue: Arc<PriorityTaskQueue>,
        store: Arc<dyn ChunkStore>,
        controller: Arc<RetryController>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(size));
        let workers = (0..size)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    queue: Arc::clone(&queue),
                    store: Arc::clone(&store),
                    controller: Arc::clone(&controller),
                    permits: Arc::clone(&permits),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        tracing::info!(workers = size, "Worker pool started");

        Self {
            workers,
            permits,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Chunks currently being executed
    pub fn in_flight(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    /// Wait for every worker to exit
    ///
    /// Workers exit once the queue is closed and their current chunk is done.
    pub async fn join(self) {
        for handle in self.workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task ended abnormally");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

struct Worker {
    id: usize,
    queue: Arc<PriorityTaskQueue>,
    store: Arc<dyn ChunkStore>,
    controller: Arc<RetryController>,
    permits: Arc<Semaphore>,
}

impl Worker {
    async fn run(self) {
        tracing::debug!(worker = self.id, "Worker started");

        while let Some(task) = self.queue.dequeue().await {
            let Ok(_permit) = self.permits.acquire().await else {
                break;
            };
            self.handle(task).await;
        }

        tracing::debug!(worker = self.id, "Worker stopped");
    }

    async fn handle(&self, task: Task) {
        let chunk_id = task.chunk.chunk_id;

        let chunk = match self.store.claim_chunk(chunk_id).await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                tracing::debug!(chunk_id = %chunk_id, "Skipping task for chunk that is not queued");
                return;
            }
            Err(e) => {
                // The chunk is still queued in the store; try again after the first backoff step
                let delay = self.controller.policy().backoff.delay(1);
                tracing::warn!(
                    chunk_id = %chunk_id,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Failed to claim chunk"
                );
                let queue = Arc::clone(&self.queue);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = queue.enqueue(task.chunk, task.priority) {
                        tracing::debug!(
                            chunk_id = %task.chunk.chunk_id,
                            error = %e,
                            "Claim retry not enqueued, chunk stays queued for recovery"
                        );
                    }
                });
                return;
            }
        };

        tracing::debug!(
            worker = self.id,
            chunk_id = %chunk.id,
            ordinal = chunk.ordinal,
            attempt = chunk.attempts + 1,
            priority = task.priority,
            "Processing chunk"
        );

        match self.controller.execute(chunk, task.priority).await {
            Ok(ChunkOutcome::Completed { rows }) => {
                tracing::info!(chunk_id = %chunk_id, rows, "Chunk completed");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(
                    chunk_id = %chunk_id,
                    error = %e,
                    "Could not record chunk outcome, left for recovery"
                );
            }
        }
    }
}
