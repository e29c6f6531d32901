//! Chunked-processing engine
//!
//! Data flow:
//! 1. Planner: split a file into row ranges, persist them as `queued` chunks, enqueue
//! 2. Worker pool: dequeue by priority, claim, run through the retry controller
//! 3. Retry controller: complete, re-enqueue after backoff, or fail the chunk
//! 4. Status aggregator: derive file status from live chunk counts

pub mod backoff;
pub mod csv_reader;
pub mod engine;
pub mod planner;
pub mod processor;
pub mod queue;
pub mod recovery;
pub mod retry;
pub mod status;
pub mod worker;

pub use backoff::BackoffPolicy;
pub use csv_reader::{inspect_csv, CsvChunkProcessor, CsvSummary};
pub use engine::ChunkEngine;
pub use planner::{partition, ChunkPlanner, PlanRequest};
pub use processor::ChunkProcessor;
pub use queue::{ChunkRef, PriorityTaskQueue, Task};
pub use recovery::{recover, RecoveryReport};
pub use retry::{ChunkOutcome, RetryController, RetryPolicy};
pub use status::{derive_status, progress_percent, StatusAggregator};
pub use worker::WorkerPool;
