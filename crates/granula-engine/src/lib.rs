//! Granula Engine
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Chunked processing of large uploaded CSV files: each file is split into
//! fixed-size row ranges that are scheduled by priority, executed by a bounded
//! worker pool, retried with capped exponential backoff and aggregated back
//! into a live file status.
//!
//! # Overview
//!
//! - **Ingest**: planner, priority queue, retry controller, worker pool,
//!   status aggregator and recovery, behind the [`ChunkEngine`] facade
//! - **Store**: the [`ChunkStore`] contract with in-memory and PostgreSQL implementations
//! - **Features**: CQRS-style commands and queries used by the CLI
//!
//! # Example
//!
//! ```no_run
//! use granula_engine::config::EngineConfig;
//! use granula_engine::ingest::{ChunkEngine, CsvChunkProcessor, PlanRequest};
//! use granula_engine::store::MemoryChunkStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> granula_engine::EngineResult<()> {
//! let engine = ChunkEngine::start(
//!     EngineConfig::default(),
//!     Arc::new(MemoryChunkStore::new()),
//!     Arc::new(CsvChunkProcessor::new()),
//! )?;
//!
//! let file_id = uuid::Uuid::new_v4();
//! engine
//!     .plan(PlanRequest {
//!         file_id,
//!         filename: "sales.csv".into(),
//!         source_path: "/var/uploads/sales.csv".into(),
//!         logical_size: 25_000,
//!         chunk_size: 10_000,
//!         priority: 5,
//!         byte_offsets: Vec::new(),
//!     })
//!     .await?;
//!
//! let status = engine.wait_until_terminal(file_id, Duration::from_millis(200)).await?;
//! println!("{} {}%", status.status, status.progress_percent);
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod store;

pub use cli::{Cli, Commands};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use ingest::ChunkEngine;
pub use store::ChunkStore;
