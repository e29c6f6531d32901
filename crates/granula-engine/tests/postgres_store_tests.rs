//! PostgreSQL store tests
//!
//! Run explicitly against a scratch database:
//! `DATABASE_URL=postgres://... cargo test --test postgres_store_tests -- --ignored`

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{engine_with, plan_request, test_config, Behavior, ScriptedProcessor, POLL, TIMEOUT};
use granula_common::types::{ChunkStatus, FileStatus};
use granula_engine::config::DatabaseConfig;
use granula_engine::ingest::{ChunkEngine, ChunkPlanner, PriorityTaskQueue};
use granula_engine::store::{ChunkStore, PgChunkStore};
use granula_engine::EngineError;
use std::sync::Arc;

async fn pg_store() -> PgChunkStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let store = PgChunkStore::connect(&DatabaseConfig {
        url,
        max_connections: 5,
        connect_timeout_secs: 10,
    })
    .await
    .expect("Failed to connect to database");
    store.migrate().await.expect("Failed to run migrations");
    store
}

#[tokio::test]
#[ignore] // Requires database
async fn test_claim_and_complete_roundtrip() {
    let store = Arc::new(pg_store().await);
    let queue = Arc::new(PriorityTaskQueue::new());
    let planner = ChunkPlanner::new(store.clone(), queue.clone());

    let request = plan_request(25, 10, 4);
    let file_id = request.file_id;
    assert_eq!(planner.plan(request).await.unwrap(), 3);

    let task = queue.try_dequeue().unwrap();
    let claimed = store.claim_chunk(task.chunk.chunk_id).await.unwrap().unwrap();
    assert_eq!(claimed.status, ChunkStatus::Processing);
    assert!(store.claim_chunk(task.chunk.chunk_id).await.unwrap().is_none());

    let counts = store.chunk_counts(file_id).await.unwrap();
    assert_eq!(counts.processing, 1);
    assert_eq!(counts.queued, 2);

    store
        .record_failure(claimed.id, 1, "boom", ChunkStatus::Queued)
        .await
        .unwrap();
    let counts = store.chunk_counts(file_id).await.unwrap();
    assert_eq!(counts.retrying, 1);
    assert!(matches!(
        store.complete_chunk(claimed.id, Vec::new()).await,
        Err(EngineError::ChunkNotFound(_))
    ));
}

#[tokio::test]
#[ignore] // Requires database
async fn test_engine_over_postgres() {
    let store = Arc::new(pg_store().await);
    let processor = Arc::new(ScriptedProcessor::new().with_behavior(1, Behavior::FailTimes(1)));
    let engine = engine_with(test_config(3), store.clone(), processor);

    let request = plan_request(4, 1, 6);
    let file_id = request.file_id;
    engine.plan(request).await.unwrap();

    let view = engine
        .wait_until_terminal_for(file_id, POLL, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(view.status, FileStatus::Completed);

    let page = engine.results(file_id, 2, 1).await.unwrap();
    assert_eq!(page.total, 4);
    let ordinals: Vec<u32> = page.items.iter().map(|r| r.ordinal).collect();
    assert_eq!(ordinals, vec![1, 2]);

    engine.shutdown().await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_recovery_over_postgres() {
    let store = Arc::new(pg_store().await);
    // Reset anything left behind by earlier runs so the counts below are exact
    ChunkEngine::new(test_config(1), store.clone(), Arc::new(ScriptedProcessor::new()))
        .unwrap()
        .recover()
        .await
        .unwrap();

    let queue = Arc::new(PriorityTaskQueue::new());
    let request = plan_request(3, 1, 2);
    let file_id = request.file_id;
    ChunkPlanner::new(store.clone(), queue.clone())
        .plan(request)
        .await
        .unwrap();
    let task = queue.try_dequeue().unwrap();
    store.claim_chunk(task.chunk.chunk_id).await.unwrap();

    let engine = ChunkEngine::new(test_config(2), store.clone(), Arc::new(ScriptedProcessor::new()))
        .unwrap();
    let report = engine.recover().await.unwrap();
    assert!(report.reset >= 1);
    engine.spawn_workers().unwrap();

    let view = engine
        .wait_until_terminal_for(file_id, POLL, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(view.status, FileStatus::Completed);

    engine.shutdown().await;
}
