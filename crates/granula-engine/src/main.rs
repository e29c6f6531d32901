//! Granula CLI - Main entry point

use anyhow::Context;
use clap::Parser;
use granula_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use granula_common::types::{FileStatus, StatusView};
use granula_engine::config::EngineConfig;
use granula_engine::features::files::{commands, queries};
use granula_engine::ingest::{ChunkEngine, CsvChunkProcessor};
use granula_engine::store::{ChunkStore, MemoryChunkStore, PgChunkStore};
use granula_engine::{Cli, Commands};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        })
        .output(LogOutput::Console)
        .log_file_prefix("granula")
        .build();

    // Environment variables take precedence over flags
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        }
    };

    let code = match execute_command(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            1
        }
    };

    drop(guard);
    process::exit(code);
}

/// Execute the CLI command, returning the process exit code
async fn execute_command(cli: Cli) -> anyhow::Result<i32> {
    let config = EngineConfig::load().context("Failed to load configuration")?;

    match cli.command {
        Commands::Process {
            files,
            priority,
            poll_ms,
        } => process_files(config, files, priority, Duration::from_millis(poll_ms)).await,
        Commands::Serve => serve(config).await.map(|_| 0),
        Commands::Status { file_id } => {
            let engine = query_engine(config).await?;
            let view =
                queries::status::handle(&engine, queries::GetFileStatusQuery { file_id }).await?;
            print_json(&view)?;
            Ok(0)
        }
        Commands::Results {
            file_id,
            limit,
            offset,
        } => {
            let engine = query_engine(config).await?;
            let page = queries::results::handle(
                &engine,
                queries::GetFileResultsQuery::new(file_id, limit, offset),
            )
            .await?;
            print_json(&page)?;
            Ok(0)
        }
        Commands::Files => {
            let engine = query_engine(config).await?;
            let listing = queries::list::handle(&engine, queries::ListFilesQuery).await?;
            print_json(&listing)?;
            Ok(0)
        }
    }
}

/// Register every file, wait for all of them and print their final status
async fn process_files(
    config: EngineConfig,
    files: Vec<PathBuf>,
    priority: Option<i32>,
    poll: Duration,
) -> anyhow::Result<i32> {
    let store: Arc<dyn ChunkStore> = match config.database {
        Some(ref db) => {
            let store = PgChunkStore::connect(db).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => Arc::new(MemoryChunkStore::new()),
    };

    let engine = ChunkEngine::start(config, store, Arc::new(CsvChunkProcessor::new()))?;

    let mut exit_code = 0;
    let mut registered = Vec::new();
    for path in files {
        let mut command = commands::RegisterUploadCommand::new(&path);
        command.priority = priority;
        match commands::register::handle(&engine, command).await {
            Ok(response) => registered.push(response.file_id),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Upload rejected");
                eprintln!("{}: {}", path.display(), e);
                exit_code = 1;
            }
        }
    }

    let mut views: Vec<StatusView> = Vec::with_capacity(registered.len());
    for file_id in registered {
        let view = engine.wait_until_terminal(file_id, poll).await?;
        if view.status != FileStatus::Completed {
            exit_code = 1;
        }
        views.push(view);
    }

    engine.shutdown().await;
    print_json(&views)?;
    Ok(exit_code)
}

/// Long-running worker: migrate, recover unfinished chunks, work until Ctrl-C
async fn serve(config: EngineConfig) -> anyhow::Result<()> {
    let db = config
        .database
        .clone()
        .context("serve requires DATABASE_URL to be set")?;

    let store = PgChunkStore::connect(&db).await?;
    store.migrate().await?;

    info!(
        max_concurrency = config.max_concurrency,
        max_retries = config.max_retries,
        "Starting Granula worker"
    );

    let engine = ChunkEngine::new(config, Arc::new(store), Arc::new(CsvChunkProcessor::new()))?;
    let report = engine.recover().await?;
    info!(reset = report.reset, requeued = report.requeued, "Unfinished chunks requeued");

    engine.spawn_workers()?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    engine.shutdown().await;
    Ok(())
}

/// Engine over the PostgreSQL store with no workers, for read-only queries
async fn query_engine(config: EngineConfig) -> anyhow::Result<ChunkEngine> {
    let db = config
        .database
        .clone()
        .context("this command requires DATABASE_URL to be set")?;
    let store = PgChunkStore::connect(&db).await?;
    Ok(ChunkEngine::new(
        config,
        Arc::new(store),
        Arc::new(CsvChunkProcessor::new()),
    )?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
