//! Command-line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// Granula chunked file processor
#[derive(Parser, Debug)]
#[command(name = "granula")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process CSV files in this process and print their final status
    Process {
        /// CSV files to process
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Priority for every file (0-10, higher first)
        #[arg(short, long)]
        priority: Option<i32>,

        /// Status polling interval in milliseconds
        #[arg(long, default_value_t = 200)]
        poll_ms: u64,
    },

    /// Run the long-lived worker against PostgreSQL until Ctrl-C
    Serve,

    /// Show the derived status of a file
    Status {
        file_id: Uuid,
    },

    /// Show result rows of a file
    Results {
        file_id: Uuid,

        /// Items per page (1-1000)
        #[arg(short, long)]
        limit: Option<u32>,

        /// Rows to skip
        #[arg(short, long)]
        offset: Option<u64>,
    },

    /// List all files with their status
    Files,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_process() {
        let cli = Cli::try_parse_from(["granula", "process", "a.csv", "b.csv", "-p", "8"]).unwrap();
        match cli.command {
            Commands::Process {
                files,
                priority,
                poll_ms,
            } => {
                assert_eq!(files.len(), 2);
                assert_eq!(priority, Some(8));
                assert_eq!(poll_ms, 200);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_results_paging() {
        let id = Uuid::new_v4();
        let id_arg = id.to_string();
        let cli = Cli::try_parse_from([
            "granula",
            "-v",
            "results",
            id_arg.as_str(),
            "--limit",
            "2",
            "--offset",
            "1",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Results { file_id, limit: Some(2), offset: Some(1) } if file_id == id
        ));
    }
}
