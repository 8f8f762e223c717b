//! Customer Opinion ETL Library
//!
//! Loads customer-opinion CSV exports into a relational store.
//!
//! # Overview
//!
//! A run moves through fixed stages under one orchestrator:
//!
//! - **Extract**: read every source file named by the schema registry
//! - **Transform**: normalize e-mails and names, drop duplicate and empty
//!   rows, rename columns (one blocking worker per table)
//! - **Filter**: drop dependent rows whose foreign keys are not in the
//!   already-loaded reference tables
//! - **Load**: append each table in load-plan order, reference groups first
//! - **Verify**: count the rows of every registry table
//!
//! # Example
//!
//! ```no_run
//! use opinion_etl::{Pipeline, Settings};
//!
//! #[tokio::main]
//! async fn main() -> opinion_etl::Result<()> {
//!     let settings = Settings::load()?;
//!     let outcome = Pipeline::new(settings).run().await;
//!     println!("{}", opinion_etl::report::format_summary(&outcome));
//!     std::process::exit(outcome.exit_code());
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod commands;
pub mod config;
pub mod error;
pub mod extract;
pub mod filter;
pub mod load;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod store;
pub mod transform;
pub mod verify;

// Re-export commonly used types
pub use config::Settings;
pub use error::{EtlError, Result};
pub use pipeline::{Pipeline, PipelineState, RunOutcome, RunStatus};
pub use registry::SchemaRegistry;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// opinion-etl - load customer-opinion files into a relational store
#[derive(Parser, Debug)]
#[command(name = "opinion-etl")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding the source CSV files
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Target store connection URL (postgres:// or sqlite:)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// YAML schema registry replacing the built-in one
    #[arg(long, global = true)]
    pub registry: Option<PathBuf>,

    /// Rows per INSERT statement
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    /// Print the summary as JSON instead of tables
    #[arg(long, global = true)]
    pub json_summary: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full extract, transform, load and verify pipeline
    Run,

    /// Validate configuration and report missing source files
    Check {
        /// Create the data directory if it does not exist
        #[arg(long)]
        create_data_dir: bool,
    },

    /// Print the current row count of every registry table
    Verify,
}

impl Cli {
    /// Environment settings with command-line overrides applied
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::load()?;

        if let Some(dir) = &self.data_dir {
            settings.data_dir = dir.clone();
        }
        if let Some(url) = &self.database_url {
            settings.database.url = url.clone();
        }
        if let Some(path) = &self.registry {
            settings.registry = SchemaRegistry::load(path)?;
        }
        if let Some(batch_size) = self.batch_size {
            settings.batch_size = batch_size;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "opinion-etl",
            "run",
            "--data-dir",
            "/tmp/in",
            "--batch-size",
            "50",
            "--json-summary",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Run));
        assert_eq!(cli.batch_size, Some(50));
        assert!(cli.json_summary);
    }

    #[test]
    fn test_check_flag() {
        let cli = Cli::try_parse_from(["opinion-etl", "check", "--create-data-dir"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Check {
                create_data_dir: true
            }
        ));
    }

    #[test]
    #[serial]
    fn test_flags_override_environment() {
        std::env::set_var("ETL_BATCH_SIZE", "10");
        let cli = Cli::try_parse_from([
            "opinion-etl",
            "verify",
            "--batch-size",
            "20",
            "--database-url",
            "sqlite::memory:",
        ])
        .unwrap();
        let settings = cli.settings();
        std::env::remove_var("ETL_BATCH_SIZE");

        let settings = settings.unwrap();
        assert_eq!(settings.batch_size, 20);
        assert_eq!(settings.database.url, "sqlite::memory:");
    }

    #[test]
    #[serial]
    fn test_zero_batch_size_flag_rejected() {
        let cli = Cli::try_parse_from(["opinion-etl", "run", "--batch-size", "0"]).unwrap();
        assert!(cli.settings().is_err());
    }
}
