//! opinion-etl - Main entry point

use clap::Parser;
use opinion_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use opinion_etl::{commands, Cli, Commands};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Keep stdout clean for the JSON summary
    let log_output = if cli.json_summary {
        LogOutput::File
    } else {
        LogOutput::Both
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .output(log_output)
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = match LogConfig::from_env_with(log_config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: invalid logging configuration: {}", e);
            process::exit(1);
        },
    };

    let guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {}", e);
            process::exit(1);
        },
    };

    let code = match execute_command(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            1
        },
    };

    // process::exit skips destructors; flush file logs first
    drop(guard);
    process::exit(code);
}

/// Execute the CLI command, returning the process exit code
async fn execute_command(cli: &Cli) -> opinion_etl::Result<i32> {
    let settings = cli.settings()?;

    match &cli.command {
        Commands::Run => commands::run::run(settings, cli.json_summary).await,
        Commands::Check { create_data_dir } => commands::check::run(&settings, *create_data_dir),
        Commands::Verify => commands::verify::run(&settings, cli.json_summary).await,
    }
}
