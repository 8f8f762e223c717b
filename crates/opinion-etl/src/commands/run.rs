//! `opinion-etl run` command implementation

use crate::config::Settings;
use crate::error::Result;
use crate::pipeline::{Pipeline, RunStatus};
use crate::report::{format_json, format_summary};
use colored::Colorize;

/// Run the pipeline and print its summary
pub async fn run(settings: Settings, json_summary: bool) -> Result<i32> {
    let outcome = Pipeline::new(settings).run().await;

    if json_summary {
        println!("{}", format_json(&outcome)?);
    } else {
        print!("{}", format_summary(&outcome));
        println!();
        let line = match outcome.status {
            RunStatus::Success => "ETL completed".green().bold(),
            RunStatus::Degraded => "ETL completed with verification errors".yellow().bold(),
            RunStatus::Failed => "ETL failed".red().bold(),
        };
        println!("{}", line);
    }

    Ok(outcome.exit_code())
}
