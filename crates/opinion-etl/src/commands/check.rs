//! `opinion-etl check` command implementation
//!
//! Validates configuration and reports which source files are missing.

use crate::config::Settings;
use crate::error::Result;
use colored::Colorize;

/// Print the effective configuration and list missing source files.
///
/// Returns 1 when any source file is missing.
pub fn run(settings: &Settings, create_data_dir: bool) -> Result<i32> {
    if create_data_dir {
        let dir = settings.ensure_data_dir()?;
        println!("Data directory ready: {}", dir.display());
    }

    println!("{}", "Configuration:".cyan().bold());
    println!("  Data dir:    {}", settings.data_dir.display());
    println!("  Database:    {}", settings.database.redacted_url());
    println!("  Batch size:  {}", settings.batch_size);
    println!("  Max retries: {}", settings.max_retry_attempts);
    println!(
        "  Cleaning:    duplicates={} emails={} text={}",
        settings.cleaning.remove_duplicates,
        settings.cleaning.validate_emails,
        settings.cleaning.clean_text_fields
    );
    println!();

    println!("{}", "Load plan:".cyan().bold());
    for group in settings.registry.load_plan().groups() {
        println!("  {}: {}", group.name, group.tables.join(", "));
    }
    println!();

    let missing = settings.missing_source_files();
    let total = settings.registry.tables().len();
    if missing.is_empty() {
        println!("{}", format!("All {} source files present", total).green());
        return Ok(0);
    }

    println!(
        "{}",
        format!("{} of {} source files missing:", missing.len(), total).red()
    );
    for file in &missing {
        println!("  {}", settings.source_path(file).display());
    }
    Ok(1)
}
