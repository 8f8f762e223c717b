//! `opinion-etl verify` command implementation

use crate::config::Settings;
use crate::error::Result;
use crate::report::format_count_table;
use crate::store::SqlStore;
use crate::verify::verify;

/// Connect and print the row count of every registry table.
///
/// Returns 2 when any table could not be counted.
pub async fn run(settings: &Settings, json_summary: bool) -> Result<i32> {
    let store = SqlStore::connect(&settings.database).await?;
    let report = verify(&store, &settings.registry).await;
    store.close().await;

    if json_summary {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_count_table(&report));
    }

    Ok(if report.is_complete() { 0 } else { 2 })
}
