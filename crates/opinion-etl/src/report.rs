//! Human-readable and JSON run summaries

use crate::load::LoadReport;
use crate::pipeline::RunOutcome;
use crate::verify::{CountResult, VerificationReport};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

/// Per-table load results as a table
pub fn format_load_table(report: &LoadReport) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            "Table",
            "Group",
            "Status",
            "Extracted",
            "Duplicates",
            "Empty",
            "Filtered",
            "Loaded",
        ]);

    for entry in &report.tables {
        table.add_row(vec![
            entry.table.clone(),
            entry.group.clone(),
            entry.status.to_string(),
            entry.rows_extracted.to_string(),
            entry.duplicates_removed.to_string(),
            entry.empty_rows_removed.to_string(),
            entry.rows_dropped_by_filter.to_string(),
            entry.rows_loaded.to_string(),
        ]);
    }

    format!("{}\n", table)
}

/// Post-load row counts as a table
pub fn format_count_table(report: &VerificationReport) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Table", "Rows"]);

    for entry in &report.tables {
        let rows = match &entry.count {
            CountResult::Rows(n) => n.to_string(),
            CountResult::Error(e) => format!("error: {}", e),
        };
        table.add_row(vec![entry.table.clone(), rows]);
    }

    format!("{}\n", table)
}

/// Full text summary of a run
pub fn format_summary(outcome: &RunOutcome) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Run {} finished in {:.2}s with status {}\n",
        outcome.run_id,
        outcome.elapsed().as_secs_f64(),
        outcome.status
    ));

    if let Some(error) = &outcome.error {
        out.push_str(&format!("Error: {}\n", error));
    }
    if !outcome.missing_sources.is_empty() {
        out.push_str(&format!(
            "Missing source files for: {}\n",
            outcome.missing_sources.join(", ")
        ));
    }
    if let Some(load) = &outcome.load {
        out.push('\n');
        out.push_str(&format_load_table(load));
        out.push_str(&format!("Total rows loaded: {}\n", load.total_loaded()));
    }
    if let Some(verification) = &outcome.verification {
        out.push('\n');
        out.push_str(&format_count_table(verification));
    }

    out
}

/// Run outcome as pretty-printed JSON
pub fn format_json(outcome: &RunOutcome) -> serde_json::Result<String> {
    serde_json::to_string_pretty(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::load::{LoadStatus, SkipReason, TableLoadResult};
    use crate::pipeline::{PipelineState, RunStatus};
    use crate::verify::TableCount;
    use chrono::Utc;
    use uuid::Uuid;

    fn outcome() -> RunOutcome {
        RunOutcome {
            run_id: Uuid::new_v4(),
            state: PipelineState::Done,
            status: RunStatus::Degraded,
            error: None,
            missing_sources: vec!["fuentes".into()],
            load: Some(LoadReport {
                tables: vec![
                    TableLoadResult {
                        table: "clientes".into(),
                        group: "references".into(),
                        status: LoadStatus::Loaded,
                        rows_extracted: 5,
                        duplicates_removed: 1,
                        empty_rows_removed: 2,
                        rows_dropped_by_filter: 0,
                        rows_loaded: 2,
                    },
                    TableLoadResult {
                        table: "fuentes".into(),
                        group: "references".into(),
                        status: LoadStatus::Skipped(SkipReason::SourceMissing),
                        rows_extracted: 0,
                        duplicates_removed: 0,
                        empty_rows_removed: 0,
                        rows_dropped_by_filter: 0,
                        rows_loaded: 0,
                    },
                ],
            }),
            verification: Some(VerificationReport {
                tables: vec![
                    TableCount {
                        table: "clientes".into(),
                        count: CountResult::Rows(2),
                    },
                    TableCount {
                        table: "fuentes".into(),
                        count: CountResult::Error("no such table".into()),
                    },
                ],
            }),
            started_at: Utc::now(),
            elapsed_ms: 1500,
        }
    }

    #[test]
    fn test_summary_lists_tables_and_status() {
        let text = format_summary(&outcome());
        assert!(text.contains("DEGRADED"));
        assert!(text.contains("clientes"));
        assert!(text.contains("skipped (no source)"));
        assert!(text.contains("error: no such table"));
        assert!(text.contains("Total rows loaded: 2"));
    }

    #[test]
    fn test_json_summary_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&format_json(&outcome()).unwrap()).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["state"], "done");
        assert_eq!(json["load"]["tables"][0]["rows_loaded"], 2);
        assert_eq!(json["load"]["tables"][0]["duplicates_removed"], 1);
        assert_eq!(json["load"]["tables"][0]["empty_rows_removed"], 2);
        assert_eq!(json["verification"]["tables"][0]["rows"], 2);
        assert_eq!(json["verification"]["tables"][1]["error"], "no such table");
    }
}
