//! Loader
//!
//! Appends every transformed dataset to its target table following the load
//! plan, reference groups before dependent groups. Dependent datasets pass
//! through the referential filter right before their append, so the filter
//! always sees the reference tables committed earlier in the same run.
//!
//! A failure is scoped to one table. Only a connectivity failure aborts the
//! stage, and the report built so far travels with the error.

use crate::error::{FilterError, StoreError};
use crate::filter::filter_references;
use crate::registry::{SchemaRegistry, TableDefinition};
use crate::store::TargetStore;
use crate::transform::{TransformOutput, TransformStats};
use opinion_common::types::Dataset;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{error, info, warn};

/// Why a table was not appended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No rows left after extraction and cleaning
    EmptyDataset,
    /// The source file was not found
    SourceMissing,
}

/// Outcome of loading one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum LoadStatus {
    Loaded,
    Skipped(SkipReason),
    Failed(String),
    /// A referenced table failed in this run; holds its name
    Blocked(String),
}

impl LoadStatus {
    /// Whether dependents of this table must not be loaded
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, LoadStatus::Failed(_) | LoadStatus::Blocked(_))
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStatus::Loaded => write!(f, "loaded"),
            LoadStatus::Skipped(SkipReason::EmptyDataset) => write!(f, "skipped (empty)"),
            LoadStatus::Skipped(SkipReason::SourceMissing) => write!(f, "skipped (no source)"),
            LoadStatus::Failed(reason) => write!(f, "failed: {}", reason),
            LoadStatus::Blocked(reference) => write!(f, "blocked by {}", reference),
        }
    }
}

/// Load Result entry for one logical table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableLoadResult {
    pub table: String,
    pub group: String,
    pub status: LoadStatus,
    pub rows_extracted: usize,
    pub duplicates_removed: usize,
    /// Rows with no value in any column
    pub empty_rows_removed: usize,
    pub rows_dropped_by_filter: usize,
    pub rows_loaded: u64,
}

impl TableLoadResult {
    fn new(table: &str, group: &str, status: LoadStatus) -> Self {
        Self {
            table: table.to_string(),
            group: group.to_string(),
            status,
            rows_extracted: 0,
            duplicates_removed: 0,
            empty_rows_removed: 0,
            rows_dropped_by_filter: 0,
            rows_loaded: 0,
        }
    }

    fn with_stats(mut self, stats: Option<&TransformStats>) -> Self {
        if let Some(stats) = stats {
            self.rows_extracted = stats.rows_in;
            self.duplicates_removed = stats.duplicates_removed;
            self.empty_rows_removed = stats.empty_removed;
        }
        self
    }
}

/// Load Result for a run, in load order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub tables: Vec<TableLoadResult>,
}

impl LoadReport {
    pub fn get(&self, table: &str) -> Option<&TableLoadResult> {
        self.tables.iter().find(|t| t.table == table)
    }

    pub fn total_loaded(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_loaded).sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &TableLoadResult> {
        self.tables.iter().filter(|t| t.status.blocks_dependents())
    }

    fn status_of(&self, table: &str) -> Option<&LoadStatus> {
        self.get(table).map(|t| &t.status)
    }
}

/// The store became unreachable during the load stage
#[derive(Debug, Error)]
#[error("Load aborted at table '{table}': {source}")]
pub struct LoadAbort {
    pub table: String,
    #[source]
    pub source: StoreError,
    /// Results for the tables handled before the abort, including `table`
    pub report: LoadReport,
}

/// Sequential loader over one store handle
pub struct Loader<'a, S: TargetStore + ?Sized> {
    store: &'a S,
    registry: &'a SchemaRegistry,
    batch_size: usize,
}

impl<'a, S: TargetStore + ?Sized> Loader<'a, S> {
    pub fn new(store: &'a S, registry: &'a SchemaRegistry, batch_size: usize) -> Self {
        Self {
            store,
            registry,
            batch_size,
        }
    }

    /// Load every registry table in plan order.
    ///
    /// Every table gets a report entry. `input.failed` marks tables that
    /// failed before this stage.
    pub async fn load(&self, mut input: TransformOutput) -> Result<LoadReport, LoadAbort> {
        let mut report = LoadReport::default();

        for group in self.registry.load_plan().groups() {
            info!(group = %group.name, tables = group.tables.len(), "Loading table group");

            for name in &group.tables {
                let Some(table) = self.registry.table(name) else {
                    continue;
                };
                let stats = input.stats.get(name).copied();
                let dataset = input.datasets.remove(name);
                let earlier_failure = input.failed.remove(name);

                let result = match (earlier_failure, dataset) {
                    (Some(reason), _) => {
                        TableLoadResult::new(name, &group.name, LoadStatus::Failed(reason))
                    },
                    (None, None) => {
                        info!(table = %name, "No source data, recording zero rows");
                        TableLoadResult::new(
                            name,
                            &group.name,
                            LoadStatus::Skipped(SkipReason::SourceMissing),
                        )
                    },
                    (None, Some(dataset)) => {
                        let base = TableLoadResult::new(name, &group.name, LoadStatus::Loaded)
                            .with_stats(stats.as_ref());
                        match self.load_table(table, dataset, base, &report).await {
                            Ok(result) => result,
                            Err((result, source)) => {
                                error!(table = %name, error = %source, "Target store lost, aborting load");
                                report.tables.push(result);
                                return Err(LoadAbort {
                                    table: name.clone(),
                                    source,
                                    report,
                                });
                            },
                        }
                    },
                };

                report.tables.push(result);
            }
        }

        info!(
            tables = report.tables.len(),
            rows = report.total_loaded(),
            failed = report.failed().count(),
            "Load stage finished"
        );
        Ok(report)
    }

    /// Filter (for dependents) and append one dataset.
    ///
    /// `Err` carries a connectivity failure together with the table's entry.
    async fn load_table(
        &self,
        table: &TableDefinition,
        dataset: Dataset,
        mut result: TableLoadResult,
        report: &LoadReport,
    ) -> Result<TableLoadResult, (TableLoadResult, StoreError)> {
        let name = &table.name;

        if dataset.is_empty() {
            info!(table = %name, "Dataset is empty, skipping");
            result.status = LoadStatus::Skipped(SkipReason::EmptyDataset);
            return Ok(result);
        }

        let blocker = table.foreign_keys.iter().find(|rule| {
            report
                .status_of(&rule.references.table)
                .is_some_and(LoadStatus::blocks_dependents)
        });
        if let Some(rule) = blocker {
            warn!(table = %name, references = %rule.references.table, "Referenced table failed, not loading");
            result.status = LoadStatus::Blocked(rule.references.table.clone());
            return Ok(result);
        }

        let dataset = if table.is_dependent() {
            match filter_references(self.store, name, dataset, &table.foreign_keys).await {
                Ok((filtered, dropped)) => {
                    if dropped > 0 {
                        info!(table = %name, dropped, kept = filtered.len(), "Dropped rows failing foreign keys");
                    }
                    result.rows_dropped_by_filter = dropped;
                    filtered
                },
                Err(FilterError::Store(source)) if source.is_connectivity() => {
                    result.status = LoadStatus::Failed(source.to_string());
                    return Err((result, source));
                },
                Err(e) => {
                    error!(table = %name, error = %e, "Referential filter failed");
                    result.status = LoadStatus::Failed(e.to_string());
                    return Ok(result);
                },
            }
        } else {
            dataset
        };

        match self.store.append(name, &dataset, self.batch_size).await {
            Ok(rows) => {
                info!(table = %name, rows, "Loaded table");
                result.rows_loaded = rows;
                Ok(result)
            },
            Err(e) if e.is_connectivity() => {
                result.status = LoadStatus::Failed(e.to_string());
                Err((result, e))
            },
            Err(e) => {
                error!(table = %name, error = %e, "Failed to load table");
                result.status = LoadStatus::Failed(e.to_string());
                Ok(result)
            },
        }
    }
}
