//! Transformer: per-table cleaning and column renaming
//!
//! Each dataset is transformed on its own blocking worker. Workers share no
//! state and never touch the target store.

use crate::config::CleaningSettings;
use crate::registry::{SchemaRegistry, TableDefinition};
use opinion_common::types::{Dataset, Row, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, error, info, warn, Span};

/// Column normalized as an e-mail address
pub const EMAIL_COLUMN: &str = "Email";

/// Column normalized as a person or product name
pub const NAME_COLUMN: &str = "Nombre";

/// What a transform did to one dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub rows_in: usize,
    pub duplicates_removed: usize,
    pub empty_removed: usize,
    pub columns_renamed: usize,
    pub renames_skipped: usize,
}

impl TransformStats {
    pub fn rows_out(&self) -> usize {
        self.rows_in - self.duplicates_removed - self.empty_removed
    }
}

/// Transformed datasets plus per-table statistics
#[derive(Debug, Default)]
pub struct TransformOutput {
    pub datasets: BTreeMap<String, Dataset>,
    pub stats: BTreeMap<String, TransformStats>,
    /// Tables whose worker died, with the reason
    pub failed: BTreeMap<String, String>,
}

/// Applies normalization, deduplication and renaming
#[derive(Debug, Clone, Copy, Default)]
pub struct Transformer {
    cleaning: CleaningSettings,
}

impl Transformer {
    pub fn new(cleaning: CleaningSettings) -> Self {
        Self { cleaning }
    }

    /// Transform one dataset.
    ///
    /// Normalization runs before deduplication so rows that only differed
    /// in case or surrounding whitespace collapse into one, which keeps the
    /// whole transform idempotent.
    pub fn transform(&self, table: &TableDefinition, mut dataset: Dataset) -> (Dataset, TransformStats) {
        let mut stats = TransformStats {
            rows_in: dataset.len(),
            ..TransformStats::default()
        };

        if self.cleaning.normalize_emails() {
            dataset.map_column(EMAIL_COLUMN, |cell| normalize_cell(cell, normalize_email));
        }
        if self.cleaning.normalize_names() {
            dataset.map_column(NAME_COLUMN, |cell| normalize_cell(cell, normalize_name));
        }

        if self.cleaning.remove_duplicates {
            stats.empty_removed = remove_empty_rows(&mut dataset);
            stats.duplicates_removed = remove_duplicate_rows(&mut dataset);
        }

        let (renamed, skipped) = apply_renames(&table.name, &mut dataset, &table.columns);
        stats.columns_renamed = renamed;
        stats.renames_skipped = skipped;

        debug!(table = %table.name, ?stats, "Transformed dataset");
        (dataset, stats)
    }

    /// Transform every dataset concurrently, one worker per table.
    ///
    /// Datasets without a registry entry are dropped with a warning. A
    /// worker that panics is logged and its table reported as failed.
    pub async fn transform_all(
        &self,
        registry: &SchemaRegistry,
        datasets: BTreeMap<String, Dataset>,
    ) -> TransformOutput {
        let mut output = TransformOutput::default();
        let mut names = Vec::with_capacity(datasets.len());
        let mut handles = Vec::with_capacity(datasets.len());

        for (name, dataset) in datasets {
            let Some(table) = registry.table(&name).cloned() else {
                warn!(table = %name, "Dataset has no registry entry, skipping");
                continue;
            };
            let transformer = *self;
            let span = Span::current();
            handles.push(tokio::task::spawn_blocking(move || {
                let _entered = span.enter();
                transformer.transform(&table, dataset)
            }));
            names.push(name);
        }

        let results = futures::future::join_all(handles).await;
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok((dataset, stats)) => {
                    info!(
                        table = %name,
                        rows_in = stats.rows_in,
                        rows_out = dataset.len(),
                        duplicates = stats.duplicates_removed,
                        empty = stats.empty_removed,
                        "Transformed table"
                    );
                    output.stats.insert(name.clone(), stats);
                    output.datasets.insert(name, dataset);
                },
                Err(e) => {
                    error!(table = %name, error = %e, "Transform worker failed");
                    output.failed.insert(name, format!("transform worker failed: {}", e));
                },
            }
        }

        output
    }
}

fn normalize_cell(cell: &mut Value, f: fn(&str) -> String) {
    if let Value::Text(s) = cell {
        *s = f(s);
    }
}

/// Trim surrounding whitespace and lower-case
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Trim surrounding whitespace and title-case every word
pub fn normalize_name(raw: &str) -> String {
    title_case(raw.trim())
}

/// Upper-case a letter that follows a non-letter, lower-case every other
/// letter. `o'neil` becomes `O'Neil`.
///
/// Combining marks continue the current word. Only the first character of
/// a multi-character upper-case mapping stays upper-case (`ß` becomes `Ss`).
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_word = false;
    for ch in raw.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                let mut upper = ch.to_uppercase();
                out.extend(upper.next());
                out.extend(upper.flat_map(char::to_lowercase));
            }
            in_word = true;
        } else if is_combining_mark(ch) {
            out.push(ch);
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

/// Combining diacritical mark blocks; case mappings only emit these
fn is_combining_mark(ch: char) -> bool {
    matches!(
        ch,
        '\u{0300}'..='\u{036F}'
            | '\u{1AB0}'..='\u{1AFF}'
            | '\u{1DC0}'..='\u{1DFF}'
            | '\u{20D0}'..='\u{20FF}'
            | '\u{FE20}'..='\u{FE2F}'
    )
}

fn remove_empty_rows(dataset: &mut Dataset) -> usize {
    dataset.retain_rows(|row| !row.iter().all(Value::is_null))
}

/// Keep the first occurrence of every distinct row
fn remove_duplicate_rows(dataset: &mut Dataset) -> usize {
    let mut seen: HashSet<Row> = HashSet::with_capacity(dataset.len());
    dataset.retain_rows(|row| seen.insert(row.clone()))
}

/// Rename columns per `mapping`; absent source columns are ignored.
///
/// A rename whose target would collide with another column is skipped.
/// Returns (renamed, skipped).
fn apply_renames(
    table: &str,
    dataset: &mut Dataset,
    mapping: &BTreeMap<String, String>,
) -> (usize, usize) {
    let original: Vec<String> = dataset.columns().to_vec();
    let mut proposed: Vec<String> = original
        .iter()
        .map(|c| mapping.get(c).cloned().unwrap_or_else(|| c.clone()))
        .collect();

    let mut skipped = 0;
    loop {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for name in &proposed {
            *counts.entry(name.as_str()).or_insert(0) += 1;
        }
        let collision = proposed
            .iter()
            .zip(&original)
            .position(|(new, old)| new != old && counts.get(new.as_str()).copied().unwrap_or(0) > 1);

        let Some(index) = collision else {
            break;
        };
        warn!(
            table = %table,
            column = %original[index],
            target = %proposed[index],
            "Rename target already exists, keeping source name"
        );
        proposed[index] = original[index].clone();
        skipped += 1;
    }

    let renamed = proposed
        .iter()
        .zip(&original)
        .filter(|(new, old)| new != old)
        .count();

    if renamed > 0 {
        if let Err(e) = dataset.set_column_names(proposed) {
            // Unreachable after collision resolution; keep the source header
            warn!(table = %table, error = %e, "Rename failed, keeping source names");
            return (0, skipped);
        }
    }

    (renamed, skipped)
}
