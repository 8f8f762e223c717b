//! Extractor: reads each registered source file into a [`Dataset`]

use crate::config::Settings;
use crate::error::ExtractError;
use opinion_common::types::Dataset;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Outcome of reading every source file named by the registry
#[derive(Debug, Default)]
pub struct Extraction {
    /// Datasets keyed by logical table name
    pub datasets: BTreeMap<String, Dataset>,
    /// Tables whose source file does not exist
    pub missing: Vec<String>,
    /// Tables whose source file exists but could not be read, with the reason
    pub failed: BTreeMap<String, String>,
}

impl Extraction {
    /// Whether no source file could be read at all
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.datasets.values().map(Dataset::len).sum()
    }
}

/// Reads source files from the configured data directory
pub struct Extractor<'a> {
    settings: &'a Settings,
}

impl<'a> Extractor<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Read every registered source file.
    ///
    /// Absent files are logged and skipped. Files that exist but cannot be
    /// parsed are logged and recorded as failed. Neither aborts extraction.
    pub fn extract(&self) -> Extraction {
        let mut extraction = Extraction::default();

        for table in self.settings.registry.tables() {
            let path = self.settings.source_path(&table.file);

            if !path.exists() {
                warn!(table = %table.name, path = %path.display(), "Source file not found");
                extraction.missing.push(table.name.clone());
                continue;
            }

            match read_csv(&path) {
                Ok(dataset) => {
                    info!(
                        table = %table.name,
                        file = %table.file,
                        rows = dataset.len(),
                        columns = dataset.columns().len(),
                        "Read source file"
                    );
                    extraction.datasets.insert(table.name.clone(), dataset);
                },
                Err(e) => {
                    error!(table = %table.name, error = %e, "Failed to read source file");
                    extraction.failed.insert(table.name.clone(), e.to_string());
                },
            }
        }

        extraction
    }
}

/// Read a UTF-8 CSV file with a header row.
///
/// Records shorter than the header are padded with nulls; longer records
/// are an error. Column types are inferred from the whole file.
pub fn read_csv(path: &Path) -> Result<Dataset, ExtractError> {
    let csv_err = |source: csv::Error| ExtractError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches('\u{feff}').to_string()
            } else {
                h.to_string()
            }
        })
        .collect();

    let records = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect::<Vec<_>>()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_err)?;

    Dataset::from_raw(columns, records).map_err(|source| ExtractError::Data {
        path: PathBuf::from(path),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use opinion_common::types::Value;
    use std::fs;

    fn settings_for(dir: &Path) -> Settings {
        Settings {
            data_dir: dir.to_path_buf(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_read_csv_types_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clients.csv");
        fs::write(&path, "IdCliente,Nombre,Email\n1,ana,a@x.com\n2,,\n").unwrap();

        let ds = read_csv(&path).unwrap();
        assert_eq!(ds.columns(), &["IdCliente", "Nombre", "Email"]);
        assert_eq!(ds.value(0, "IdCliente"), Some(&Value::Integer(1)));
        assert_eq!(ds.value(1, "Email"), Some(&Value::Null));
    }

    #[test]
    fn test_read_csv_strips_bom_and_keeps_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.csv");
        fs::write(&path, "\u{feff}IdProducto,Categoría\n10,Electrónica\n").unwrap();

        let ds = read_csv(&path).unwrap();
        assert_eq!(ds.columns()[0], "IdProducto");
        assert_eq!(
            ds.value(0, "Categoría"),
            Some(&Value::Text("Electrónica".to_string()))
        );
    }

    #[test]
    fn test_read_csv_rejects_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, b"Id,Nombre\n1,\xff\xfe\n").unwrap();
        assert!(matches!(read_csv(&path), Err(ExtractError::Csv { .. })));
    }

    #[test]
    fn test_extract_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clients.csv"), "IdCliente\n1\n2\n").unwrap();

        let settings = settings_for(dir.path());
        let extraction = Extractor::new(&settings).extract();

        assert_eq!(extraction.datasets.len(), 1);
        assert_eq!(extraction.total_rows(), 2);
        assert_eq!(extraction.missing.len(), 5);
        assert!(extraction.failed.is_empty());
    }

    #[test]
    fn test_extract_records_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clients.csv"), "IdCliente\n1,2\n").unwrap();

        let settings = settings_for(dir.path());
        let extraction = Extractor::new(&settings).extract();

        assert!(extraction.is_empty());
        assert!(extraction.failed.contains_key("clientes"));
    }
}
