//! In-memory tabular dataset

use crate::error::{DataError, Result};
use crate::types::value::{ColumnType, Value};
use std::collections::HashSet;

/// One row, aligned with [`Dataset::columns`]
pub type Row = Vec<Value>;

/// Ordered rows sharing one ordered set of uniquely named columns.
///
/// A dataset is owned by whichever pipeline stage is working on it and is
/// moved, never shared, between stages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    /// Build a dataset from typed rows.
    ///
    /// Rows shorter than the header are padded with nulls.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Result<Self> {
        ensure_unique(&columns)?;
        let width = columns.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(index, mut row)| {
                if row.len() > width {
                    return Err(DataError::RowWidth {
                        row: index,
                        expected: width,
                        actual: row.len(),
                    });
                }
                row.resize(width, Value::Null);
                Ok(row)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns, rows })
    }

    /// Build a dataset from raw text fields, inferring one type per column
    /// and coercing every field to it.
    pub fn from_raw(columns: Vec<String>, records: Vec<Vec<String>>) -> Result<Self> {
        ensure_unique(&columns)?;
        let width = columns.len();
        if let Some((index, record)) = records.iter().enumerate().find(|(_, r)| r.len() > width) {
            return Err(DataError::RowWidth {
                row: index,
                expected: width,
                actual: record.len(),
            });
        }

        let types: Vec<ColumnType> = (0..width)
            .map(|col| {
                ColumnType::infer(
                    records
                        .iter()
                        .map(|record| record.get(col).map(String::as_str).unwrap_or("")),
                )
            })
            .collect();

        let rows = records
            .iter()
            .map(|record| {
                types
                    .iter()
                    .enumerate()
                    .map(|(col, ty)| ty.coerce(record.get(col).map(String::as_str).unwrap_or("")))
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell lookup by row index and column name
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Type of a column, taken from its first non-null cell
    pub fn column_type(&self, index: usize) -> Option<ColumnType> {
        self.rows
            .iter()
            .filter_map(|row| row.get(index))
            .find_map(Value::column_type)
    }

    /// Apply `f` to every cell of the named column.
    ///
    /// Returns `false` when the column does not exist.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> bool
    where
        F: FnMut(&mut Value),
    {
        let Some(col) = self.column_index(name) else {
            return false;
        };
        for row in &mut self.rows {
            if let Some(cell) = row.get_mut(col) {
                f(cell);
            }
        }
        true
    }

    /// Keep only the rows for which `keep` returns true.
    ///
    /// Returns the number of rows removed.
    pub fn retain_rows<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&Row) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|row| keep(row));
        before - self.rows.len()
    }

    /// Replace every column name at once.
    ///
    /// The new header must have the same width and unique names.
    pub fn set_column_names(&mut self, names: Vec<String>) -> Result<()> {
        if names.len() != self.columns.len() {
            return Err(DataError::ColumnCount {
                expected: self.columns.len(),
                actual: names.len(),
            });
        }
        ensure_unique(&names)?;
        self.columns = names;
        Ok(())
    }
}

fn ensure_unique(columns: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(columns.len());
    for column in columns {
        if !seen.insert(column.as_str()) {
            return Err(DataError::DuplicateColumn(column.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn raw(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_from_raw_infers_types() {
        let ds = Dataset::from_raw(
            vec!["Id".into(), "Nombre".into(), "Fecha".into()],
            raw(&[&["1", "ana", "2024-01-01"], &["2", "", "2024-02-01"]]),
        )
        .unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.value(0, "Id"), Some(&Value::Integer(1)));
        assert_eq!(ds.value(1, "Nombre"), Some(&Value::Null));
        assert_eq!(ds.column_type(2), Some(ColumnType::Date));
    }

    #[test]
    fn test_from_raw_pads_short_records() {
        let ds = Dataset::from_raw(vec!["a".into(), "b".into()], raw(&[&["1"]])).unwrap();
        assert_eq!(ds.rows()[0], vec![Value::Integer(1), Value::Null]);
    }

    #[test]
    fn test_from_raw_rejects_long_records() {
        let err = Dataset::from_raw(vec!["a".into()], raw(&[&["1", "2"]])).unwrap_err();
        assert_eq!(
            err,
            DataError::RowWidth {
                row: 0,
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let err = Dataset::new(vec!["a".into(), "a".into()], vec![]).unwrap_err();
        assert_eq!(err, DataError::DuplicateColumn("a".into()));
    }

    #[test]
    fn test_set_column_names() {
        let mut ds = Dataset::new(vec!["a".into(), "b".into()], vec![]).unwrap();
        ds.set_column_names(vec!["c".into(), "b".into()]).unwrap();
        assert_eq!(ds.columns(), &["c".to_string(), "b".to_string()]);
        assert!(ds.set_column_names(vec!["b".into(), "b".into()]).is_err());
        assert!(ds.set_column_names(vec!["x".into()]).is_err());
    }

    #[test]
    fn test_retain_rows_reports_removed() {
        let mut ds = Dataset::new(
            vec!["a".into()],
            vec![
                vec![Value::Integer(1)],
                vec![Value::Integer(2)],
                vec![Value::Integer(3)],
            ],
        )
        .unwrap();
        let removed = ds.retain_rows(|row| row[0] != Value::Integer(2));
        assert_eq!(removed, 1);
        assert_eq!(ds.len(), 2);
    }
}
