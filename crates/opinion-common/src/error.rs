//! Error types for the shared data model

use thiserror::Error;

/// Result type alias for data model operations
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised while building or reshaping a [`Dataset`](crate::types::Dataset)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("Row {row} has {actual} fields, expected at most {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Expected {expected} column names, got {actual}")]
    ColumnCount { expected: usize, actual: usize },
}
