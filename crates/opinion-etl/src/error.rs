//! Error types for the ETL pipeline
//!
//! Only connectivity failures and an empty input set abort a run. Everything
//! else is recorded against the table it happened to and the run continues.

use opinion_common::DataError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ETL operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Run-level error type
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid schema registry: {0}")]
    Registry(String),

    #[error("No source files found in '{}'", data_dir.display())]
    NoSourceFiles { data_dir: PathBuf },

    #[error("Target store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to parse registry file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EtlError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }
}

/// Errors reported by the target store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or the connection was lost
    #[error("Connection to target store failed: {0}")]
    Connectivity(#[source] sqlx::Error),

    /// A statement against one table failed
    #[error("Statement on table '{table}' failed: {source}")]
    Statement {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Unsupported database URL '{0}': expected a postgres:// or sqlite: URL")]
    UnsupportedUrl(String),

    #[error("Cannot create table '{table}' without columns")]
    NoColumns { table: String },
}

impl StoreError {
    /// Classify a driver error raised while working on `table`
    pub fn from_sqlx(table: &str, err: sqlx::Error) -> Self {
        if is_connectivity_error(&err) {
            StoreError::Connectivity(err)
        } else {
            StoreError::Statement {
                table: table.to_string(),
                source: err,
            }
        }
    }

    /// Whether the error means the store itself is gone, as opposed to one
    /// table's statement failing
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::Connectivity(_))
    }
}

fn is_connectivity_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

/// Failure to read one source file
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("CSV error in '{}': {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Malformed data in '{}': {source}", path.display())]
    Data {
        path: PathBuf,
        #[source]
        source: DataError,
    },
}

/// Failure of the referential filter for one dependent table
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Foreign key column '{column}' not present in dataset")]
    MissingColumn { column: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_connectivity() {
        assert!(StoreError::from_sqlx("clientes", sqlx::Error::PoolTimedOut).is_connectivity());
        assert!(StoreError::from_sqlx("clientes", sqlx::Error::PoolClosed).is_connectivity());
    }

    #[test]
    fn test_row_errors_are_statement_failures() {
        let err = StoreError::from_sqlx("clientes", sqlx::Error::RowNotFound);
        assert!(!err.is_connectivity());
        assert!(err.to_string().contains("clientes"));
    }
}
