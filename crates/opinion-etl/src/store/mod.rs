//! Target store interface
//!
//! The pipeline talks to the relational store only through [`TargetStore`].
//! Filter, loader and verifier use one store handle sequentially.

pub mod sql;

pub use sql::{Dialect, SqlStore};

use crate::error::StoreError;
use async_trait::async_trait;
use opinion_common::types::Dataset;
use std::collections::HashSet;

/// Relational store the pipeline loads into
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Append every row of `dataset` to `table`, creating the table if absent.
    ///
    /// Rows are written `batch_size` at a time but the append is all or
    /// nothing for the table. Returns the number of rows written.
    async fn append(
        &self,
        table: &str,
        dataset: &Dataset,
        batch_size: usize,
    ) -> Result<u64, StoreError>;

    /// Number of rows currently in `table`
    async fn count_rows(&self, table: &str) -> Result<i64, StoreError>;

    /// Distinct non-null values of `table.column`, as join keys
    async fn key_set(&self, table: &str, column: &str) -> Result<HashSet<String>, StoreError>;

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError>;
}
