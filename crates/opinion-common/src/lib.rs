//! Customer Opinion Common Library
//!
//! Shared data model, error types and logging for the customer-opinion ETL.
//!
//! - **Types**: tagged cell [`Value`](types::Value), inferred
//!   [`ColumnType`](types::ColumnType) and the in-memory
//!   [`Dataset`](types::Dataset) moved between pipeline stages
//! - **Error Handling**: [`DataError`] for dataset construction and reshaping
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```
//! use opinion_common::types::{Dataset, Value};
//!
//! let ds = Dataset::from_raw(
//!     vec!["IdCliente".to_string(), "Email".to_string()],
//!     vec![vec!["1".to_string(), "ana@example.com".to_string()]],
//! )
//! .unwrap();
//! assert_eq!(ds.value(0, "IdCliente"), Some(&Value::Integer(1)));
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

pub use error::{DataError, Result};
