//! Data model shared by every pipeline stage

pub mod dataset;
pub mod value;

pub use dataset::{Dataset, Row};
pub use value::{is_null_token, ColumnType, Value, DATE_FORMAT, NULL_TOKENS};
