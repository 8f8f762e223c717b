//! SQL target store over a sqlx `AnyPool`
//!
//! Table layouts are not known ahead of time, so statements are built at
//! runtime. PostgreSQL and SQLite are supported.

use super::TargetStore;
use crate::config::DatabaseSettings;
use crate::error::StoreError;
use async_trait::async_trait;
use opinion_common::types::{ColumnType, Dataset, Value, DATE_FORMAT};
use sqlx::any::{AnyArguments, AnyPoolOptions};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection, AnyPool, Row};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// SQL flavour of the connected backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Detect the dialect from a connection URL
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Dialect::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Dialect::Sqlite)
        } else {
            Err(StoreError::UnsupportedUrl(url.to_string()))
        }
    }

    /// Bind parameter marker for the 1-based parameter `index`
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Maximum bound parameters per statement
    pub fn max_parameters(self) -> usize {
        match self {
            Dialect::Postgres => 65_535,
            Dialect::Sqlite => 32_766,
        }
    }
}

/// Double-quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Integer => "BIGINT",
        ColumnType::Float => "DOUBLE PRECISION",
        ColumnType::Text | ColumnType::Date => "TEXT",
    }
}

/// Map a declared SQL column type back to a cell type
fn column_type_from_sql(declared: &str) -> ColumnType {
    let declared = declared.to_ascii_uppercase();
    if declared.contains("INT") {
        ColumnType::Integer
    } else if ["DOUBLE", "REAL", "FLOAT", "NUMERIC", "DECIMAL"]
        .iter()
        .any(|t| declared.contains(t))
    {
        ColumnType::Float
    } else {
        ColumnType::Text
    }
}

type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// Bind one cell. Nulls are typed after their column so PostgreSQL accepts
/// them.
fn bind_cell<'q>(query: AnyQuery<'q>, cell: &Value, ty: ColumnType) -> AnyQuery<'q> {
    match cell {
        Value::Null => match ty {
            ColumnType::Integer => query.bind(None::<i64>),
            ColumnType::Float => query.bind(None::<f64>),
            ColumnType::Text | ColumnType::Date => query.bind(None::<String>),
        },
        Value::Integer(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Date(d) => query.bind(d.format(DATE_FORMAT).to_string()),
    }
}

/// Relational store reached through a pooled sqlx connection
#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlStore {
    /// Open the pool and check the store answers.
    ///
    /// Any failure here is a connectivity failure.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        sqlx::any::install_default_drivers();
        let dialect = Dialect::from_url(&settings.url)?;

        let mut options = AnyPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.connect_timeout());
        if dialect == Dialect::Sqlite {
            // In-memory databases live exactly as long as their connection
            options = options.idle_timeout(None).max_lifetime(None);
        }

        let pool = options
            .connect(&settings.url)
            .await
            .map_err(StoreError::Connectivity)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(StoreError::Connectivity)?;

        info!(url = %settings.redacted_url(), ?dialect, "Connected to target store");
        Ok(Self { pool, dialect })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn create_table_sql(&self, table: &str, dataset: &Dataset, types: &[ColumnType]) -> String {
        let columns: Vec<String> = dataset
            .columns()
            .iter()
            .zip(types)
            .map(|(name, ty)| format!("{} {}", quote_ident(name), sql_type(*ty)))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(table),
            columns.join(", ")
        )
    }

    fn insert_sql(&self, table: &str, columns: &[String], rows: usize) -> String {
        let width = columns.len();
        let column_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let tuples: Vec<String> = (0..rows)
            .map(|row| {
                let markers: Vec<String> = (0..width)
                    .map(|col| self.dialect.placeholder(row * width + col + 1))
                    .collect();
                format!("({})", markers.join(", "))
            })
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(table),
            column_list.join(", "),
            tuples.join(", ")
        )
    }

    /// Declared column types of `table`; empty when it does not exist yet
    async fn existing_column_types(
        &self,
        conn: &mut AnyConnection,
        table: &str,
    ) -> Result<HashMap<String, ColumnType>, sqlx::Error> {
        let sql = match self.dialect {
            Dialect::Sqlite => "SELECT name, type FROM pragma_table_info(?)",
            Dialect::Postgres => "SELECT column_name::text, data_type::text \
                 FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1",
        };
        let rows = sqlx::query(sql)
            .bind(table.to_string())
            .fetch_all(&mut *conn)
            .await?;

        let mut types = HashMap::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get(0)?;
            let declared: String = row.try_get(1)?;
            types.insert(name, column_type_from_sql(&declared));
        }
        Ok(types)
    }

    fn rows_per_statement(&self, width: usize, batch_size: usize) -> usize {
        let by_params = self.dialect.max_parameters() / width.max(1);
        batch_size.min(by_params).max(1)
    }
}

#[async_trait]
impl TargetStore for SqlStore {
    async fn append(
        &self,
        table: &str,
        dataset: &Dataset,
        batch_size: usize,
    ) -> Result<u64, StoreError> {
        if dataset.columns().is_empty() {
            return Err(StoreError::NoColumns {
                table: table.to_string(),
            });
        }

        let err = |e| StoreError::from_sqlx(table, e);

        let mut tx = self.pool.begin().await.map_err(err)?;

        // All-null columns take the type of an existing column
        let existing = self.existing_column_types(&mut *tx, table).await.map_err(err)?;
        let types: Vec<ColumnType> = dataset
            .columns()
            .iter()
            .enumerate()
            .map(|(i, name)| {
                dataset
                    .column_type(i)
                    .or_else(|| existing.get(name).copied())
                    .unwrap_or(ColumnType::Text)
            })
            .collect();

        let create = self.create_table_sql(table, dataset, &types);
        sqlx::query(&create).execute(&mut *tx).await.map_err(err)?;

        let chunk_rows = self.rows_per_statement(dataset.columns().len(), batch_size);
        let mut written = 0u64;
        for (batch, rows) in dataset.rows().chunks(chunk_rows).enumerate() {
            let sql = self.insert_sql(table, dataset.columns(), rows.len());
            let mut query = sqlx::query(&sql);
            for row in rows {
                for (cell, ty) in row.iter().zip(&types) {
                    query = bind_cell(query, cell, *ty);
                }
            }
            let result = query.execute(&mut *tx).await.map_err(err)?;
            written += result.rows_affected();
            debug!(table = %table, batch, rows = rows.len(), "Inserted batch");
        }

        tx.commit().await.map_err(err)?;
        Ok(written)
    }

    async fn count_rows(&self, table: &str) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx(table, e))
    }

    async fn key_set(&self, table: &str, column: &str) -> Result<HashSet<String>, StoreError> {
        let sql = format!(
            "SELECT DISTINCT {col} FROM {table} WHERE {col} IS NOT NULL",
            col = quote_ident(column),
            table = quote_ident(table)
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx(table, e))?;

        let keys = rows
            .iter()
            .filter_map(|row| {
                let value = if let Ok(i) = row.try_get::<i64, _>(0) {
                    Value::Integer(i)
                } else if let Ok(f) = row.try_get::<f64, _>(0) {
                    Value::Float(f)
                } else if let Ok(s) = row.try_get::<String, _>(0) {
                    Value::Text(s)
                } else {
                    Value::Null
                };
                value.join_key()
            })
            .collect();
        Ok(keys)
    }

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let sql = match self.dialect {
            Dialect::Sqlite => {
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?".to_string()
            },
            Dialect::Postgres => "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1"
                .to_string(),
        };
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(table.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx(table, e))?;
        Ok(count > 0)
    }
}
