//! Post-load row-count audit

use crate::registry::SchemaRegistry;
use crate::store::TargetStore;
use serde::Serialize;
use tracing::{error, info};

/// Row count of one table, or why it could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    #[serde(flatten)]
    pub count: CountResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CountResult {
    Rows(i64),
    Error(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub tables: Vec<TableCount>,
}

impl VerificationReport {
    /// Whether every table could be counted
    pub fn is_complete(&self) -> bool {
        self.tables
            .iter()
            .all(|t| matches!(t.count, CountResult::Rows(_)))
    }

    pub fn count(&self, table: &str) -> Option<i64> {
        self.tables.iter().find(|t| t.table == table).and_then(|t| match t.count {
            CountResult::Rows(n) => Some(n),
            CountResult::Error(_) => None,
        })
    }

    pub fn total_rows(&self) -> i64 {
        self.tables
            .iter()
            .filter_map(|t| match t.count {
                CountResult::Rows(n) => Some(n),
                CountResult::Error(_) => None,
            })
            .sum()
    }
}

/// Count every registry table. A failed count is recorded and the audit
/// moves on to the next table.
pub async fn verify<S>(store: &S, registry: &SchemaRegistry) -> VerificationReport
where
    S: TargetStore + ?Sized,
{
    let mut report = VerificationReport::default();

    for table in registry.in_load_order() {
        let count = match store.count_rows(&table.name).await {
            Ok(rows) => {
                info!(table = %table.name, rows, "Verified table");
                CountResult::Rows(rows.max(0))
            },
            Err(e) => {
                error!(table = %table.name, error = %e, "Failed to count table");
                CountResult::Error(e.to_string())
            },
        };
        report.tables.push(TableCount {
            table: table.name.clone(),
            count,
        });
    }

    report
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::testing::memory_store;
    use opinion_common::types::{Dataset, Value};

    #[tokio::test]
    async fn test_missing_tables_make_report_incomplete() {
        let store = memory_store().await;
        let clients = Dataset::new(
            vec!["IdCliente".into()],
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        )
        .unwrap();
        store.append("clientes", &clients, 1000).await.unwrap();

        let report = verify(&store, &SchemaRegistry::customer_opinions()).await;
        assert_eq!(report.tables.len(), 6);
        assert_eq!(report.count("clientes"), Some(2));
        assert_eq!(report.count("productos"), None);
        assert!(!report.is_complete());
        assert_eq!(report.total_rows(), 2);
    }

    #[tokio::test]
    async fn test_complete_when_all_tables_exist() {
        let store = memory_store().await;
        let registry = SchemaRegistry::customer_opinions();
        let empty = Dataset::new(vec!["x".into()], vec![]).unwrap();
        for table in registry.tables() {
            store.append(&table.name, &empty, 10).await.unwrap();
        }

        let report = verify(&store, &registry).await;
        assert!(report.is_complete());
        assert_eq!(report.total_rows(), 0);
    }
}
