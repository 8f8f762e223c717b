//! Referential filter
//!
//! Drops rows of a dependent dataset whose foreign-key values are not present
//! in the referenced, already-loaded table. This is a semi-join against the
//! target store at filter time, not a database constraint: failing rows are
//! dropped and only counted.

use crate::error::FilterError;
use crate::registry::ForeignKeyRule;
use crate::store::TargetStore;
use opinion_common::types::Dataset;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Keep only rows whose `column` join key is in `valid`.
///
/// Rows with a null value are dropped. Returns the number of rows dropped.
pub fn semi_join(
    dataset: &mut Dataset,
    column: &str,
    valid: &HashSet<String>,
) -> Result<usize, FilterError> {
    let index = dataset
        .column_index(column)
        .ok_or_else(|| FilterError::MissingColumn {
            column: column.to_string(),
        })?;

    Ok(dataset.retain_rows(|row| {
        row.get(index)
            .and_then(|cell| cell.join_key())
            .is_some_and(|key| valid.contains(&key))
    }))
}

/// Apply every rule in turn; a row survives only if it satisfies all of them.
///
/// Valid sets are read from the store when each rule runs. A referenced table
/// that does not exist yields an empty valid set.
pub async fn filter_references<S>(
    store: &S,
    table: &str,
    mut dataset: Dataset,
    rules: &[ForeignKeyRule],
) -> Result<(Dataset, usize), FilterError>
where
    S: TargetStore + ?Sized,
{
    let mut dropped = 0;

    for rule in rules {
        if !dataset.has_column(&rule.column) {
            return Err(FilterError::MissingColumn {
                column: rule.column.clone(),
            });
        }

        let valid = if store.table_exists(&rule.references.table).await? {
            store
                .key_set(&rule.references.table, &rule.references.column)
                .await?
        } else {
            warn!(
                table = %table,
                references = %rule.references,
                "Referenced table does not exist, every row will be dropped"
            );
            HashSet::new()
        };

        let removed = semi_join(&mut dataset, &rule.column, &valid)?;
        debug!(
            table = %table,
            column = %rule.column,
            references = %rule.references,
            valid_keys = valid.len(),
            removed,
            "Applied foreign key rule"
        );
        dropped += removed;
    }

    Ok((dataset, dropped))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::ColumnRef;
    use crate::store::testing::memory_store;
    use opinion_common::types::Value;
    use proptest::prelude::*;

    fn keys(values: &[&str]) -> HashSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn surveys(rows: Vec<(Value, Value)>) -> Dataset {
        Dataset::new(
            vec!["IdCliente".into(), "IdProducto".into()],
            rows.into_iter().map(|(c, p)| vec![c, p]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_semi_join_drops_unknown_and_null_keys() {
        let mut ds = surveys(vec![
            (Value::Integer(1), Value::Integer(10)),
            (Value::Integer(3), Value::Integer(10)),
            (Value::Null, Value::Integer(10)),
        ]);
        let dropped = semi_join(&mut ds, "IdCliente", &keys(&["1", "2"])).unwrap();
        assert_eq!(dropped, 2);
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn test_semi_join_matches_integral_floats() {
        let mut ds = surveys(vec![(Value::Float(1.0), Value::Integer(10))]);
        semi_join(&mut ds, "IdCliente", &keys(&["1"])).unwrap();
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn test_semi_join_missing_column() {
        let mut ds = surveys(vec![]);
        let err = semi_join(&mut ds, "IdFuente", &keys(&[])).unwrap_err();
        assert!(matches!(err, FilterError::MissingColumn { .. }));
    }

    #[tokio::test]
    async fn test_filter_with_absent_reference_drops_everything() {
        let store = memory_store().await;
        let rules = vec![ForeignKeyRule::new(
            "IdCliente",
            ColumnRef::new("clientes", "IdCliente"),
        )];
        let ds = surveys(vec![(Value::Integer(1), Value::Integer(10))]);

        let (out, dropped) = filter_references(&store, "encuestas", ds, &rules).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(dropped, 1);
    }

    fn arb_key() -> impl Strategy<Value = Value> {
        prop_oneof![
            1 => Just(Value::Null),
            4 => (0i64..8).prop_map(Value::Integer),
        ]
    }

    proptest! {
        #[test]
        fn prop_semi_join_is_exact(
            cells in prop::collection::vec(arb_key(), 0..40),
            valid in prop::collection::hash_set((0i64..8).prop_map(|i| i.to_string()), 0..8),
        ) {
            let input = surveys(cells.into_iter().map(|c| (c, Value::Integer(10))).collect());
            let mut output = input.clone();
            let dropped = semi_join(&mut output, "IdCliente", &valid).unwrap();

            prop_assert!(output.len() <= input.len());
            prop_assert_eq!(output.len() + dropped, input.len());

            for row in output.rows() {
                let key = row[0].join_key();
                prop_assert!(key.is_some_and(|k| valid.contains(&k)));
            }

            let kept = input
                .rows()
                .iter()
                .filter(|row| row[0].join_key().is_some_and(|k| valid.contains(&k)))
                .count();
            prop_assert_eq!(kept, output.len());
        }
    }
}
