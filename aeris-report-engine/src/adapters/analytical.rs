//! Columnar analytical store adapter.
//!
//! Tables are named column vectors of equal length. A scan evaluates each
//! filter against its column to produce a row-index mask, folds the masks
//! through the declared connectors, then materializes the selected indices
//! into rows. Ragged seeds are tolerated: a short column reads as null
//! past its end.

use std::collections::HashMap;
use std::sync::RwLock;

use aeris_report_core::{BackendKind, FilterConnector, Row, ScalarValue};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendAdapter, FetchedRows};
use crate::error::{Error, Result};
use crate::plan::{SubPlan, TableScan};

use super::filter_matches;

/// One table's columns, in declared order.
type Columns = Vec<(String, Vec<ScalarValue>)>;

/// In-memory columnar store, seedable per table.
#[derive(Debug, Default)]
pub struct AnalyticalStore {
    tables: RwLock<HashMap<String, Columns>>,
}

impl AnalyticalStore {
    pub fn new() -> Self {
        AnalyticalStore::default()
    }

    /// Replace a table with the given columns.
    pub fn seed(
        &self,
        table: impl Into<String>,
        columns: Vec<(impl Into<String>, Vec<ScalarValue>)>,
    ) {
        let columns = columns
            .into_iter()
            .map(|(name, values)| (name.into(), values))
            .collect();
        self.tables
            .write()
            .expect("table lock poisoned")
            .insert(table.into(), columns);
    }

    fn run_scan(&self, scan: &TableScan) -> Vec<Row> {
        let tables = self.tables.read().expect("table lock poisoned");
        let Some(columns) = tables.get(&scan.table) else {
            return Vec::new();
        };
        let row_count = columns.iter().map(|(_, v)| v.len()).max().unwrap_or(0);

        let column = |name: &str| columns.iter().find(|(n, _)| n == name).map(|(_, v)| v);

        // Mask per filter, folded by connector over whole masks; this is
        // the columnar equivalent of the per-document fold.
        let mut mask: Option<Vec<bool>> = None;
        for filter in &scan.filters {
            let values = column(&filter.field);
            let hits: Vec<bool> = (0..row_count)
                .map(|i| filter_matches(values.and_then(|v| v.get(i)), filter))
                .collect();
            mask = Some(match (mask, filter.connector) {
                (None, _) => hits,
                (Some(acc), FilterConnector::And) => {
                    acc.iter().zip(&hits).map(|(a, b)| *a && *b).collect()
                }
                (Some(acc), FilterConnector::Or) => {
                    acc.iter().zip(&hits).map(|(a, b)| *a || *b).collect()
                }
            });
        }

        let selected: Vec<&(String, Vec<ScalarValue>)> = match &scan.fields {
            None => columns.iter().collect(),
            Some(keep) => columns
                .iter()
                .filter(|(name, _)| keep.iter().any(|k| k == name))
                .collect(),
        };

        (0..row_count)
            .filter(|i| mask.as_ref().map_or(true, |m| m[*i]))
            .map(|i| {
                selected
                    .iter()
                    .map(|(name, values)| {
                        let value = values.get(i).cloned().unwrap_or(ScalarValue::Null);
                        (name.clone(), value)
                    })
                    .collect()
            })
            .collect()
    }
}

#[async_trait]
impl BackendAdapter for AnalyticalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::AnalyticalStore
    }

    async fn execute(&self, plan: &SubPlan, cancel: &CancellationToken) -> Result<Vec<FetchedRows>> {
        let mut out = Vec::with_capacity(plan.scans.len());
        for scan in &plan.scans {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let rows = self.run_scan(scan);
            tracing::trace!(table = %scan.table, rows = rows.len(), "analytical scan");
            out.push(FetchedRows {
                table: scan.table.clone(),
                rows,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeris_report_core::{FieldType, FilterOp, FilterValue};
    use crate::plan::CompiledFilter;

    fn costs_fixture() -> AnalyticalStore {
        let store = AnalyticalStore::new();
        store.seed(
            "job_costs",
            vec![
                (
                    "job_id",
                    vec!["j1".into(), "j2".into(), "j3".into()],
                ),
                (
                    "cost",
                    vec![
                        ScalarValue::Double(120.0),
                        ScalarValue::Double(340.0),
                        ScalarValue::Double(90.0),
                    ],
                ),
            ],
        );
        store
    }

    fn scan(filters: Vec<CompiledFilter>) -> SubPlan {
        SubPlan {
            backend: BackendKind::AnalyticalStore,
            scans: vec![TableScan {
                source_id: "src-2".into(),
                table: "job_costs".into(),
                fields: None,
                filters,
                similarity: None,
            }],
        }
    }

    #[tokio::test]
    async fn mask_selects_matching_rows() {
        let store = costs_fixture();
        let plan = scan(vec![CompiledFilter {
            field: "cost".into(),
            op: FilterOp::GreaterThan,
            value: FilterValue::scalar(100.0),
            field_type: FieldType::Double,
            connector: FilterConnector::And,
        }]);
        let fetched = store
            .execute(&plan, &CancellationToken::new())
            .await
            .unwrap();
        let rows = &fetched[0].rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("job_id"), Some(&ScalarValue::String("j1".into())));
        assert_eq!(rows[1].get("job_id"), Some(&ScalarValue::String("j2".into())));
    }

    #[tokio::test]
    async fn or_connector_unions_masks() {
        let store = costs_fixture();
        let plan = scan(vec![
            CompiledFilter {
                field: "cost".into(),
                op: FilterOp::GreaterThan,
                value: FilterValue::scalar(300.0),
                field_type: FieldType::Double,
                connector: FilterConnector::And,
            },
            CompiledFilter {
                field: "job_id".into(),
                op: FilterOp::Equals,
                value: FilterValue::scalar("j3"),
                field_type: FieldType::Text,
                connector: FilterConnector::Or,
            },
        ]);
        let fetched = store
            .execute(&plan, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fetched[0].rows.len(), 2);
    }

    #[tokio::test]
    async fn ragged_columns_pad_with_null() {
        let store = AnalyticalStore::new();
        store.seed(
            "t",
            vec![
                ("a", vec![ScalarValue::Long(1), ScalarValue::Long(2)]),
                ("b", vec![ScalarValue::Long(10)]),
            ],
        );
        let plan = SubPlan {
            backend: BackendKind::AnalyticalStore,
            scans: vec![TableScan {
                source_id: "s".into(),
                table: "t".into(),
                fields: None,
                filters: vec![],
                similarity: None,
            }],
        };
        let fetched = store
            .execute(&plan, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fetched[0].rows[1].get("b"), Some(&ScalarValue::Null));
    }
}
