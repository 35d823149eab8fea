//! Document-oriented operational store adapter.
//!
//! Tables are collections of JSON documents, the shape the platform's CRUD
//! backends serve. A scan walks the collection, evaluates the compiled
//! filter chain per document, and projects the survivors into rows.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use aeris_report_core::{BackendKind, Row, ScalarValue};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendAdapter, FetchedRows};
use crate::error::{Error, Result};
use crate::plan::SubPlan;

use super::{project, row_matches};

/// Cancellation is checked between chunks of this many documents.
const CANCEL_CHECK_INTERVAL: usize = 256;

/// In-memory document store, seedable per collection.
#[derive(Debug, Default)]
pub struct OperationalStore {
    collections: RwLock<HashMap<String, Vec<serde_json::Value>>>,
    /// Artificial per-call latency, for timeout and cancellation tests.
    latency: Option<Duration>,
}

impl OperationalStore {
    pub fn new() -> Self {
        OperationalStore::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replace a collection's documents.
    pub fn seed(&self, table: impl Into<String>, documents: Vec<serde_json::Value>) {
        self.collections
            .write()
            .expect("collection lock poisoned")
            .insert(table.into(), documents);
    }

    fn scan_table(&self, table: &str) -> Vec<serde_json::Value> {
        self.collections
            .read()
            .expect("collection lock poisoned")
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

fn document_to_row(document: &serde_json::Value) -> Row {
    match document {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), ScalarValue::from_json(v)))
            .collect(),
        _ => Row::new(),
    }
}

#[async_trait]
impl BackendAdapter for OperationalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::OperationalStore
    }

    async fn execute(&self, plan: &SubPlan, cancel: &CancellationToken) -> Result<Vec<FetchedRows>> {
        if let Some(latency) = self.latency {
            tokio::select! {
                _ = tokio::time::sleep(latency) => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }

        let mut out = Vec::with_capacity(plan.scans.len());
        for scan in &plan.scans {
            let documents = self.scan_table(&scan.table);
            let mut rows = Vec::new();
            for (index, document) in documents.iter().enumerate() {
                if index % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let row = document_to_row(document);
                if row_matches(&row, &scan.filters) {
                    rows.push(project(row, scan.fields.as_deref()));
                }
            }
            tracing::trace!(table = %scan.table, rows = rows.len(), "operational scan");
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
    use aeris_report_core::{FieldType, FilterConnector, FilterOp, FilterValue};
    use crate::plan::{CompiledFilter, TableScan};

    fn jobs_fixture() -> OperationalStore {
        let store = OperationalStore::new();
        store.seed(
            "jobs",
            vec![
                serde_json::json!({"id": "j1", "status": "completed", "district": "Wola"}),
                serde_json::json!({"id": "j2", "status": "open", "district": "Wola"}),
                serde_json::json!({"id": "j3", "status": "completed", "district": "Mokotów"}),
            ],
        );
        store
    }

    fn scan(filters: Vec<CompiledFilter>, fields: Option<Vec<String>>) -> SubPlan {
        SubPlan {
            backend: BackendKind::OperationalStore,
            scans: vec![TableScan {
                source_id: "src-1".into(),
                table: "jobs".into(),
                fields,
                filters,
                similarity: None,
            }],
        }
    }

    #[tokio::test]
    async fn filters_and_projects_documents() {
        let store = jobs_fixture();
        let plan = scan(
            vec![CompiledFilter {
                field: "status".into(),
                op: FilterOp::Equals,
                value: FilterValue::scalar("completed"),
                field_type: FieldType::Text,
                connector: FilterConnector::And,
            }],
            Some(vec!["district".into()]),
        );
        let fetched = store
            .execute(&plan, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].rows.len(), 2);
        assert!(fetched[0].rows[0].get("status").is_none());
        assert_eq!(
            fetched[0].rows[0].get("district"),
            Some(&ScalarValue::String("Wola".into()))
        );
    }

    #[tokio::test]
    async fn unknown_table_reads_empty() {
        let store = OperationalStore::new();
        let fetched = store
            .execute(&scan(vec![], None), &CancellationToken::new())
            .await
            .unwrap();
        assert!(fetched[0].rows.is_empty());
    }

    #[tokio::test]
    async fn cancelled_latency_returns_promptly() {
        let store = jobs_fixture().with_latency(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = store.execute(&scan(vec![], None), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
