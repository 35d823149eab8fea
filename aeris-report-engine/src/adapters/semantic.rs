//! Vector/semantic-similarity store adapter.
//!
//! Collections hold documents with an embedding alongside their scalar
//! fields. A scan with a similarity hint ranks the filtered documents by
//! cosine similarity against the reference vector, keeps those at or above
//! the floor, and attaches the score as a `_similarity` column; without a
//! hint the scan is a plain filtered read.

use std::collections::HashMap;
use std::sync::RwLock;

use aeris_report_core::{BackendKind, Row};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendAdapter, FetchedRows};
use crate::error::{Error, Result};
use crate::plan::SubPlan;

use super::{project, row_matches};

/// Column carrying the cosine score on ranked rows.
pub const SIMILARITY_COLUMN: &str = "_similarity";

/// One embedded document.
#[derive(Debug, Clone)]
pub struct SemanticDoc {
    pub embedding: Vec<f64>,
    pub fields: Row,
}

/// In-memory vector store, seedable per collection.
#[derive(Debug)]
pub struct SemanticStore {
    collections: RwLock<HashMap<String, Vec<SemanticDoc>>>,
    /// Floor applied when a hint does not carry its own.
    default_floor: f64,
}

impl SemanticStore {
    pub fn new(default_floor: f64) -> Self {
        SemanticStore {
            collections: RwLock::new(HashMap::new()),
            default_floor,
        }
    }

    pub fn seed(&self, table: impl Into<String>, documents: Vec<SemanticDoc>) {
        self.collections
            .write()
            .expect("collection lock poisoned")
            .insert(table.into(), documents);
    }
}

/// Cosine similarity in one pass over both vectors. Zero-magnitude or
/// length-mismatched inputs score zero rather than NaN.
fn cosine(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0;
    let mut mag_a = 0.0;
    let mut mag_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a.sqrt() * mag_b.sqrt())
}

#[async_trait]
impl BackendAdapter for SemanticStore {
    fn kind(&self) -> BackendKind {
        BackendKind::SemanticStore
    }

    async fn execute(&self, plan: &SubPlan, cancel: &CancellationToken) -> Result<Vec<FetchedRows>> {
        let mut out = Vec::with_capacity(plan.scans.len());
        for scan in &plan.scans {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let documents = self
                .collections
                .read()
                .expect("collection lock poisoned")
                .get(&scan.table)
                .cloned()
                .unwrap_or_default();

            let filtered = documents
                .into_iter()
                .filter(|doc| row_matches(&doc.fields, &scan.filters));

            let rows: Vec<Row> = match &scan.similarity {
                Some(hint) => {
                    let floor = hint.floor.unwrap_or(self.default_floor);
                    let mut scored: Vec<(f64, Row)> = filtered
                        .filter_map(|doc| {
                            let score = cosine(&hint.reference, &doc.embedding);
                            (score >= floor).then(|| (score, doc.fields))
                        })
                        .collect();
                    // Highest similarity first; ties keep seed order.
                    scored.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
                    scored
                        .into_iter()
                        .map(|(score, row)| {
                            let mut row = project(row, scan.fields.as_deref());
                            row.set(SIMILARITY_COLUMN, score);
                            row
                        })
                        .collect()
                }
                None => filtered
                    .map(|doc| project(doc.fields, scan.fields.as_deref()))
                    .collect(),
            };
            tracing::trace!(table = %scan.table, rows = rows.len(), "semantic scan");
            out.push(FetchedRows {
                table: scan.table.clone(),
                rows,
            });
        }
        Ok(out)
    }
}
