//! The caller-facing report service.
//!
//! One entry point: execute a stored report by id. The service loads the
//! definition through the store seam, hands it to the engine, and shapes
//! the result into the platform's wire envelope (camelCase JSON, execution
//! time in milliseconds, rows as plain JSON objects).

use std::sync::Arc;

use aeris_report_core::{BackendKind, ExecutionParams, ExecutionResult, ExecutionWarning, WarsawMetrics};
use aeris_report_engine::Executor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ReportError, Result};
use crate::store::ReportStore;

/// The success envelope: rows as JSON objects plus execution metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub data: Vec<serde_json::Value>,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub total_rows: usize,
    /// Wall-clock execution time in milliseconds.
    pub execution_time: u64,
    pub data_sources_used: Vec<BackendKind>,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub from_cache: bool,
    #[serde(default)]
    pub warnings: Vec<ExecutionWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warsaw_metrics: Option<WarsawMetrics>,
}

impl From<ExecutionResult> for ReportResponse {
    fn from(result: ExecutionResult) -> Self {
        ReportResponse {
            data: result.rows.to_json_rows(),
            metadata: ResponseMetadata {
                total_rows: result.metadata.total_rows,
                execution_time: result.metadata.execution_time.as_millis() as u64,
                data_sources_used: result.metadata.backends_used,
                generated_at: result.metadata.generated_at,
                partial: result.metadata.partial,
                from_cache: result.metadata.from_cache,
                warnings: result.metadata.warnings,
                warsaw_metrics: result.metadata.warsaw_metrics,
            },
        }
    }
}

/// Report execution over a definition store.
pub struct ReportService {
    store: Arc<dyn ReportStore>,
    executor: Arc<Executor>,
}

impl ReportService {
    pub fn new(store: Arc<dyn ReportStore>, executor: Arc<Executor>) -> Self {
        ReportService { store, executor }
    }

    pub fn store(&self) -> &Arc<dyn ReportStore> {
        &self.store
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// Execute a stored report.
    pub async fn execute(
        &self,
        report_id: &str,
        params: &ExecutionParams,
        use_cache: bool,
    ) -> Result<ReportResponse> {
        self.execute_cancellable(report_id, params, use_cache, CancellationToken::new())
            .await
    }

    /// Execute a stored report, observing `cancel`.
    pub async fn execute_cancellable(
        &self,
        report_id: &str,
        params: &ExecutionParams,
        use_cache: bool,
        cancel: CancellationToken,
    ) -> Result<ReportResponse> {
        let definition = self.store.get(report_id).await?;
        let result = self
            .executor
            .execute_cancellable(&definition, params, use_cache, cancel)
            .await?;
        tracing::info!(
            report = report_id,
            rows = result.metadata.total_rows,
            partial = result.metadata.partial,
            from_cache = result.metadata.from_cache,
            "report executed"
        );
        Ok(ReportResponse::from(result))
    }

    /// Like [`ReportService::execute`], with failures already shaped into
    /// the wire envelope.
    pub async fn execute_enveloped(
        &self,
        report_id: &str,
        params: &ExecutionParams,
        use_cache: bool,
    ) -> std::result::Result<ReportResponse, ReportError> {
        self.execute(report_id, params, use_cache)
            .await
            .map_err(|error| {
                tracing::warn!(report = report_id, code = error.code(), %error, "report failed");
                ReportError::from(error)
            })
    }
}
