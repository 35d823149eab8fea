//! Execution results and their metadata.
//!
//! The engine always hands back a well-formed [`ExecutionResult`], even when
//! backends failed or the pipeline budget ran out; degradation shows up in
//! the metadata (warnings, timings, the `partial` flag), not as an absent
//! result.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::BackendKind;
use crate::row::RowSet;

/// The row/column table plus metadata returned by one report execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub rows: RowSet,
    pub metadata: ExecutionMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    pub total_rows: usize,
    /// Wall-clock time of the execution that produced these rows; on a
    /// cache hit, the (much smaller) hit-side time.
    pub execution_time: Duration,
    /// Backends that actually contributed rows.
    pub backends_used: Vec<BackendKind>,
    pub generated_at: DateTime<Utc>,
    pub backend_timings: Vec<BackendTiming>,
    #[serde(default)]
    pub warnings: Vec<ExecutionWarning>,
    /// True when a backend dropped out or the pipeline budget expired and
    /// the result was assembled from what had settled.
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub from_cache: bool,
    /// Domain weighting summary; present only when weighting ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warsaw_metrics: Option<WarsawMetrics>,
}

/// Outcome of one adapter call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendTiming {
    pub backend: BackendKind,
    pub elapsed: Duration,
    pub rows: usize,
    pub outcome: FetchOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    Fetched,
    TimedOut,
    Failed,
}

/// A non-fatal degradation recorded during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionWarning {
    pub stage: ExecutionStage,
    pub message: String,
    /// Row index, for per-row degradations such as formula failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
}

impl ExecutionWarning {
    pub fn new(stage: ExecutionStage, message: impl Into<String>) -> Self {
        ExecutionWarning {
            stage,
            message: message.into(),
            row: None,
        }
    }

    pub fn at_row(stage: ExecutionStage, row: usize, message: impl Into<String>) -> Self {
        ExecutionWarning {
            stage,
            message: message.into(),
            row: Some(row),
        }
    }
}

/// Pipeline stages, in execution order. `Failed` is terminal and reachable
/// from `Compiling` only; every later stage degrades instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStage {
    Compiling,
    Fetching,
    Merging,
    Calculating,
    Weighting,
    Aggregating,
    Caching,
    Done,
    Failed,
}

impl ExecutionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStage::Compiling => "compiling",
            ExecutionStage::Fetching => "fetching",
            ExecutionStage::Merging => "merging",
            ExecutionStage::Calculating => "calculating",
            ExecutionStage::Weighting => "weighting",
            ExecutionStage::Aggregating => "aggregating",
            ExecutionStage::Caching => "caching",
            ExecutionStage::Done => "done",
            ExecutionStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStage::Done | ExecutionStage::Failed)
    }
}

impl std::fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one domain weighting pass over Warsaw-district data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarsawMetrics {
    /// Distinct districts an affluence factor was applied to.
    pub districts_weighted: usize,
    pub affluence_applied: bool,
    /// Seasonal factor in effect, when seasonal adjustment ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasonal_factor: Option<f64>,
    /// Total cost trimmed by the route-efficiency discount.
    pub route_discount_total: f64,
}
