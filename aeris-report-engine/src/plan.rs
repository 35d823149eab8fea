//! Compiled execution plans.
//!
//! A plan is everything the pipeline needs with the catalog already baked
//! in: per-backend sub-plans with resolved filter types, join edges with
//! namespaced key columns, parsed formula ASTs, and visualization columns
//! resolved to the names they will carry in merged rows. Adapters and later
//! stages never consult the catalog.

use aeris_report_core::{
    AggregationKind, BackendKind, ChartKind, DomainWeightingSettings, FieldType, FilterConnector,
    FilterOp, FilterValue, JoinKind,
};

use crate::formula::CompiledFormula;

/// Fully compiled form of one report + parameter pair.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// One sub-plan per distinct backend, in first-reference order.
    pub sub_plans: Vec<SubPlan>,
    /// Join edges, in declaration order.
    pub joins: Vec<PlannedJoin>,
    /// Calculated fields, in declaration order, parsed once.
    pub formulas: Vec<CompiledFormula>,
    /// Table whose rows seed the merge.
    pub primary_table: String,
    pub visualization: ResolvedVisualization,
    pub weighting: Option<DomainWeightingSettings>,
    /// Namespaced district column, when any declared table carries one.
    pub district_column: Option<String>,
}

impl ExecutionPlan {
    /// One-line plan summary for tracing.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        for sub in &self.sub_plans {
            for scan in &sub.scans {
                let similarity = if scan.similarity.is_some() {
                    ", similarity"
                } else {
                    ""
                };
                parts.push(format!(
                    "{}:{}(filters={}{similarity})",
                    sub.backend,
                    scan.table,
                    scan.filters.len()
                ));
            }
        }
        for join in &self.joins {
            parts.push(format!(
                "join {} {}={}",
                join.kind.as_str(),
                join.left_key,
                join.right_key
            ));
        }
        let target = self
            .visualization
            .y_axis
            .as_deref()
            .unwrap_or("rows");
        let group = self
            .visualization
            .group_by
            .as_deref()
            .unwrap_or("*");
        parts.push(format!(
            "{}({target}) by {group}",
            self.visualization.aggregation.as_str()
        ));
        parts.join(" ; ")
    }
}

/// Everything one backend is asked for in a single call.
#[derive(Debug, Clone)]
pub struct SubPlan {
    pub backend: BackendKind,
    pub scans: Vec<TableScan>,
}

/// One table/collection read within a sub-plan.
#[derive(Debug, Clone)]
pub struct TableScan {
    pub source_id: String,
    pub table: String,
    /// Projection; `None` reads every registered field.
    pub fields: Option<Vec<String>>,
    pub filters: Vec<CompiledFilter>,
    pub similarity: Option<SimilarityHint>,
}

/// A filter with its field's declared type resolved, so adapters can
/// compare values without any catalog access.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: FilterValue,
    pub field_type: FieldType,
    pub connector: FilterConnector,
}

/// Semantic similarity ranking request carried by a scan.
#[derive(Debug, Clone)]
pub struct SimilarityHint {
    pub reference: Vec<f64>,
    /// Minimum cosine similarity; the engine default applies when `None`.
    pub floor: Option<f64>,
}

/// A join edge between two fetched tables. Key columns are namespaced
/// (`table.field`), matching the columns rows carry at merge time.
#[derive(Debug, Clone)]
pub struct PlannedJoin {
    pub left_table: String,
    pub right_table: String,
    pub left_key: String,
    pub right_key: String,
    pub kind: JoinKind,
}

/// Visualization columns resolved against merged-row names: backend fields
/// are namespaced, calculated fields stay bare. Rendering hints are not
/// carried; they never influence execution.
#[derive(Debug, Clone)]
pub struct ResolvedVisualization {
    pub chart: ChartKind,
    pub x_axis: Option<String>,
    pub y_axis: Option<String>,
    pub group_by: Option<String>,
    pub aggregation: AggregationKind,
}
