//! The report definition model.
//!
//! A report is data: which fields to pull from which stores, how to filter
//! and join them, which derived columns to compute, how to weight the
//! numbers, and how the result is visualized. The engine only ever reads
//! these types; creating and editing them belongs to the persistence
//! collaborator.
//!
//! Wire format is camelCase JSON, matching the platform the definitions
//! come from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{BackendKind, FieldType};
use crate::value::ScalarValue;

/// A declared report.
///
/// Invariants (enforced by the query compiler, not by construction):
/// at least one data source; calculated fields form an acyclic dependency
/// chain with no forward references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub visualization: VisualizationSpec,
    pub data_sources: Vec<DataSource>,
    #[serde(default)]
    pub calculated_fields: Vec<CalculatedField>,
    #[serde(default)]
    pub weighting: Option<DomainWeightingSettings>,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub shared: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One (backend, table) reference inside a report, with its filters and
/// joins. `field`, when set, narrows the source to a single column (plus
/// whatever supporting columns the plan needs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub id: String,
    pub backend: BackendKind,
    pub table: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub joins: Vec<Join>,
    /// Similarity ranking request; only valid on semantic-store sources.
    #[serde(default)]
    pub similarity: Option<SimilaritySpec>,
}

/// Rank a semantic source's documents against a reference embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilaritySpec {
    pub reference: Vec<f64>,
    /// Minimum cosine similarity to keep; engine default applies when unset.
    #[serde(default)]
    pub floor: Option<f64>,
}

/// One filter predicate. Filters on a source form an ordered list folded
/// left to right through each filter's `connector`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    #[serde(default)]
    pub value: FilterValue,
    #[serde(default)]
    pub connector: FilterConnector,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: FilterValue) -> Self {
        Filter {
            field: field.into(),
            op,
            value,
            connector: FilterConnector::And,
        }
    }

    pub fn or(mut self) -> Self {
        self.connector = FilterConnector::Or;
        self
    }
}

/// Filter operators. Operator/type compatibility is a definition invariant;
/// see [`FilterOp::valid_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    StartsWith,
    In,
    Between,
}

impl FilterOp {
    /// Whether the operator applies to a field of the given declared type.
    /// Substring operators are text-only; range and ordering operators need
    /// an orderable type; equality and membership work everywhere.
    pub fn valid_for(&self, field_type: FieldType) -> bool {
        match self {
            FilterOp::Contains | FilterOp::StartsWith => field_type == FieldType::Text,
            FilterOp::GreaterThan | FilterOp::LessThan | FilterOp::Between => {
                field_type.is_orderable()
            }
            FilterOp::Equals | FilterOp::NotEquals | FilterOp::In => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Equals => "equals",
            FilterOp::NotEquals => "not_equals",
            FilterOp::GreaterThan => "greater_than",
            FilterOp::LessThan => "less_than",
            FilterOp::Contains => "contains",
            FilterOp::StartsWith => "starts_with",
            FilterOp::In => "in",
            FilterOp::Between => "between",
        }
    }
}

/// A filter's comparison value: one scalar, a membership list for `in`, or
/// an inclusive range for `between`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Scalar(ScalarValue),
    List(Vec<ScalarValue>),
    Range { from: ScalarValue, to: ScalarValue },
}

impl Default for FilterValue {
    fn default() -> Self {
        FilterValue::Scalar(ScalarValue::Null)
    }
}

impl FilterValue {
    pub fn scalar(value: impl Into<ScalarValue>) -> Self {
        FilterValue::Scalar(value.into())
    }
}

/// Logical connector binding a filter to the one before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterConnector {
    #[default]
    And,
    Or,
}

/// A declared join from the owning source's table to `target_table`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Join {
    pub target_table: String,
    pub on: JoinKey,
    #[serde(default)]
    pub kind: JoinKind,
}

/// Join key: equality between one column on each side, by bare field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinKey {
    pub left_field: String,
    pub right_field: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
        }
    }
}

/// A derived column computed from a formula over already-available columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedField {
    pub name: String,
    pub formula: String,
    pub result_type: FieldType,
}

/// How the result is visualized, and therefore aggregated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationSpec {
    pub chart: ChartKind,
    #[serde(default)]
    pub x_axis: Option<String>,
    #[serde(default)]
    pub y_axis: Option<String>,
    #[serde(default)]
    pub group_by: Option<String>,
    pub aggregation: AggregationKind,
    /// Rendering hints, opaque to the engine.
    #[serde(default)]
    pub hints: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    BarChart,
    LineChart,
    PieChart,
    Table,
    ScatterPlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    Sum,
    Avg,
    Count,
    Min,
    Max,
    DistinctCount,
}

impl AggregationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationKind::Sum => "sum",
            AggregationKind::Avg => "avg",
            AggregationKind::Count => "count",
            AggregationKind::Min => "min",
            AggregationKind::Max => "max",
            AggregationKind::DistinctCount => "distinct_count",
        }
    }

    /// Count is the only aggregation that works without a y-axis column;
    /// it then counts rows per group.
    pub fn requires_y_axis(&self) -> bool {
        !matches!(self, AggregationKind::Count)
    }
}

/// Which domain weighting transforms run, and over which rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainWeightingSettings {
    /// When set, only rows whose district column equals this value are
    /// weighted; other rows pass through untouched.
    #[serde(default)]
    pub district_filter: Option<String>,
    #[serde(default)]
    pub affluence_weighting: bool,
    #[serde(default)]
    pub seasonal_adjustment: bool,
    #[serde(default)]
    pub route_efficiency_weighting: bool,
}

impl DomainWeightingSettings {
    pub fn any_enabled(&self) -> bool {
        self.affluence_weighting || self.seasonal_adjustment || self.route_efficiency_weighting
    }
}

/// Runtime execution parameters supplied alongside a report id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionParams {
    /// Inclusive range applied to event-time columns at compile time.
    #[serde(default)]
    pub date_range: Option<DateRange>,
    /// Restrict district-typed columns to one district.
    #[serde(default)]
    pub district: Option<String>,
    /// Seasonal adjustment month (1-12), overriding the generation month.
    /// Keeps weighted executions replayable.
    #[serde(default)]
    pub month_override: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_type_compatibility() {
        assert!(FilterOp::Contains.valid_for(FieldType::Text));
        assert!(!FilterOp::Contains.valid_for(FieldType::Double));
        assert!(FilterOp::Between.valid_for(FieldType::Timestamp));
        assert!(!FilterOp::Between.valid_for(FieldType::Text));
        assert!(!FilterOp::GreaterThan.valid_for(FieldType::Bool));
        assert!(FilterOp::Equals.valid_for(FieldType::Bool));
        assert!(FilterOp::In.valid_for(FieldType::Long));
    }

    #[test]
    fn definition_round_trips_in_camel_case() {
        let def = ReportDefinition {
            id: "rpt-1".into(),
            name: "Completed jobs by district".into(),
            description: String::new(),
            visualization: VisualizationSpec {
                chart: ChartKind::BarChart,
                x_axis: None,
                y_axis: None,
                group_by: Some("district".into()),
                aggregation: AggregationKind::Count,
                hints: serde_json::Value::Null,
            },
            data_sources: vec![DataSource {
                id: "src-1".into(),
                backend: BackendKind::OperationalStore,
                table: "jobs".into(),
                field: None,
                filters: vec![Filter::new(
                    "status",
                    FilterOp::Equals,
                    FilterValue::scalar("completed"),
                )],
                joins: vec![],
                similarity: None,
            }],
            calculated_fields: vec![],
            weighting: None,
            owner: "ops".into(),
            shared: false,
            tags: vec!["district".into()],
        };

        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["dataSources"][0]["backend"], "operational-store");
        assert_eq!(json["dataSources"][0]["filters"][0]["op"], "equals");
        assert_eq!(json["visualization"]["groupBy"], "district");
        assert_eq!(json["visualization"]["aggregation"], "count");

        let back: ReportDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(back, def);
    }

    #[test]
    fn filter_values_deserialize_by_shape() {
        let scalar: FilterValue = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(scalar, FilterValue::scalar("completed"));

        let list: FilterValue = serde_json::from_str("[1, 2, 3]").unwrap();
        assert_eq!(
            list,
            FilterValue::List(vec![1i64.into(), 2i64.into(), 3i64.into()])
        );

        let range: FilterValue = serde_json::from_str(r#"{"from": 10, "to": 20}"#).unwrap();
        assert_eq!(
            range,
            FilterValue::Range {
                from: 10i64.into(),
                to: 20i64.into()
            }
        );
    }
}
