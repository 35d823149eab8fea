//! Core data model for the Aeris report execution engine.
//!
//! This crate is runtime-agnostic and carries no engine logic: scalar
//! values, rows, the data source catalog, the report definition model,
//! canonical cache-key hashing, and execution results. The execution
//! pipeline itself lives in `aeris-report-engine`; the caller-facing
//! service in `aeris-report-api`.

pub mod canonical;
pub mod catalog;
pub mod error;
pub mod report;
pub mod result;
pub mod row;
pub mod value;

pub use canonical::{cache_key, canonical_json, normalize_formula, CacheKey};
pub use catalog::{BackendKind, FieldDef, FieldRole, FieldType, SourceCatalog};
pub use error::{Error, Result};
pub use report::{
    AggregationKind, CalculatedField, ChartKind, DataSource, DateRange, DomainWeightingSettings,
    ExecutionParams, Filter, FilterConnector, FilterOp, FilterValue, Join, JoinKey, JoinKind,
    ReportDefinition, SimilaritySpec, VisualizationSpec,
};
pub use result::{
    BackendTiming, ExecutionMetadata, ExecutionResult, ExecutionStage, ExecutionWarning,
    FetchOutcome, WarsawMetrics,
};
pub use row::{Row, RowSet};
pub use value::ScalarValue;

/// Common imports for code working with the report model.
pub mod prelude {
    pub use crate::canonical::{cache_key, CacheKey};
    pub use crate::catalog::{BackendKind, FieldDef, FieldRole, FieldType, SourceCatalog};
    pub use crate::error::{Error, Result};
    pub use crate::report::{
        AggregationKind, CalculatedField, ChartKind, DataSource, DomainWeightingSettings,
        ExecutionParams, Filter, FilterOp, FilterValue, Join, JoinKind, ReportDefinition,
        VisualizationSpec,
    };
    pub use crate::result::{ExecutionMetadata, ExecutionResult, ExecutionStage};
    pub use crate::row::{Row, RowSet};
    pub use crate::value::ScalarValue;
}
