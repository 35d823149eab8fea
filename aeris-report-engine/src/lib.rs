//! The Aeris report execution engine.
//!
//! A report definition plus runtime parameters goes in; a row/column table
//! with execution metadata comes out. The pipeline runs in fixed stages:
//!
//! 1. [`compile`] validates the definition against the source catalog and
//!    produces an [`ExecutionPlan`] with filters typed, columns namespaced,
//!    and formulas parsed.
//! 2. Backend adapters fetch every sub-plan concurrently, each under its
//!    own timeout.
//! 3. [`merge`] joins the fetched tables into one namespaced row set.
//! 4. Calculated-field [`formula`]s evaluate per row.
//! 5. Domain [`weighting`] applies the district affluence, seasonal, and
//!    route-efficiency transforms when the definition enables them.
//! 6. [`aggregate`] groups and reduces per the visualization.
//!
//! Results are cached by a canonical content hash with TTL, LRU eviction,
//! and single-flight computation sharing. Validation is the only fatal
//! error class: a backend that fails or times out degrades the result to
//! `partial` with warnings instead of failing the execution.

pub mod adapters;
pub mod aggregate;
pub mod backend;
pub mod cache;
pub mod compile;
pub mod config;
pub mod error;
pub mod execute;
pub mod formula;
pub mod merge;
pub mod plan;
pub mod weighting;

pub use backend::{AdapterSet, BackendAdapter, FetchedRows};
pub use cache::{CacheStats, ReportCache};
pub use compile::compile;
pub use config::{CacheConfig, EngineConfig, WeightingConfig};
pub use error::{Error, Result};
pub use execute::Executor;
pub use plan::{ExecutionPlan, PlannedJoin, ResolvedVisualization, SubPlan, TableScan};
