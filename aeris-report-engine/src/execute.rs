//! The execution pipeline orchestrator.
//!
//! One call runs compile, parallel backend fetches, merge, calculated
//! fields, domain weighting, and aggregation, in that order, and hands
//! back an [`ExecutionResult`] with per-stage telemetry in its metadata.
//!
//! Only compilation can fail the pipeline (aside from cancellation).
//! Every later stage degrades instead: an adapter that errors or blows
//! its timeout costs a warning, a timing entry, and the `partial` flag,
//! never the execution. The caller gets whatever settled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use aeris_report_core::{
    cache_key, BackendKind, BackendTiming, ExecutionMetadata, ExecutionParams, ExecutionResult,
    ExecutionStage, ExecutionWarning, FetchOutcome, FieldDef, ReportDefinition, SourceCatalog,
};
use chrono::{DateTime, Datelike, Utc};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::backend::{AdapterSet, FetchedRows};
use crate::cache::ReportCache;
use crate::compile::compile;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::plan::{ExecutionPlan, SubPlan};
use crate::{aggregate, formula, merge, weighting};

/// The report execution engine: adapters, catalog, cache, configuration.
///
/// Cheap to share behind an [`Arc`]; executions borrow it concurrently.
#[derive(Debug)]
pub struct Executor {
    adapters: AdapterSet,
    catalog: SourceCatalog,
    cache: Arc<ReportCache>,
    config: EngineConfig,
}

impl Executor {
    pub fn new(adapters: AdapterSet, catalog: SourceCatalog, config: EngineConfig) -> Self {
        let cache = Arc::new(ReportCache::new(config.cache.clone()));
        Executor {
            adapters,
            catalog,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    /// Execute a report. See [`Executor::execute_cancellable`].
    pub async fn execute(
        &self,
        definition: &ReportDefinition,
        params: &ExecutionParams,
        use_cache: bool,
    ) -> Result<ExecutionResult> {
        self.execute_cancellable(definition, params, use_cache, CancellationToken::new())
            .await
    }

    /// Execute a report, observing `cancel`.
    ///
    /// With `use_cache`, concurrent executions of the same (definition,
    /// parameters) pair share one computation: the first request runs the
    /// pipeline, the rest wait and receive its result marked `from_cache`.
    /// Without it the pipeline always runs, but the result still lands in
    /// the cache for later callers.
    pub async fn execute_cancellable(
        &self,
        definition: &ReportDefinition,
        params: &ExecutionParams,
        use_cache: bool,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult> {
        let plan = compile(definition, params, &self.catalog)?;
        let key = cache_key(definition, params)?;
        let span = tracing::info_span!(
            "execute",
            report = %definition.id,
            key = %key,
            use_cache,
        );

        async move {
            tracing::debug!(plan = %plan.describe(), "compiled");

            if use_cache {
                let lookup_start = Instant::now();
                let (mut result, cached) = self
                    .cache
                    .get_or_compute(key, None, || self.run(&plan, params, &cancel))
                    .await?;
                if cached {
                    // Hit-side time, not the producing execution's.
                    result.metadata.from_cache = true;
                    result.metadata.execution_time = lookup_start.elapsed();
                }
                Ok(result)
            } else {
                // Bypass reads, not writes: the fresh result replaces
                // whatever the cache held for this key.
                let result = self.run(&plan, params, &cancel).await?;
                self.cache.put(key, &result, None);
                Ok(result)
            }
        }
        .instrument(span)
        .await
    }

    /// The pipeline proper, cache concerns excluded.
    async fn run(
        &self,
        plan: &ExecutionPlan,
        params: &ExecutionParams,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let start = Instant::now();
        let generated_at = Utc::now();
        let mut warnings: Vec<ExecutionWarning> = Vec::new();

        // Fetch every backend concurrently; the barrier collects all of
        // them even when some fail, so one slow store cannot void the rest.
        let fetches = plan.sub_plans.iter().map(|sub| self.fetch_one(sub, cancel));
        let settled = futures::future::join_all(fetches).await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut timings: Vec<BackendTiming> = Vec::new();
        let mut fetched: Vec<FetchedRows> = Vec::new();
        for outcome in settled {
            timings.push(outcome.timing);
            warnings.extend(outcome.warning);
            fetched.extend(outcome.rows);
        }
        let mut partial = timings
            .iter()
            .any(|t| t.outcome != FetchOutcome::Fetched);

        // The budget is checked at the barrier: a blown budget stops no
        // stage, it marks the result partial and lets the in-memory tail
        // of the pipeline finish on what settled.
        if start.elapsed() > self.config.execution_budget {
            partial = true;
            warnings.push(ExecutionWarning::new(
                ExecutionStage::Fetching,
                format!(
                    "execution budget of {}ms exceeded; assembling partial result",
                    self.config.execution_budget.as_millis()
                ),
            ));
        }

        let mut rows = merge::merge(fetched, &plan.joins, &plan.primary_table);

        warnings.extend(formula::apply(&mut rows, &plan.formulas));

        let mut warsaw_metrics = None;
        if let Some(settings) = plan.weighting.as_ref().filter(|s| s.any_enabled()) {
            let roles: HashMap<String, FieldDef> = self.catalog.qualified_fields();
            let month = resolve_month(params, generated_at);
            let (weighted, metrics) = weighting::apply(
                &rows,
                settings,
                &self.config.weighting,
                &roles,
                plan.district_column.as_deref(),
                month,
            );
            rows = weighted;
            warsaw_metrics = Some(metrics);
        }

        let rows = aggregate::aggregate(&rows, &plan.visualization);

        let mut backends_used: Vec<BackendKind> = Vec::new();
        for timing in &timings {
            if timing.outcome == FetchOutcome::Fetched && !backends_used.contains(&timing.backend) {
                backends_used.push(timing.backend);
            }
        }

        Ok(ExecutionResult {
            metadata: ExecutionMetadata {
                total_rows: rows.len(),
                execution_time: start.elapsed(),
                backends_used,
                generated_at,
                backend_timings: timings,
                warnings,
                partial,
                from_cache: false,
                warsaw_metrics,
            },
            rows,
        })
    }

    /// One adapter call under its timeout. Never errors except for
    /// cancellation (surfaced via the token at the barrier); degradation
    /// comes back as a timing entry plus a warning.
    async fn fetch_one(&self, sub: &SubPlan, cancel: &CancellationToken) -> FetchOutcomeRows {
        let started = Instant::now();
        let Some(adapter) = self.adapters.get(sub.backend) else {
            return FetchOutcomeRows {
                timing: BackendTiming {
                    backend: sub.backend,
                    elapsed: started.elapsed(),
                    rows: 0,
                    outcome: FetchOutcome::Failed,
                },
                rows: Vec::new(),
                warning: Some(ExecutionWarning::new(
                    ExecutionStage::Fetching,
                    format!("no adapter registered for backend '{}'", sub.backend),
                )),
            };
        };

        let call = adapter.execute(sub, cancel);
        match tokio::time::timeout(self.config.adapter_timeout, call).await {
            Ok(Ok(rows)) => {
                let row_count = rows.iter().map(|f| f.rows.len()).sum();
                FetchOutcomeRows {
                    timing: BackendTiming {
                        backend: sub.backend,
                        elapsed: started.elapsed(),
                        rows: row_count,
                        outcome: FetchOutcome::Fetched,
                    },
                    rows,
                    warning: None,
                }
            }
            Ok(Err(error)) => {
                tracing::warn!(backend = %sub.backend, %error, "backend fetch failed");
                FetchOutcomeRows {
                    timing: BackendTiming {
                        backend: sub.backend,
                        elapsed: started.elapsed(),
                        rows: 0,
                        outcome: FetchOutcome::Failed,
                    },
                    rows: Vec::new(),
                    warning: Some(ExecutionWarning::new(
                        ExecutionStage::Fetching,
                        format!("backend '{}' failed: {error}", sub.backend),
                    )),
                }
            }
            Err(_) => {
                tracing::warn!(
                    backend = %sub.backend,
                    timeout_ms = self.config.adapter_timeout.as_millis() as u64,
                    "backend fetch timed out"
                );
                FetchOutcomeRows {
                    timing: BackendTiming {
                        backend: sub.backend,
                        elapsed: started.elapsed(),
                        rows: 0,
                        outcome: FetchOutcome::TimedOut,
                    },
                    rows: Vec::new(),
                    warning: Some(ExecutionWarning::new(
                        ExecutionStage::Fetching,
                        format!(
                            "backend '{}' timed out after {}ms",
                            sub.backend,
                            self.config.adapter_timeout.as_millis()
                        ),
                    )),
                }
            }
        }
    }
}

struct FetchOutcomeRows {
    timing: BackendTiming,
    rows: Vec<FetchedRows>,
    warning: Option<ExecutionWarning>,
}

/// The month the seasonal factor keys off: an explicit override wins,
/// then the end of the requested date range, then the generation time.
fn resolve_month(params: &ExecutionParams, generated_at: DateTime<Utc>) -> u32 {
    if let Some(month) = params.month_override {
        if (1..=12).contains(&month) {
            return month;
        }
    }
    if let Some(range) = &params.date_range {
        return range.to.month();
    }
    generated_at.month()
}
