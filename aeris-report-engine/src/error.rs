//! Engine error taxonomy.
//!
//! Only `Validation` aborts an execution outright, and it is raised before
//! any backend call. Every other class degrades: backends drop out of the
//! merge, formula failures null one cell, cache corruption becomes a miss,
//! and a blown budget flags the result partial. The orchestrator converts
//! those into metadata warnings rather than letting them surface.

use aeris_report_core::BackendKind;
use thiserror::Error;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed report definition: missing data sources, unknown field,
    /// operator/type mismatch, bad formula. Fatal; fix the definition.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An adapter call failed or timed out.
    #[error("Backend {backend} unavailable: {message}")]
    BackendUnavailable {
        backend: BackendKind,
        message: String,
    },

    /// A calculated-field formula failed for some row at evaluation time.
    ///
    /// The pipeline itself degrades formula failures to `Calculating`
    /// warnings with a nulled cell; this variant backs the
    /// `report/formula` wire code for callers that promote those
    /// warnings to hard failures.
    #[error("Formula '{field}' failed: {message}")]
    Formula { field: String, message: String },

    /// A cached entry failed to deserialize.
    #[error("Cache entry corrupt: {0}")]
    CacheCorruption(String),

    /// The whole-pipeline budget was exceeded.
    ///
    /// The pipeline itself degrades a blown budget to a partial result
    /// with a warning; this variant backs the `report/timeout` wire code
    /// for callers that enforce the budget as a hard deadline.
    #[error("Execution exceeded budget of {budget_ms}ms")]
    Timeout { budget_ms: u64 },

    /// The caller cancelled the execution.
    #[error("Execution cancelled")]
    Cancelled,

    #[error(transparent)]
    Core(#[from] aeris_report_core::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn backend_unavailable(backend: BackendKind, msg: impl Into<String>) -> Self {
        Error::BackendUnavailable {
            backend,
            message: msg.into(),
        }
    }

    pub fn formula(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Formula {
            field: field.into(),
            message: msg.into(),
        }
    }

    pub fn cache_corruption(msg: impl Into<String>) -> Self {
        Error::CacheCorruption(msg.into())
    }

    /// Whether a retry may help. False means the report definition itself
    /// must change before the request can succeed.
    pub fn recoverable(&self) -> bool {
        !matches!(
            self,
            Error::Validation(_) | Error::Core(aeris_report_core::Error::Validation(_))
        )
    }
}
