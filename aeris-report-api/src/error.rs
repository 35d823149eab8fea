//! API error taxonomy and the wire-shape failure envelope.
//!
//! Every error carries a stable `report/*` code so callers can branch
//! without parsing messages, and a `recoverable` flag telling them whether
//! a retry can possibly help: `false` means the report definition itself
//! has to change first.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Report '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Engine(#[from] aeris_report_engine::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(id: impl Into<String>) -> Self {
        ApiError::NotFound(id.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::Internal(msg.into())
    }

    /// Stable error code for the wire.
    pub fn code(&self) -> &'static str {
        use aeris_report_engine::Error as Engine;
        match self {
            ApiError::NotFound(_) => "report/not-found",
            ApiError::Internal(_) => "report/internal",
            ApiError::Engine(e) => match e {
                Engine::Validation(_) => "report/validation",
                Engine::BackendUnavailable { .. } => "report/backend-unavailable",
                Engine::Formula { .. } => "report/formula",
                Engine::CacheCorruption(_) => "report/cache-corruption",
                Engine::Timeout { .. } => "report/timeout",
                Engine::Cancelled => "report/cancelled",
                Engine::Core(aeris_report_core::Error::Validation(_)) => "report/validation",
                Engine::Core(aeris_report_core::Error::Serialization(_)) => "report/internal",
            },
        }
    }

    /// Whether retrying the same request can succeed.
    pub fn recoverable(&self) -> bool {
        match self {
            ApiError::NotFound(_) => false,
            ApiError::Internal(_) => true,
            ApiError::Engine(e) => e.recoverable(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ApiError::Internal(_) => Severity::Error,
            _ if self.recoverable() => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// How a caller should surface the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Transient; a retry or a different parameter set may succeed.
    Warning,
    /// The request as posed cannot succeed.
    Error,
}

/// The failure envelope returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportError {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub recoverable: bool,
}

impl From<&ApiError> for ReportError {
    fn from(error: &ApiError) -> Self {
        ReportError {
            code: error.code().to_owned(),
            message: error.to_string(),
            severity: error.severity(),
            recoverable: error.recoverable(),
        }
    }
}

impl From<ApiError> for ReportError {
    fn from(error: ApiError) -> Self {
        ReportError::from(&error)
    }
}
