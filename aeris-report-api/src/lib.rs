//! Caller-facing service layer over the Aeris report execution engine.
//!
//! This crate owns the seams the surrounding platform plugs into: the
//! [`ReportStore`] persistence trait (with an in-memory reference
//! implementation), the [`ReportService`] entry point that executes stored
//! reports by id, and the wire envelopes (`ReportResponse` on success,
//! `ReportError` on failure, both camelCase JSON).

pub mod error;
pub mod service;
pub mod store;

pub use error::{ApiError, ReportError, Result, Severity};
pub use service::{ReportResponse, ReportService, ResponseMetadata};
pub use store::{InMemoryReportStore, ListFilter, ReportPatch, ReportStore, SharePermission};
