//! The backend adapter seam.
//!
//! Adapters are the only backend-aware code in the engine: each one turns
//! the abstract [`SubPlan`] into its store's native query form and hands
//! back plain rows. Everything upstream and downstream works on the
//! abstract row/column model and never names a client library.
//!
//! The orchestrator wraps every call in a per-adapter timeout and passes a
//! cancellation token; adapters are expected to check the token between
//! row batches so a cancelled call returns promptly instead of finishing
//! a scan nobody will read.

use std::collections::HashMap;
use std::sync::Arc;

use aeris_report_core::{BackendKind, Row};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::plan::SubPlan;

/// Rows fetched from one table within an adapter call, still bare
/// (un-namespaced); the merger qualifies them.
#[derive(Debug, Clone)]
pub struct FetchedRows {
    pub table: String,
    pub rows: Vec<Row>,
}

/// One backend's query executor.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Execute every scan in the sub-plan and return the rows per table.
    ///
    /// Implementations must observe `cancel` between batches and return
    /// [`crate::Error::Cancelled`] promptly when it fires, releasing
    /// whatever the scan held.
    async fn execute(&self, plan: &SubPlan, cancel: &CancellationToken) -> Result<Vec<FetchedRows>>;
}

/// The registered adapters, keyed by backend kind.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<BackendKind, Arc<dyn BackendAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        AdapterSet::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn BackendAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn BackendAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, kind: BackendKind) -> Option<&Arc<dyn BackendAdapter>> {
        self.adapters.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSet")
            .field("kinds", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
