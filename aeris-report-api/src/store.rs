//! The report definition persistence seam.
//!
//! The engine never persists anything itself; it reads definitions through
//! [`ReportStore`] and leaves storage to the surrounding platform. The
//! in-memory implementation below backs tests and demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use aeris_report_core::{
    CalculatedField, DataSource, DomainWeightingSettings, ReportDefinition, VisualizationSpec,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

/// What a shared principal may do with a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharePermission {
    View,
    Edit,
}

/// Partial update: only the populated fields change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visualization: Option<VisualizationSpec>,
    #[serde(default)]
    pub data_sources: Option<Vec<DataSource>>,
    #[serde(default)]
    pub calculated_fields: Option<Vec<CalculatedField>>,
    #[serde(default)]
    pub weighting: Option<Option<DomainWeightingSettings>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl ReportPatch {
    fn apply(self, definition: &mut ReportDefinition) {
        if let Some(name) = self.name {
            definition.name = name;
        }
        if let Some(description) = self.description {
            definition.description = description;
        }
        if let Some(visualization) = self.visualization {
            definition.visualization = visualization;
        }
        if let Some(data_sources) = self.data_sources {
            definition.data_sources = data_sources;
        }
        if let Some(calculated_fields) = self.calculated_fields {
            definition.calculated_fields = calculated_fields;
        }
        if let Some(weighting) = self.weighting {
            definition.weighting = weighting;
        }
        if let Some(tags) = self.tags {
            definition.tags = tags;
        }
    }
}

/// List constraints; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub owner: Option<String>,
    pub tag: Option<String>,
}

/// Persistence collaborator for report definitions.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<ReportDefinition>;

    async fn list(&self, filter: ListFilter) -> Result<Vec<ReportDefinition>>;

    /// Store a definition and return its id. A definition without an id is
    /// assigned one.
    async fn create(&self, definition: ReportDefinition) -> Result<String>;

    async fn update(&self, id: &str, patch: ReportPatch) -> Result<ReportDefinition>;

    async fn remove(&self, id: &str) -> Result<()>;

    async fn share(&self, id: &str, principal: &str, permission: SharePermission) -> Result<()>;
}

/// In-memory store for tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryReportStore {
    reports: RwLock<HashMap<String, ReportDefinition>>,
    shares: RwLock<HashMap<String, HashMap<String, SharePermission>>>,
    next_id: AtomicU64,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        InMemoryReportStore::default()
    }

    /// Who a report is shared with, and how.
    pub fn shares_of(&self, id: &str) -> HashMap<String, SharePermission> {
        self.shares
            .read()
            .expect("share lock poisoned")
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn get(&self, id: &str) -> Result<ReportDefinition> {
        self.reports
            .read()
            .expect("report lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(id))
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<ReportDefinition>> {
        let reports = self.reports.read().expect("report lock poisoned");
        let mut out: Vec<ReportDefinition> = reports
            .values()
            .filter(|def| {
                filter
                    .owner
                    .as_deref()
                    .map_or(true, |owner| def.owner == owner)
            })
            .filter(|def| {
                filter
                    .tag
                    .as_deref()
                    .map_or(true, |tag| def.tags.iter().any(|t| t == tag))
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn create(&self, mut definition: ReportDefinition) -> Result<String> {
        if definition.id.is_empty() {
            let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            definition.id = format!("rpt-{n}");
        }
        let id = definition.id.clone();
        self.reports
            .write()
            .expect("report lock poisoned")
            .insert(id.clone(), definition);
        Ok(id)
    }

    async fn update(&self, id: &str, patch: ReportPatch) -> Result<ReportDefinition> {
        let mut reports = self.reports.write().expect("report lock poisoned");
        let definition = reports
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(id))?;
        patch.apply(definition);
        Ok(definition.clone())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let removed = self
            .reports
            .write()
            .expect("report lock poisoned")
            .remove(id);
        self.shares.write().expect("share lock poisoned").remove(id);
        match removed {
            Some(_) => Ok(()),
            None => Err(ApiError::not_found(id)),
        }
    }

    async fn share(&self, id: &str, principal: &str, permission: SharePermission) -> Result<()> {
        let mut reports = self.reports.write().expect("report lock poisoned");
        let definition = reports
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(id))?;
        definition.shared = true;
        self.shares
            .write()
            .expect("share lock poisoned")
            .entry(id.to_owned())
            .or_default()
            .insert(principal.to_owned(), permission);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeris_report_core::{AggregationKind, BackendKind, ChartKind};

    fn definition(id: &str, owner: &str, tags: &[&str]) -> ReportDefinition {
        ReportDefinition {
            id: id.into(),
            name: format!("report {id}"),
            description: String::new(),
            visualization: VisualizationSpec {
                chart: ChartKind::Table,
                x_axis: None,
                y_axis: None,
                group_by: None,
                aggregation: AggregationKind::Count,
                hints: serde_json::Value::Null,
            },
            data_sources: vec![DataSource {
                id: "src-1".into(),
                backend: BackendKind::OperationalStore,
                table: "jobs".into(),
                field: None,
                filters: vec![],
                joins: vec![],
                similarity: None,
            }],
            calculated_fields: vec![],
            weighting: None,
            owner: owner.into(),
            shared: false,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let store = InMemoryReportStore::new();
        let id = store
            .create(definition("", "anna", &["hvac"]))
            .await
            .unwrap();
        assert!(id.starts_with("rpt-"));

        let fetched = store.get(&id).await.unwrap();
        assert_eq!(fetched.owner, "anna");

        let patched = store
            .update(
                &id,
                ReportPatch {
                    name: Some("renamed".into()),
                    ..ReportPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(patched.name, "renamed");
        assert_eq!(patched.owner, "anna");

        store.remove(&id).await.unwrap();
        assert!(matches!(
            store.get(&id).await.unwrap_err(),
            ApiError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn list_filters_by_owner_and_tag() {
        let store = InMemoryReportStore::new();
        store
            .create(definition("r1", "anna", &["hvac"]))
            .await
            .unwrap();
        store
            .create(definition("r2", "anna", &["billing"]))
            .await
            .unwrap();
        store
            .create(definition("r3", "piotr", &["hvac"]))
            .await
            .unwrap();

        let annas = store
            .list(ListFilter {
                owner: Some("anna".into()),
                tag: None,
            })
            .await
            .unwrap();
        assert_eq!(annas.len(), 2);

        let hvac = store
            .list(ListFilter {
                owner: None,
                tag: Some("hvac".into()),
            })
            .await
            .unwrap();
        let ids: Vec<&str> = hvac.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r3"]);
    }

    #[tokio::test]
    async fn sharing_marks_the_definition() {
        let store = InMemoryReportStore::new();
        store
            .create(definition("r1", "anna", &[]))
            .await
            .unwrap();
        store
            .share("r1", "piotr", SharePermission::View)
            .await
            .unwrap();

        assert!(store.get("r1").await.unwrap().shared);
        assert_eq!(
            store.shares_of("r1").get("piotr"),
            Some(&SharePermission::View)
        );
        assert!(store
            .share("missing", "piotr", SharePermission::Edit)
            .await
            .is_err());
    }
}
