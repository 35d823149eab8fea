//! Data source catalog: which fields exist on which backend and table,
//! with their declared types and domain roles.
//!
//! The catalog is registered once at engine construction and read by the
//! query compiler for validation and column resolution. Adapters never see
//! it; compiled plans carry any type information they need.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The kind of backing store a data source reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Document-oriented operational store (jobs, contacts, invoices).
    OperationalStore,
    /// Columnar analytical store (rollups, historical measures).
    AnalyticalStore,
    /// Vector store with similarity ranking over embedded documents.
    SemanticStore,
    /// No backend at all: rows produced by calculated fields only.
    Calculated,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::OperationalStore => "operational-store",
            BackendKind::AnalyticalStore => "analytical-store",
            BackendKind::SemanticStore => "semantic-store",
            BackendKind::Calculated => "calculated",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a catalog field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Long,
    Double,
    Bool,
    Timestamp,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Long | FieldType::Double)
    }

    /// Types that support range and ordering comparisons.
    pub fn is_orderable(&self) -> bool {
        matches!(self, FieldType::Long | FieldType::Double | FieldType::Timestamp)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::Bool => "bool",
            FieldType::Timestamp => "timestamp",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain role of a field, driving which columns the weighting module
/// touches. Roles live in catalog registration, not in engine logic, so a
/// deployment can re-designate columns without a code change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    #[default]
    None,
    /// Money amounts; scaled by district affluence.
    Currency,
    /// Demand/volume measures; scaled by the seasonal factor.
    Demand,
    /// Cost amounts; reduced by the route-efficiency discount.
    Cost,
    /// Route efficiency score in `[0, 1]`; its presence marks a row as
    /// having route data.
    RouteEfficiency,
    /// District name column used to key affluence weighting.
    District,
    /// Event timestamp column that runtime date-range parameters filter on.
    EventTime,
}

/// One registered field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub role: FieldRole,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDef {
            name: name.into(),
            field_type,
            role: FieldRole::None,
        }
    }

    pub fn with_role(mut self, role: FieldRole) -> Self {
        self.role = role;
        self
    }
}

/// Registered metadata for every (backend, table) pair the engine may read.
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    tables: HashMap<(BackendKind, String), Vec<FieldDef>>,
}

impl SourceCatalog {
    pub fn new() -> Self {
        SourceCatalog::default()
    }

    pub fn register(
        &mut self,
        backend: BackendKind,
        table: impl Into<String>,
        fields: Vec<FieldDef>,
    ) {
        self.tables.insert((backend, table.into()), fields);
    }

    /// Builder-style registration for fixture setup.
    pub fn with_table(
        mut self,
        backend: BackendKind,
        table: impl Into<String>,
        fields: Vec<FieldDef>,
    ) -> Self {
        self.register(backend, table, fields);
        self
    }

    pub fn contains_table(&self, backend: BackendKind, table: &str) -> bool {
        self.tables.contains_key(&(backend, table.to_owned()))
    }

    pub fn field(&self, backend: BackendKind, table: &str, name: &str) -> Option<&FieldDef> {
        self.fields_of(backend, table)?
            .iter()
            .find(|f| f.name == name)
    }

    pub fn fields_of(&self, backend: BackendKind, table: &str) -> Option<&[FieldDef]> {
        self.tables
            .get(&(backend, table.to_owned()))
            .map(Vec::as_slice)
    }

    /// Iterate every registered (backend, table, fields) entry.
    pub fn entries(&self) -> impl Iterator<Item = (BackendKind, &str, &[FieldDef])> {
        self.tables
            .iter()
            .map(|((backend, table), fields)| (*backend, table.as_str(), fields.as_slice()))
    }

    /// Map of `table.field` to its definition, across all backends.
    ///
    /// Used by stages that run after merging, when rows carry namespaced
    /// columns and the backend distinction no longer matters. If two
    /// backends register the same table name the first match wins; table
    /// names are expected to be globally unique in practice.
    pub fn qualified_fields(&self) -> HashMap<String, FieldDef> {
        let mut out = HashMap::new();
        for ((_, table), fields) in &self.tables {
            for field in fields {
                out.entry(format!("{table}.{}", field.name))
                    .or_insert_with(|| field.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SourceCatalog {
        SourceCatalog::new().with_table(
            BackendKind::OperationalStore,
            "jobs",
            vec![
                FieldDef::new("district", FieldType::Text).with_role(FieldRole::District),
                FieldDef::new("revenue", FieldType::Double).with_role(FieldRole::Currency),
                FieldDef::new("status", FieldType::Text),
            ],
        )
    }

    #[test]
    fn lookup_by_backend_table_and_name() {
        let c = catalog();
        assert!(c.contains_table(BackendKind::OperationalStore, "jobs"));
        assert!(!c.contains_table(BackendKind::AnalyticalStore, "jobs"));
        let f = c
            .field(BackendKind::OperationalStore, "jobs", "revenue")
            .unwrap();
        assert_eq!(f.field_type, FieldType::Double);
        assert_eq!(f.role, FieldRole::Currency);
        assert!(c.field(BackendKind::OperationalStore, "jobs", "nope").is_none());
    }

    #[test]
    fn qualified_index_spans_tables() {
        let index = catalog().qualified_fields();
        assert_eq!(index["jobs.district"].role, FieldRole::District);
        assert_eq!(index["jobs.status"].role, FieldRole::None);
    }

    #[test]
    fn backend_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&BackendKind::OperationalStore).unwrap(),
            "\"operational-store\""
        );
        assert_eq!(
            serde_json::to_string(&BackendKind::SemanticStore).unwrap(),
            "\"semantic-store\""
        );
    }
}
