//! Query compiler: report definition + runtime parameters + catalog in,
//! execution plan out.
//!
//! Compilation is a pure function and the only place a `ValidationError`
//! can be raised; everything that runs after it degrades instead of
//! failing. The compiler resolves every field against the catalog, checks
//! operator/type compatibility, parses calculated-field formulas exactly
//! once, rewrites their bare column references to the namespaced names
//! rows will carry after merging, and folds runtime parameters (date
//! range, district override) into additional filters.

use std::collections::{HashMap, HashSet};

use aeris_report_core::{
    BackendKind, DataSource, ExecutionParams, FieldRole, FieldType, FilterConnector, FilterOp,
    FilterValue, ReportDefinition, SourceCatalog,
};

use crate::error::{Error, Result};
use crate::formula::{self, CompiledFormula};
use crate::plan::{
    CompiledFilter, ExecutionPlan, PlannedJoin, ResolvedVisualization, SimilarityHint, SubPlan,
    TableScan,
};

/// Compile a report into per-backend sub-plans.
///
/// Fails with a validation error for: no data sources, unknown tables or
/// fields, operator/type mismatches, similarity requests on non-semantic
/// sources, duplicate calculated-field names, and formulas that fail to
/// parse or reference unknown, ambiguous, or not-yet-defined columns.
pub fn compile(
    definition: &ReportDefinition,
    params: &ExecutionParams,
    catalog: &SourceCatalog,
) -> Result<ExecutionPlan> {
    let span = tracing::debug_span!(
        "compile",
        report = %definition.id,
        sources = definition.data_sources.len(),
    );
    let _enter = span.enter();

    if definition.data_sources.is_empty() {
        return Err(Error::validation(format!(
            "report '{}' references no data sources",
            definition.id
        )));
    }

    let resolver = Resolver::build(definition, catalog)?;
    let joins = compile_joins(definition, catalog, &resolver)?;
    let formulas = compile_formulas(definition, &resolver)?;
    let visualization = resolve_visualization(definition, &resolver, &formulas)?;

    let mut needed = NeededColumns::default();
    for join in &joins {
        needed.add_qualified(&join.left_key);
        needed.add_qualified(&join.right_key);
    }
    for formula in &formulas {
        for reference in formula.expr.references() {
            needed.add_qualified(&reference);
        }
    }
    for column in [&visualization.x_axis, &visualization.y_axis, &visualization.group_by]
        .into_iter()
        .flatten()
    {
        needed.add_qualified(column);
    }

    let mut sub_plans: Vec<SubPlan> = Vec::new();
    for source in &definition.data_sources {
        if source.backend == BackendKind::Calculated {
            continue;
        }
        let scan = compile_scan(source, params, catalog, &needed)?;
        match sub_plans.iter_mut().find(|p| p.backend == source.backend) {
            Some(sub) => sub.scans.push(scan),
            None => sub_plans.push(SubPlan {
                backend: source.backend,
                scans: vec![scan],
            }),
        }
    }

    let primary_table = definition.data_sources[0].table.clone();
    let district_column = definition.data_sources.iter().find_map(|source| {
        let fields = catalog.fields_of(source.backend, &source.table)?;
        fields
            .iter()
            .find(|f| f.role == FieldRole::District)
            .map(|f| format!("{}.{}", source.table, f.name))
    });

    let plan = ExecutionPlan {
        sub_plans,
        joins,
        formulas,
        primary_table,
        visualization,
        weighting: definition.weighting.clone(),
        district_column,
    };
    tracing::debug!(report = %definition.id, plan = %plan.describe(), "compiled");
    Ok(plan)
}

fn compile_scan(
    source: &DataSource,
    params: &ExecutionParams,
    catalog: &SourceCatalog,
    needed: &NeededColumns,
) -> Result<TableScan> {
    let fields = catalog
        .fields_of(source.backend, &source.table)
        .ok_or_else(|| {
            Error::validation(format!(
                "unknown table '{}' on backend {}",
                source.table, source.backend
            ))
        })?;

    let lookup = |name: &str| fields.iter().find(|f| f.name == name);

    if let Some(field) = &source.field {
        if lookup(field).is_none() {
            return Err(Error::validation(format!(
                "field '{}' does not exist on {}.{}",
                field, source.backend, source.table
            )));
        }
    }

    if source.similarity.is_some() && source.backend != BackendKind::SemanticStore {
        return Err(Error::validation(format!(
            "similarity ranking requested on {} source '{}'; only the semantic store ranks",
            source.backend, source.id
        )));
    }

    let mut filters = Vec::with_capacity(source.filters.len());
    for filter in &source.filters {
        let def = lookup(&filter.field).ok_or_else(|| {
            Error::validation(format!(
                "filter references unknown field '{}' on table '{}'",
                filter.field, source.table
            ))
        })?;
        if !filter.op.valid_for(def.field_type) {
            return Err(Error::validation(format!(
                "operator '{}' is not valid for {} field '{}.{}'",
                filter.op.as_str(),
                def.field_type,
                source.table,
                filter.field
            )));
        }
        filters.push(CompiledFilter {
            field: filter.field.clone(),
            op: filter.op,
            value: filter.value.clone(),
            field_type: def.field_type,
            connector: filter.connector,
        });
    }

    // Runtime parameters compile into plain filters so adapters need no
    // special cases: the date range lands on the event-time column, the
    // district override on the district column, where the table has them.
    if let Some(range) = &params.date_range {
        if let Some(def) = fields.iter().find(|f| f.role == FieldRole::EventTime) {
            filters.push(CompiledFilter {
                field: def.name.clone(),
                op: FilterOp::Between,
                value: FilterValue::Range {
                    from: range.from.into(),
                    to: range.to.into(),
                },
                field_type: FieldType::Timestamp,
                connector: FilterConnector::And,
            });
        }
    }
    if let Some(district) = &params.district {
        if let Some(def) = fields.iter().find(|f| f.role == FieldRole::District) {
            filters.push(CompiledFilter {
                field: def.name.clone(),
                op: FilterOp::Equals,
                value: FilterValue::scalar(district.as_str()),
                field_type: def.field_type,
                connector: FilterConnector::And,
            });
        }
    }

    // A narrowed source still fetches the supporting columns later stages
    // read: join keys, visualization axes, formula inputs, and every
    // role-bearing column (weighting and parameter filters key off roles).
    let projection = source.field.as_ref().map(|field| {
        let mut out = vec![field.clone()];
        for def in fields {
            let wanted = def.role != FieldRole::None
                || needed.contains(&source.table, &def.name);
            if wanted && !out.contains(&def.name) {
                out.push(def.name.clone());
            }
        }
        out
    });

    Ok(TableScan {
        source_id: source.id.clone(),
        table: source.table.clone(),
        fields: projection,
        filters,
        similarity: source.similarity.as_ref().map(|s| SimilarityHint {
            reference: s.reference.clone(),
            floor: s.floor,
        }),
    })
}

fn compile_joins(
    definition: &ReportDefinition,
    catalog: &SourceCatalog,
    resolver: &Resolver,
) -> Result<Vec<PlannedJoin>> {
    let mut joins = Vec::new();
    for source in &definition.data_sources {
        for join in &source.joins {
            let target_backend = resolver.backend_of(&join.target_table).ok_or_else(|| {
                Error::validation(format!(
                    "join target '{}' is not a declared data source",
                    join.target_table
                ))
            })?;
            if catalog
                .field(source.backend, &source.table, &join.on.left_field)
                .is_none()
            {
                return Err(Error::validation(format!(
                    "join key '{}' does not exist on table '{}'",
                    join.on.left_field, source.table
                )));
            }
            if catalog
                .field(target_backend, &join.target_table, &join.on.right_field)
                .is_none()
            {
                return Err(Error::validation(format!(
                    "join key '{}' does not exist on table '{}'",
                    join.on.right_field, join.target_table
                )));
            }
            joins.push(PlannedJoin {
                left_table: source.table.clone(),
                right_table: join.target_table.clone(),
                left_key: format!("{}.{}", source.table, join.on.left_field),
                right_key: format!("{}.{}", join.target_table, join.on.right_field),
                kind: join.kind,
            });
        }
    }
    Ok(joins)
}

fn compile_formulas(
    definition: &ReportDefinition,
    resolver: &Resolver,
) -> Result<Vec<CompiledFormula>> {
    let mut seen: HashSet<&str> = HashSet::new();
    for field in &definition.calculated_fields {
        if !seen.insert(field.name.as_str()) {
            return Err(Error::validation(format!(
                "duplicate calculated field name '{}'",
                field.name
            )));
        }
    }

    let all_names: Vec<&str> = definition
        .calculated_fields
        .iter()
        .map(|f| f.name.as_str())
        .collect();

    let mut formulas: Vec<CompiledFormula> = Vec::with_capacity(definition.calculated_fields.len());
    for (index, field) in definition.calculated_fields.iter().enumerate() {
        let mut expr = formula::parse(&field.formula).map_err(|e| {
            Error::validation(format!("calculated field '{}': {e}", field.name))
        })?;

        // Earlier calculated fields are legal references; the field itself
        // and later ones are not, which rules out cycles by construction.
        let earlier = &all_names[..index];
        let mut rewrites: HashMap<String, String> = HashMap::new();
        for reference in expr.references() {
            if earlier.contains(&reference.as_str()) {
                continue;
            }
            if all_names[index..].contains(&reference.as_str()) {
                return Err(Error::validation(format!(
                    "calculated field '{}' references '{}' before it is defined",
                    field.name, reference
                )));
            }
            match resolver.resolve(&reference) {
                Resolution::Qualified(name) => {
                    if name != reference {
                        rewrites.insert(reference, name);
                    }
                }
                Resolution::Ambiguous(tables) => {
                    return Err(Error::validation(format!(
                        "calculated field '{}': column '{}' is ambiguous across tables {}",
                        field.name,
                        reference,
                        tables.join(", ")
                    )));
                }
                Resolution::Unknown => {
                    return Err(Error::validation(format!(
                        "calculated field '{}' references unknown column '{}'",
                        field.name, reference
                    )));
                }
            }
        }
        expr.rewrite_columns(&|name: &str| rewrites.get(name).cloned());

        formulas.push(CompiledFormula {
            name: field.name.clone(),
            expr,
            result_type: field.result_type,
        });
    }
    Ok(formulas)
}

fn resolve_visualization(
    definition: &ReportDefinition,
    resolver: &Resolver,
    formulas: &[CompiledFormula],
) -> Result<ResolvedVisualization> {
    let vis = &definition.visualization;
    if vis.y_axis.is_none() && vis.aggregation.requires_y_axis() {
        return Err(Error::validation(format!(
            "aggregation '{}' needs a y-axis field",
            vis.aggregation.as_str()
        )));
    }

    let resolve = |label: &str, column: &Option<String>| -> Result<Option<String>> {
        let Some(name) = column else { return Ok(None) };
        if formulas.iter().any(|f| &f.name == name) {
            return Ok(Some(name.clone()));
        }
        match resolver.resolve(name) {
            Resolution::Qualified(resolved) => Ok(Some(resolved)),
            Resolution::Ambiguous(tables) => Err(Error::validation(format!(
                "{label} column '{}' is ambiguous across tables {}",
                name,
                tables.join(", ")
            ))),
            Resolution::Unknown => Err(Error::validation(format!(
                "{label} references unknown column '{name}'"
            ))),
        }
    };

    Ok(ResolvedVisualization {
        chart: vis.chart,
        x_axis: resolve("x-axis", &vis.x_axis)?,
        y_axis: resolve("y-axis", &vis.y_axis)?,
        group_by: resolve("group-by", &vis.group_by)?,
        aggregation: vis.aggregation,
    })
}

enum Resolution {
    Qualified(String),
    Ambiguous(Vec<String>),
    Unknown,
}

/// Column name resolution over the report's declared sources: bare names
/// resolve to `table.column` when exactly one declared table carries them;
/// already-qualified names pass through once verified.
struct Resolver {
    /// Declared (table, backend) pairs, in declaration order.
    tables: Vec<(String, BackendKind)>,
    /// Bare field name to the tables declaring it.
    bare: HashMap<String, Vec<String>>,
    qualified: HashSet<String>,
}

impl Resolver {
    fn build(definition: &ReportDefinition, catalog: &SourceCatalog) -> Result<Self> {
        let mut tables = Vec::new();
        let mut bare: HashMap<String, Vec<String>> = HashMap::new();
        let mut qualified = HashSet::new();
        for source in &definition.data_sources {
            if source.backend == BackendKind::Calculated {
                continue;
            }
            let fields = catalog
                .fields_of(source.backend, &source.table)
                .ok_or_else(|| {
                    Error::validation(format!(
                        "unknown table '{}' on backend {}",
                        source.table, source.backend
                    ))
                })?;
            if tables.iter().any(|(t, _)| t == &source.table) {
                continue;
            }
            tables.push((source.table.clone(), source.backend));
            for field in fields {
                bare.entry(field.name.clone())
                    .or_default()
                    .push(source.table.clone());
                qualified.insert(format!("{}.{}", source.table, field.name));
            }
        }
        Ok(Resolver {
            tables,
            bare,
            qualified,
        })
    }

    fn backend_of(&self, table: &str) -> Option<BackendKind> {
        self.tables
            .iter()
            .find(|(t, _)| t == table)
            .map(|(_, backend)| *backend)
    }

    fn resolve(&self, name: &str) -> Resolution {
        if self.qualified.contains(name) {
            return Resolution::Qualified(name.to_owned());
        }
        match self.bare.get(name).map(Vec::as_slice) {
            Some([table]) => Resolution::Qualified(format!("{table}.{name}")),
            Some(tables) if tables.len() > 1 => Resolution::Ambiguous(tables.to_vec()),
            _ => Resolution::Unknown,
        }
    }
}

/// Columns later pipeline stages read, keyed by their namespaced names.
/// Used to widen narrowed-source projections.
#[derive(Default)]
struct NeededColumns {
    by_table: HashMap<String, HashSet<String>>,
}

impl NeededColumns {
    fn add_qualified(&mut self, qualified: &str) {
        if let Some((table, column)) = qualified.split_once('.') {
            self.by_table
                .entry(table.to_owned())
                .or_default()
                .insert(column.to_owned());
        }
    }

    fn contains(&self, table: &str, column: &str) -> bool {
        self.by_table
            .get(table)
            .is_some_and(|columns| columns.contains(column))
    }
}
