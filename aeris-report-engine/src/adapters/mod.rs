//! Reference backend adapters.
//!
//! Three in-memory stores, one per backend kind, seedable for tests and
//! demos. Each translates compiled scans its own way: the operational
//! store evaluates filters per document, the analytical store builds
//! row-index masks per column, the semantic store ranks documents by
//! cosine similarity. The shared predicate logic below is the abstract
//! part; how each store walks its data is the backend-specific part.

mod analytical;
mod operational;
mod semantic;

pub use analytical::AnalyticalStore;
pub use operational::OperationalStore;
pub use semantic::SemanticStore;

use std::cmp::Ordering;

use aeris_report_core::{FieldType, FilterConnector, FilterValue, Row, ScalarValue};

use crate::plan::CompiledFilter;

/// Fold an ordered filter list over one row, left to right through each
/// filter's connector, exactly as declared. An empty list accepts.
pub(crate) fn row_matches(row: &Row, filters: &[CompiledFilter]) -> bool {
    let mut iter = filters.iter();
    let Some(first) = iter.next() else { return true };
    let mut acc = filter_matches(row.get(first.field.as_str()), first);
    for filter in iter {
        let hit = filter_matches(row.get(filter.field.as_str()), filter);
        acc = match filter.connector {
            FilterConnector::And => acc && hit,
            FilterConnector::Or => acc || hit,
        };
    }
    acc
}

/// Evaluate one filter against one cell. Absent cells behave as null:
/// they fail every predicate except `not_equals` against a non-null value.
pub(crate) fn filter_matches(cell: Option<&ScalarValue>, filter: &CompiledFilter) -> bool {
    use aeris_report_core::FilterOp::*;
    let cell = cell.unwrap_or(&ScalarValue::Null);
    match (&filter.op, &filter.value) {
        (Equals, FilterValue::Scalar(expected)) => compare(cell, expected, filter.field_type)
            .is_some_and(|o| o == Ordering::Equal),
        (NotEquals, FilterValue::Scalar(expected)) => {
            !compare(cell, expected, filter.field_type).is_some_and(|o| o == Ordering::Equal)
        }
        (GreaterThan, FilterValue::Scalar(expected)) => {
            compare(cell, expected, filter.field_type).is_some_and(|o| o == Ordering::Greater)
        }
        (LessThan, FilterValue::Scalar(expected)) => {
            compare(cell, expected, filter.field_type).is_some_and(|o| o == Ordering::Less)
        }
        (Contains, FilterValue::Scalar(ScalarValue::String(needle))) => {
            cell.as_str().is_some_and(|s| s.contains(needle.as_str()))
        }
        (StartsWith, FilterValue::Scalar(ScalarValue::String(prefix))) => {
            cell.as_str().is_some_and(|s| s.starts_with(prefix.as_str()))
        }
        (In, FilterValue::List(values)) => values.iter().any(|v| {
            compare(cell, v, filter.field_type).is_some_and(|o| o == Ordering::Equal)
        }),
        (Between, FilterValue::Range { from, to }) => {
            let lower = compare(cell, from, filter.field_type);
            let upper = compare(cell, to, filter.field_type);
            lower.is_some_and(|o| o != Ordering::Less)
                && upper.is_some_and(|o| o != Ordering::Greater)
        }
        // Operator given a value shape it cannot use; matches nothing.
        _ => false,
    }
}

/// Compare a cell against a filter value under the field's declared type.
/// Timestamp columns coerce RFC 3339 strings on either side, since
/// document stores hold timestamps as strings. Null never compares.
fn compare(cell: &ScalarValue, expected: &ScalarValue, field_type: FieldType) -> Option<Ordering> {
    if cell.is_null() || expected.is_null() {
        return None;
    }
    if field_type == FieldType::Timestamp {
        let (a, b) = (cell.as_timestamp()?, expected.as_timestamp()?);
        return Some(a.cmp(&b));
    }
    // Mixed kinds (outside the numeric class) mean the filter value does
    // not fit the column; no match rather than a kind-rank comparison.
    let same_class = cell.is_numeric() && expected.is_numeric()
        || std::mem::discriminant(cell) == std::mem::discriminant(expected);
    same_class.then(|| cell.cmp_values(expected))
}

/// Project a row down to the scan's field list; `None` keeps everything.
pub(crate) fn project(row: Row, fields: Option<&[String]>) -> Row {
    match fields {
        None => row,
        Some(keep) => row
            .into_iter()
            .filter(|(name, _)| keep.iter().any(|k| k == name))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeris_report_core::FilterOp;

    fn filter(
        field: &str,
        op: FilterOp,
        value: FilterValue,
        field_type: FieldType,
    ) -> CompiledFilter {
        CompiledFilter {
            field: field.into(),
            op,
            value,
            field_type,
            connector: FilterConnector::And,
        }
    }

    fn job(status: &str, hours: i64) -> Row {
        let mut row = Row::new();
        row.set("status", status);
        row.set("hours", hours);
        row
    }

    #[test]
    fn connector_folds_left_to_right() {
        let filters = vec![
            filter(
                "status",
                FilterOp::Equals,
                FilterValue::scalar("completed"),
                FieldType::Text,
            ),
            CompiledFilter {
                connector: FilterConnector::Or,
                ..filter(
                    "hours",
                    FilterOp::GreaterThan,
                    FilterValue::scalar(10i64),
                    FieldType::Long,
                )
            },
        ];
        assert!(row_matches(&job("completed", 2), &filters));
        assert!(row_matches(&job("open", 12), &filters));
        assert!(!row_matches(&job("open", 2), &filters));
    }

    #[test]
    fn text_operators() {
        let contains = filter(
            "status",
            FilterOp::Contains,
            FilterValue::scalar("omp"),
            FieldType::Text,
        );
        let starts = filter(
            "status",
            FilterOp::StartsWith,
            FilterValue::scalar("comp"),
            FieldType::Text,
        );
        let row = job("completed", 1);
        assert!(filter_matches(row.get("status"), &contains));
        assert!(filter_matches(row.get("status"), &starts));
        assert!(!filter_matches(row.get("hours"), &contains));
    }

    #[test]
    fn membership_and_range() {
        let in_list = filter(
            "hours",
            FilterOp::In,
            FilterValue::List(vec![1i64.into(), 2i64.into()]),
            FieldType::Long,
        );
        let between = filter(
            "hours",
            FilterOp::Between,
            FilterValue::Range {
                from: 2i64.into(),
                to: 8i64.into(),
            },
            FieldType::Long,
        );
        assert!(filter_matches(job("x", 2).get("hours"), &in_list));
        assert!(!filter_matches(job("x", 5).get("hours"), &in_list));
        assert!(filter_matches(job("x", 2).get("hours"), &between));
        assert!(filter_matches(job("x", 8).get("hours"), &between));
        assert!(!filter_matches(job("x", 9).get("hours"), &between));
    }

    #[test]
    fn timestamp_columns_coerce_strings() {
        let between = filter(
            "completed_at",
            FilterOp::Between,
            FilterValue::Range {
                from: ScalarValue::String("2026-01-01T00:00:00Z".into()),
                to: ScalarValue::String("2026-02-01T00:00:00Z".into()),
            },
            FieldType::Timestamp,
        );
        let mut row = Row::new();
        row.set("completed_at", "2026-01-15T09:00:00Z");
        assert!(filter_matches(row.get("completed_at"), &between));
        row.set("completed_at", "2026-03-01T09:00:00Z");
        assert!(!filter_matches(row.get("completed_at"), &between));
    }

    #[test]
    fn null_and_missing_cells() {
        let eq = filter(
            "status",
            FilterOp::Equals,
            FilterValue::scalar("completed"),
            FieldType::Text,
        );
        let neq = filter(
            "status",
            FilterOp::NotEquals,
            FilterValue::scalar("completed"),
            FieldType::Text,
        );
        let empty = Row::new();
        assert!(!filter_matches(empty.get("status"), &eq));
        assert!(filter_matches(empty.get("status"), &neq));
    }

    #[test]
    fn mismatched_kinds_never_match() {
        let eq = filter(
            "hours",
            FilterOp::Equals,
            FilterValue::scalar("2"),
            FieldType::Long,
        );
        assert!(!filter_matches(job("x", 2).get("hours"), &eq));
    }
}
