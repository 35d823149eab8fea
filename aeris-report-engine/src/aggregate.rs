//! Aggregator: group and reduce per the visualization.
//!
//! Rows group by the resolved `group_by` column (or form one whole-set
//! group without it); the declared aggregation reduces the `y_axis` column
//! per group. Numeric aggregates skip null and non-numeric cells: an
//! all-null group sums to null, never to a made-up zero — except `count`,
//! whose empty answer really is zero. Output is ordered by the x-axis
//! value (falling back to the group key) with a stable sort, so ties keep
//! first-seen row order. Empty input yields zero groups, not an error.

use std::collections::HashMap;

use aeris_report_core::{AggregationKind, Row, RowSet, ScalarValue};

use crate::plan::ResolvedVisualization;

/// Output column carrying the aggregate when no y-axis is declared.
const COUNT_COLUMN: &str = "count";

pub fn aggregate(rows: &RowSet, visualization: &ResolvedVisualization) -> RowSet {
    let span = tracing::debug_span!(
        "aggregate",
        rows_in = rows.len(),
        aggregation = visualization.aggregation.as_str(),
        groups = tracing::field::Empty,
    );
    let _enter = span.enter();

    // Group in first-seen order; the key is the group-by cell (a missing
    // cell groups under null, one bucket, not one per row).
    let mut order: Vec<ScalarValue> = Vec::new();
    let mut groups: HashMap<ScalarValue, Vec<&Row>> = HashMap::new();
    for row in rows {
        let key = match &visualization.group_by {
            Some(column) => row.get(column).cloned().unwrap_or(ScalarValue::Null),
            None => ScalarValue::Null,
        };
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(row);
    }
    if rows.is_empty() {
        span.record("groups", 0_u64);
        return RowSet::new();
    }

    let mut out: Vec<Row> = Vec::with_capacity(order.len());
    for key in order {
        let members = &groups[&key];
        let value = reduce(
            visualization.aggregation,
            visualization.y_axis.as_deref(),
            members,
        );

        let mut row = Row::new();
        if let Some(column) = &visualization.group_by {
            row.set(column.clone(), key);
        }
        if let Some(column) = &visualization.x_axis {
            if visualization.group_by.as_deref() != Some(column.as_str()) {
                // first-seen x value represents the group on that axis
                let first = members
                    .iter()
                    .find_map(|r| r.get(column))
                    .cloned()
                    .unwrap_or(ScalarValue::Null);
                row.set(column.clone(), first);
            }
        }
        let value_column = visualization
            .y_axis
            .clone()
            .unwrap_or_else(|| COUNT_COLUMN.to_owned());
        row.set(value_column, value);
        out.push(row);
    }

    // Stable sort by x-axis (or group key): ties break by first-seen order.
    let sort_column = visualization
        .x_axis
        .clone()
        .or_else(|| visualization.group_by.clone());
    if let Some(column) = sort_column {
        out.sort_by(|a, b| {
            let a = a.get(&column).unwrap_or(&ScalarValue::Null);
            let b = b.get(&column).unwrap_or(&ScalarValue::Null);
            a.cmp_values(b)
        });
    }

    span.record("groups", out.len() as u64);
    RowSet::from_rows(out)
}

fn reduce(kind: AggregationKind, y_axis: Option<&str>, members: &[&Row]) -> ScalarValue {
    let cells = || {
        members
            .iter()
            .filter_map(|row| y_axis.and_then(|column| row.get(column)))
            .filter(|v| !v.is_null())
    };
    match kind {
        AggregationKind::Count => {
            let count = match y_axis {
                Some(_) => cells().count(),
                None => members.len(),
            };
            ScalarValue::Long(count as i64)
        }
        AggregationKind::DistinctCount => {
            let mut distinct: Vec<&ScalarValue> = Vec::new();
            for value in cells() {
                if !distinct.iter().any(|seen| *seen == value) {
                    distinct.push(value);
                }
            }
            ScalarValue::Long(distinct.len() as i64)
        }
        AggregationKind::Sum => sum(cells()).unwrap_or(ScalarValue::Null),
        AggregationKind::Avg => {
            let numeric: Vec<f64> = cells().filter_map(ScalarValue::as_f64).collect();
            if numeric.is_empty() {
                ScalarValue::Null
            } else {
                ScalarValue::Double(numeric.iter().sum::<f64>() / numeric.len() as f64)
            }
        }
        AggregationKind::Min => cells()
            .filter(|v| v.is_numeric())
            .min_by(|a, b| a.cmp_values(b))
            .cloned()
            .unwrap_or(ScalarValue::Null),
        AggregationKind::Max => cells()
            .filter(|v| v.is_numeric())
            .max_by(|a, b| a.cmp_values(b))
            .cloned()
            .unwrap_or(ScalarValue::Null),
    }
}

/// Sum numeric cells: stays `Long` while every addend is a long and the
/// total fits, widens to `Double` otherwise. No numeric cells: `None`.
fn sum<'a>(cells: impl Iterator<Item = &'a ScalarValue>) -> Option<ScalarValue> {
    let mut long_acc: Option<i64> = None;
    let mut double_acc = 0.0;
    let mut widened = false;
    let mut any = false;
    for value in cells {
        match value {
            ScalarValue::Long(n) if !widened => {
                any = true;
                match long_acc.unwrap_or(0).checked_add(*n) {
                    Some(total) => long_acc = Some(total),
                    None => {
                        widened = true;
                        double_acc = long_acc.unwrap_or(0) as f64 + *n as f64;
                    }
                }
            }
            ScalarValue::Long(n) => {
                any = true;
                double_acc += *n as f64;
            }
            ScalarValue::Double(d) => {
                any = true;
                if !widened {
                    widened = true;
                    double_acc = long_acc.unwrap_or(0) as f64;
                }
                double_acc += d;
            }
            _ => {}
        }
    }
    match (any, widened) {
        (false, _) => None,
        (true, false) => Some(ScalarValue::Long(long_acc.unwrap_or(0))),
        (true, true) => Some(ScalarValue::Double(double_acc)),
    }
}
