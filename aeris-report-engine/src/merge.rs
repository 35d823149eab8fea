//! Result merger: one unified row set out of per-backend fetches.
//!
//! Every fetched row is namespaced `table.column` first, so sources that
//! share column names never collide. Declared joins run as hash joins:
//! the smaller side is built into a key map, the larger side probes it,
//! and output order is pinned to (left row, right row) order so the merge
//! is deterministic no matter which side was built.
//!
//! A backend that timed out or errored simply has no rows here. An inner
//! join against a missing side yields zero rows for that branch; left and
//! right joins preserve the surviving side with nulls. That degradation
//! is the point: the merger never hard-fails.

use std::collections::HashMap;

use aeris_report_core::{JoinKind, Row, RowSet, ScalarValue};

use crate::backend::FetchedRows;
use crate::plan::PlannedJoin;

/// Merge fetched tables into one row set.
///
/// `fetched` holds whatever settled, in fetch order; tables a join names
/// but no fetch produced are treated as present-but-empty.
pub fn merge(fetched: Vec<FetchedRows>, joins: &[PlannedJoin], primary_table: &str) -> RowSet {
    let span = tracing::debug_span!(
        "merge",
        tables = fetched.len(),
        joins = joins.len(),
        rows_out = tracing::field::Empty,
    );
    let _enter = span.enter();

    // Qualify and index rows per table. A table fetched twice (two scans
    // of the same collection) concatenates.
    let mut tables: HashMap<String, Vec<Row>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for fetch in fetched {
        let qualified: Vec<Row> = fetch
            .rows
            .into_iter()
            .map(|row| row.qualify(&fetch.table))
            .collect();
        match tables.get_mut(&fetch.table) {
            Some(rows) => rows.extend(qualified),
            None => {
                order.push(fetch.table.clone());
                tables.insert(fetch.table, qualified);
            }
        }
    }

    let mut consumed: Vec<String> = vec![primary_table.to_owned()];
    let mut merged: Vec<Row> = tables.get(primary_table).cloned().unwrap_or_default();

    for join in joins {
        let right = tables.get(join.right_table.as_str()).cloned().unwrap_or_default();
        if !consumed.iter().any(|t| t == &join.right_table) {
            consumed.push(join.right_table.clone());
        }
        merged = hash_join(merged, right, join);
    }

    // Tables no join touched concatenate row-wise into the unified set.
    for table in order {
        if !consumed.iter().any(|t| t == &table) {
            merged.extend(tables.remove(&table).unwrap_or_default());
        }
    }

    span.record("rows_out", merged.len());
    RowSet::from_rows(merged)
}

/// Hash join `left` and `right` on the planned keys. Null keys never
/// match, as in SQL. O(n + m) plus the sort that restores row order.
fn hash_join(left: Vec<Row>, right: Vec<Row>, join: &PlannedJoin) -> Vec<Row> {
    let build_left = left.len() <= right.len();

    // Build the smaller side into key -> row indices.
    let (build_rows, build_key, probe_rows, probe_key) = if build_left {
        (&left, join.left_key.as_str(), &right, join.right_key.as_str())
    } else {
        (&right, join.right_key.as_str(), &left, join.left_key.as_str())
    };
    let mut lookup: HashMap<&ScalarValue, Vec<usize>> = HashMap::new();
    for (index, row) in build_rows.iter().enumerate() {
        match row.get(build_key) {
            Some(key) if !key.is_null() => lookup.entry(key).or_default().push(index),
            _ => {}
        }
    }

    // Matches as (left index, right index), then sorted so output order
    // is independent of which side was built.
    let mut matched_build = vec![false; build_rows.len()];
    let mut matched_probe = vec![false; probe_rows.len()];
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for (probe_index, row) in probe_rows.iter().enumerate() {
        let Some(key) = row.get(probe_key).filter(|k| !k.is_null()) else {
            continue;
        };
        if let Some(indices) = lookup.get(key) {
            matched_probe[probe_index] = true;
            for &build_index in indices {
                matched_build[build_index] = true;
                let (l, r) = if build_left {
                    (build_index, probe_index)
                } else {
                    (probe_index, build_index)
                };
                pairs.push((l, r));
            }
        }
    }
    pairs.sort_unstable();

    let (left_matched, right_matched) = if build_left {
        (matched_build, matched_probe)
    } else {
        (matched_probe, matched_build)
    };

    let mut out: Vec<Row> = pairs
        .into_iter()
        .map(|(l, r)| {
            let mut row = left[l].clone();
            row.merge(right[r].clone());
            row
        })
        .collect();

    // Outer rows keep their side; the other side's columns are simply
    // absent, which reads as null everywhere downstream.
    match join.kind {
        JoinKind::Inner => {}
        JoinKind::Left => {
            out.extend(
                left.iter()
                    .zip(&left_matched)
                    .filter(|(_, matched)| !**matched)
                    .map(|(row, _)| row.clone()),
            );
        }
        JoinKind::Right => {
            out.extend(
                right
                    .iter()
                    .zip(&right_matched)
                    .filter(|(_, matched)| !**matched)
                    .map(|(row, _)| row.clone()),
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jobs(rows: &[(&str, &str)]) -> FetchedRows {
        FetchedRows {
            table: "jobs".into(),
            rows: rows
                .iter()
                .map(|(id, district)| {
                    let mut row = Row::new();
                    row.set("id", *id);
                    row.set("district", *district);
                    row
                })
                .collect(),
        }
    }

    fn costs(rows: &[(&str, f64)]) -> FetchedRows {
        FetchedRows {
            table: "job_costs".into(),
            rows: rows
                .iter()
                .map(|(job_id, cost)| {
                    let mut row = Row::new();
                    row.set("job_id", *job_id);
                    row.set("cost", *cost);
                    row
                })
                .collect(),
        }
    }

    fn join(kind: JoinKind) -> PlannedJoin {
        PlannedJoin {
            left_table: "jobs".into(),
            right_table: "job_costs".into(),
            left_key: "jobs.id".into(),
            right_key: "job_costs.job_id".into(),
            kind,
        }
    }

    #[test]
    fn single_source_passes_through_namespaced() {
        let merged = merge(vec![jobs(&[("j1", "Wola")])], &[], "jobs");
        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged.rows()[0].get("jobs.district"),
            Some(&ScalarValue::String("Wola".into()))
        );
    }

    #[test]
    fn inner_join_drops_unmatched() {
        let merged = merge(
            vec![
                jobs(&[("j1", "Wola"), ("j2", "Mokotów"), ("j3", "Wola")]),
                costs(&[("j1", 120.0), ("j3", 90.0), ("j9", 10.0)]),
            ],
            &[join(JoinKind::Inner)],
            "jobs",
        );
        assert_eq!(merged.len(), 2);
        let first = &merged.rows()[0];
        assert_eq!(first.get("jobs.id"), Some(&ScalarValue::String("j1".into())));
        assert_eq!(first.get("job_costs.cost"), Some(&ScalarValue::Double(120.0)));
    }

    #[test]
    fn left_join_preserves_left_count() {
        let left_rows = [("j1", "Wola"), ("j2", "Mokotów"), ("j3", "Wola")];
        let merged = merge(
            vec![jobs(&left_rows), costs(&[("j1", 120.0)])],
            &[join(JoinKind::Left)],
            "jobs",
        );
        assert_eq!(merged.len(), left_rows.len());
        // unmatched rows carry no cost columns; they read as null
        assert!(merged.rows()[1].get("job_costs.cost").is_none());
    }

    #[test]
    fn right_join_preserves_right_rows() {
        let merged = merge(
            vec![jobs(&[("j1", "Wola")]), costs(&[("j1", 120.0), ("j9", 10.0)])],
            &[join(JoinKind::Right)],
            "jobs",
        );
        assert_eq!(merged.len(), 2);
        assert!(merged.rows()[1].get("jobs.id").is_none());
    }

    #[test]
    fn missing_backend_degrades_per_join_kind() {
        // inner against a missing side: zero rows for that branch
        let merged = merge(
            vec![jobs(&[("j1", "Wola")])],
            &[join(JoinKind::Inner)],
            "jobs",
        );
        assert_eq!(merged.len(), 0);

        // left join keeps the surviving side
        let merged = merge(
            vec![jobs(&[("j1", "Wola"), ("j2", "Mokotów")])],
            &[join(JoinKind::Left)],
            "jobs",
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn one_to_many_matches_expand() {
        let merged = merge(
            vec![
                jobs(&[("j1", "Wola")]),
                costs(&[("j1", 120.0), ("j1", 40.0)]),
            ],
            &[join(JoinKind::Inner)],
            "jobs",
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn null_keys_never_match() {
        let mut no_id = Row::new();
        no_id.set("district", "Wola");
        let merged = merge(
            vec![
                FetchedRows {
                    table: "jobs".into(),
                    rows: vec![no_id],
                },
                costs(&[("j1", 120.0)]),
            ],
            &[join(JoinKind::Inner)],
            "jobs",
        );
        assert_eq!(merged.len(), 0);
    }

    #[test]
    fn unjoined_tables_concatenate() {
        let mut note = Row::new();
        note.set("text", "boiler serviced");
        let merged = merge(
            vec![
                jobs(&[("j1", "Wola")]),
                FetchedRows {
                    table: "service_notes".into(),
                    rows: vec![note],
                },
            ],
            &[],
            "jobs",
        );
        assert_eq!(merged.len(), 2);
        assert!(merged.rows()[1].get("service_notes.text").is_some());
    }
}
