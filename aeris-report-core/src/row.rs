//! Rows and row sets.
//!
//! A [`Row`] is an ordered mapping from column name to [`ScalarValue`];
//! a [`RowSet`] is the unit every pipeline stage consumes and produces.
//! Column names are namespaced `table.column` once rows leave their source
//! backend, so two backends exposing a `status` column never collide.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::value::ScalarValue;

/// One result row. Columns iterate in name order, which makes row
/// serialization and table export deterministic without extra bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    values: BTreeMap<String, ScalarValue>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    pub fn get(&self, column: &str) -> Option<&ScalarValue> {
        self.values.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<ScalarValue>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn remove(&mut self, column: &str) -> Option<ScalarValue> {
        self.values.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Prefix every column with `table.`, producing `table.column` names.
    /// Expects bare (un-namespaced) columns, as adapters emit them.
    pub fn qualify(self, table: &str) -> Row {
        let values = self
            .values
            .into_iter()
            .map(|(column, value)| (format!("{table}.{column}"), value))
            .collect();
        Row { values }
    }

    /// Absorb all columns of `other`, overwriting on collision.
    pub fn merge(&mut self, other: Row) {
        self.values.extend(other.values);
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, ScalarValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, ScalarValue)>>(iter: I) -> Self {
        Row {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, ScalarValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, ScalarValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// An ordered collection of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowSet {
    rows: Vec<Row>,
}

impl RowSet {
    pub fn new() -> Self {
        RowSet::default()
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        RowSet { rows }
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Distinct column names across all rows, in name order.
    pub fn columns(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for row in &self.rows {
            for column in row.columns() {
                names.insert(column.to_owned());
            }
        }
        names.into_iter().collect()
    }

    /// Flatten into a stable (header, cells) table for export. Cells absent
    /// from a row come out as `Null`, so every data row has header arity.
    pub fn to_table(&self) -> (Vec<String>, Vec<Vec<ScalarValue>>) {
        let header = self.columns();
        let data = self
            .rows
            .iter()
            .map(|row| {
                header
                    .iter()
                    .map(|column| row.get(column).cloned().unwrap_or(ScalarValue::Null))
                    .collect()
            })
            .collect();
        (header, data)
    }

    pub fn to_json_rows(&self) -> Vec<serde_json::Value> {
        self.rows.iter().map(Row::to_json).collect()
    }
}

impl FromIterator<Row> for RowSet {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        RowSet {
            rows: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for RowSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, ScalarValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn qualify_prefixes_every_column() {
        let r = row(&[
            ("district", "Wola".into()),
            ("revenue", ScalarValue::Double(1200.0)),
        ])
        .qualify("jobs");
        assert_eq!(r.get("jobs.district"), Some(&ScalarValue::String("Wola".into())));
        assert_eq!(r.get("jobs.revenue"), Some(&ScalarValue::Double(1200.0)));
        assert!(r.get("district").is_none());
    }

    #[test]
    fn columns_are_the_sorted_union() {
        let set = RowSet::from_rows(vec![
            row(&[("b", 1i64.into())]),
            row(&[("a", 2i64.into()), ("c", 3i64.into())]),
        ]);
        assert_eq!(set.columns(), vec!["a", "b", "c"]);
    }

    #[test]
    fn table_export_pads_missing_cells_with_null() {
        let set = RowSet::from_rows(vec![
            row(&[("a", 1i64.into())]),
            row(&[("b", 2i64.into())]),
        ]);
        let (header, data) = set.to_table();
        assert_eq!(header, vec!["a", "b"]);
        assert_eq!(data[0], vec![ScalarValue::Long(1), ScalarValue::Null]);
        assert_eq!(data[1], vec![ScalarValue::Null, ScalarValue::Long(2)]);
    }

    #[test]
    fn row_serializes_as_plain_object() {
        let r = row(&[("jobs.count", 6i64.into()), ("jobs.district", "Ursynów".into())]);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "jobs.count": 6, "jobs.district": "Ursynów" })
        );
    }
}
