//! Final row set: visible columns, ordering and text rendering.

use crate::evaluator::parse_number;
use crate::executor::{ResultRow, MATCH_COUNT};
use prettytable::{Cell, Row, Table};
use std::cmp::Ordering;

/// Visible columns of an ungrouped result. Inner join results lead with the
/// match counter.
pub fn display_columns(output_fields: &[String], with_match_count: bool) -> Vec<String> {
    let mut columns = Vec::with_capacity(output_fields.len() + 1);
    if with_match_count {
        columns.push(MATCH_COUNT.to_string());
    }
    for field in output_fields {
        if !columns.contains(field) {
            columns.push(field.clone());
        }
    }
    columns
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<ResultRow>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn truncate(&mut self, limit: Option<usize>) {
        if let Some(limit) = limit {
            self.rows.truncate(limit);
        }
    }

    /// Display text of every visible cell, row by row.
    pub fn text_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| self.columns.iter().map(|c| row.text(c)).collect())
            .collect()
    }

    /// Stable sort by one column. Numeric ordering is used when every
    /// non-empty value parses as a number; otherwise case-insensitive text.
    /// Empty values sort first when ascending.
    pub fn sort_by(&mut self, column: &str, ascending: bool) {
        let numeric = self
            .rows
            .iter()
            .map(|row| row.text(column))
            .filter(|text| !text.trim().is_empty())
            .all(|text| parse_number(&text).is_some());

        self.rows.sort_by(|a, b| {
            let ordering = compare_cells(&a.text(column), &b.text(column), numeric);
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
    }

    /// Renders the visible columns as a text grid.
    pub fn render(&self) -> String {
        if self.columns.is_empty() {
            return String::new();
        }
        let mut table = Table::new();
        table.set_titles(Row::new(self.columns.iter().map(|c| Cell::new(c)).collect()));
        for values in self.text_rows() {
            table.add_row(Row::new(values.iter().map(|v| Cell::new(v)).collect()));
        }
        table.to_string()
    }
}

fn compare_cells(a: &str, b: &str, numeric: bool) -> Ordering {
    let (a, b) = (a.trim(), b.trim());
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }
    if numeric {
        if let (Some(x), Some(y)) = (parse_number(a), parse_number(b)) {
            return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
        }
    }
    a.to_lowercase().cmp(&b.to_lowercase())
}
