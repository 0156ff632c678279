//! Filter and join execution over a [`RowSource`].
//!
//! Single-table queries scan T1 once. Two-table queries build a hash index
//! on the T2 join key (one pass over T2) and probe it once per T1 row.

use crate::ast::{ConditionNode, JoinLeaf, JoinType, TableAlias};
use crate::evaluator::matches;
use crate::expression::SyntaxError;
use crate::row_source::{Row, RowId, RowSource};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Label of the synthetic per-row match counter of join results.
pub const MATCH_COUNT: &str = "Match_Count";

/// Faults that abort a single query run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Field '{field}' not found in table '{table}'")]
    FieldNotFound { table: String, field: String },

    #[error("Please add at least one join condition")]
    MissingJoinCondition,

    #[error("Please select at least one field for the output")]
    NoOutputFields,

    #[error("Invalid condition logic: {0}")]
    Syntax(#[from] SyntaxError),
}

/// A value in a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl CellValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Text(s) => s.trim().parse().ok(),
            CellValue::Integer(n) => Some(*n as f64),
            CellValue::Float(f) => Some(*f),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Integer(n) => write!(f, "{}", n),
            CellValue::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Integer(n)
    }
}

impl From<f64> for CellValue {
    fn from(x: f64) -> Self {
        CellValue::Float(x)
    }
}

/// Output row: label to value, plus the identities of the source rows it
/// was built from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultRow {
    pub values: IndexMap<String, CellValue>,
    pub left: Option<RowId>,
    pub right: Option<RowId>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, label: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.insert(label, value);
        self
    }

    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<CellValue>) {
        self.values.insert(label.into(), value.into());
    }

    pub fn get(&self, label: &str) -> Option<&CellValue> {
        self.values.get(label)
    }

    /// Display text of a value; missing values render as "".
    pub fn text(&self, label: &str) -> String {
        self.get(label).map(ToString::to_string).unwrap_or_default()
    }

    pub fn match_count(&self) -> Option<i64> {
        match self.get(MATCH_COUNT) {
            Some(CellValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }
}

/// How result columns are labelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelStyle {
    /// `T1: field`, used by the visual designer and SQL view
    #[default]
    Qualified,
    /// Bare column names, used by the simple query
    Bare,
}

/// Two-table query definition handed to [`Executor::run_join`].
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec<'q> {
    pub table1: &'q str,
    pub table2: &'q str,
    pub join_type: JoinType,
    pub keys: Vec<&'q JoinLeaf>,
}

type JoinKey<'r> = Vec<&'r str>;

pub struct Executor<'a, S: RowSource + ?Sized> {
    source: &'a S,
    labels: LabelStyle,
}

fn limit_reached(emitted: usize, limit: Option<usize>) -> bool {
    limit.is_some_and(|cap| emitted >= cap)
}

impl<'a, S: RowSource + ?Sized> Executor<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            labels: LabelStyle::Qualified,
        }
    }

    pub fn with_labels(mut self, labels: LabelStyle) -> Self {
        self.labels = labels;
        self
    }

    fn label(&self, alias: TableAlias, column: &str) -> String {
        match self.labels {
            LabelStyle::Qualified => format!("{}: {}", alias, column),
            LabelStyle::Bare => column.to_string(),
        }
    }

    fn table(&self, name: &str) -> Result<(&'a [String], &'a [Row]), ExecutionError> {
        let columns = self
            .source
            .columns(name)
            .ok_or_else(|| ExecutionError::TableNotFound(name.to_string()))?;
        let rows = self
            .source
            .rows(name)
            .ok_or_else(|| ExecutionError::TableNotFound(name.to_string()))?;
        Ok((columns, rows))
    }

    fn copy_columns(&self, out: &mut ResultRow, alias: TableAlias, columns: &[String], row: Option<&Row>) {
        for column in columns {
            let value = row.map(|r| r.get(column)).unwrap_or("");
            out.insert(self.label(alias, column), value);
        }
    }

    /// Keeps the T1 rows matching `tree`, stopping once `limit` rows are emitted.
    pub fn run_filter(
        &self,
        table: &str,
        tree: Option<&ConditionNode>,
        limit: Option<usize>,
    ) -> Result<Vec<ResultRow>, ExecutionError> {
        let (columns, rows) = self.table(table)?;
        let mut results = Vec::new();

        for row in rows {
            if limit_reached(results.len(), limit) {
                break;
            }
            if matches(tree, row, None) {
                let mut out = ResultRow {
                    left: Some(row.id),
                    ..ResultRow::default()
                };
                self.copy_columns(&mut out, TableAlias::T1, columns, Some(row));
                results.push(out);
            }
        }

        debug!(table, scanned = rows.len(), emitted = results.len(), "filter query finished");
        Ok(results)
    }

    /// Hash join of T1 against T2 with INNER or ANTI semantics.
    pub fn run_join(
        &self,
        spec: &JoinSpec<'_>,
        tree: Option<&ConditionNode>,
        limit: Option<usize>,
    ) -> Result<Vec<ResultRow>, ExecutionError> {
        if spec.keys.is_empty() {
            return Err(ExecutionError::MissingJoinCondition);
        }
        let (columns1, rows1) = self.table(spec.table1)?;
        let (columns2, rows2) = self.table(spec.table2)?;

        for key in &spec.keys {
            if !columns1.contains(&key.t1_field) {
                return Err(ExecutionError::FieldNotFound {
                    table: spec.table1.to_string(),
                    field: key.t1_field.clone(),
                });
            }
            if !columns2.contains(&key.t2_field) {
                return Err(ExecutionError::FieldNotFound {
                    table: spec.table2.to_string(),
                    field: key.t2_field.clone(),
                });
            }
        }

        let mut table2_index: HashMap<JoinKey<'a>, Vec<&'a Row>> = HashMap::new();
        for row in rows2 {
            let key = spec.keys.iter().map(|k| row.get(&k.t2_field)).collect();
            table2_index.entry(key).or_default().push(row);
        }
        debug!(table = spec.table2, keys = table2_index.len(), "built join index");

        let mut results = Vec::new();
        'outer: for row1 in rows1 {
            if limit_reached(results.len(), limit) {
                break;
            }
            let key: JoinKey<'_> = spec.keys.iter().map(|k| row1.get(&k.t1_field)).collect();
            let matching = table2_index.get(&key).map(Vec::as_slice).unwrap_or(&[]);

            match spec.join_type {
                JoinType::Inner => {
                    for &row2 in matching {
                        if limit_reached(results.len(), limit) {
                            break 'outer;
                        }
                        if matches(tree, row1, Some(row2)) {
                            results.push(self.joined_row(columns1, columns2, row1, Some(row2), matching.len()));
                        }
                    }
                }
                JoinType::Anti => {
                    if matching.is_empty() && matches(tree, row1, None) {
                        results.push(self.joined_row(columns1, columns2, row1, None, 0));
                    }
                }
            }
        }

        debug!(
            left = spec.table1,
            right = spec.table2,
            join = ?spec.join_type,
            emitted = results.len(),
            "join query finished"
        );
        Ok(results)
    }

    fn joined_row(
        &self,
        columns1: &[String],
        columns2: &[String],
        row1: &Row,
        row2: Option<&Row>,
        match_count: usize,
    ) -> ResultRow {
        let mut out = ResultRow {
            left: Some(row1.id),
            right: row2.map(|r| r.id),
            ..ResultRow::default()
        };
        out.insert(MATCH_COUNT, match_count as i64);
        self.copy_columns(&mut out, TableAlias::T1, columns1, Some(row1));
        self.copy_columns(&mut out, TableAlias::T2, columns2, row2);
        out
    }
}
