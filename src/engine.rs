//! Query orchestration: parse, build the condition tree, execute, aggregate
//! and project.
//!
//! Each run is synchronous and reads the [`RowSource`] through shared
//! borrows only, so a failed run never disturbs the source or the caller's
//! token list.

use crate::aggregate::{aggregate, grouped_columns};
use crate::ast::{JoinType, TableAlias, VisualQuery};
use crate::config::{ActiveTab, QueryConfig};
use crate::error::QueryError;
use crate::executor::{ExecutionError, Executor, JoinSpec, LabelStyle};
use crate::parser::parse_simple_query;
use crate::projector::{display_columns, QueryResult};
use crate::query_text::parse_query_text;
use crate::row_source::RowSource;
use tracing::info;

pub struct QueryEngine<'a, S: RowSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: RowSource + ?Sized> QueryEngine<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    fn columns(&self, table: &str) -> Result<&'a [String], ExecutionError> {
        self.source
            .columns(table)
            .ok_or_else(|| ExecutionError::TableNotFound(table.to_string()))
    }

    /// Output fields with `*` expanded to every column of both tables.
    pub fn expand_output_fields(&self, query: &VisualQuery) -> Result<Vec<String>, ExecutionError> {
        let mut fields = Vec::with_capacity(query.output_fields.len());
        for field in &query.output_fields {
            if field.trim() != "*" {
                fields.push(field.clone());
                continue;
            }
            for column in self.columns(&query.table1)? {
                fields.push(format!("{}: {}", TableAlias::T1, column));
            }
            if let Some(table2) = query.second_table() {
                for column in self.columns(table2)? {
                    fields.push(format!("{}: {}", TableAlias::T2, column));
                }
            }
        }
        Ok(fields)
    }

    /// Runs a designer query. Ungrouped queries stop scanning once `limit`
    /// rows are produced; grouped queries apply it after aggregation.
    pub fn execute(&self, query: &VisualQuery, limit: Option<usize>) -> Result<QueryResult, QueryError> {
        info!(
            table1 = query.table1.as_str(),
            table2 = query.table2.as_str(),
            join = ?query.query_type,
            "running designer query"
        );

        let output_fields = self.expand_output_fields(query)?;
        if output_fields.is_empty() {
            return Err(ExecutionError::NoOutputFields.into());
        }
        let tree = query.conditions_list.build_tree().map_err(ExecutionError::from)?;
        let grouped = !query.group_by.is_empty();
        let scan_limit = if grouped { None } else { limit };

        let executor = Executor::new(self.source);
        let rows = match query.second_table() {
            Some(table2) => {
                let spec = JoinSpec {
                    table1: &query.table1,
                    table2,
                    join_type: query.query_type,
                    keys: query.conditions_list.join_leaves(),
                };
                executor.run_join(&spec, tree.as_ref(), scan_limit)?
            }
            None => executor.run_filter(&query.table1, tree.as_ref(), scan_limit)?,
        };

        let result = if grouped {
            let mut result = QueryResult::new(
                grouped_columns(&query.group_by, &output_fields),
                aggregate(&rows, &query.group_by, &output_fields),
            );
            result.truncate(limit);
            result
        } else {
            let with_match_count = query.is_join() && query.query_type == JoinType::Inner;
            QueryResult::new(display_columns(&output_fields, with_match_count), rows)
        };

        info!(rows = result.len(), "designer query finished");
        Ok(result)
    }

    /// Parses and runs SQL view text; the LIMIT comes from the text.
    pub fn execute_text(&self, text: &str) -> Result<QueryResult, QueryError> {
        let parsed = parse_query_text(text)?;
        self.execute(&parsed.query, parsed.limit)
    }

    /// Runs a `show … where …` query against one table. Result columns are
    /// bare column names.
    pub fn execute_simple(&self, table: &str, text: &str, limit: Option<usize>) -> Result<QueryResult, QueryError> {
        info!(table, text, "running simple query");
        let columns = self.columns(table)?;
        let query = parse_simple_query(text, columns)?;
        let tree = query.condition_tree();

        let rows = Executor::new(self.source)
            .with_labels(LabelStyle::Bare)
            .run_filter(table, tree.as_ref(), limit)?;

        Ok(QueryResult::new(query.fields, rows))
    }

    /// Runs whichever query was active when the configuration was saved.
    pub fn run_config(&self, config: &QueryConfig) -> Result<QueryResult, QueryError> {
        match config.active_tab {
            ActiveTab::VisualDesigner => self.execute(&config.visual_query, config.effective_limit()),
            ActiveTab::SimpleQuery => self.execute_simple(
                &config.simple_query.table,
                &config.simple_query.text,
                config.effective_limit(),
            ),
            ActiveTab::SqlView => self.execute_text(&config.sql_query.text),
        }
    }
}
