//! SQL compiler that exports a visual query as portable PostgreSQL using sea-query.
//!
//! The in-memory engine compares text case-insensitively and coerces
//! relational comparisons to numbers; the generated SQL mirrors that with
//! `LOWER(..)` and `CAST(.. AS NUMERIC)`. ANTI joins become a `LEFT JOIN`
//! filtered on a NULL right-hand key.

use crate::ast::{
    AggregateFunc, CompOp, ConditionLeaf, ConditionNode, DatePart, FieldRef, GroupKind, JoinType as QueryJoinType,
    OutputSpec, TableAlias, VisualQuery,
};
use crate::expression::SyntaxError;
use sea_query::{
    Alias, Asterisk, Expr, Func, JoinType, LikeExpr, PostgresQueryBuilder, SelectStatement, SimpleExpr,
};
use std::fmt::Write;
use thiserror::Error;
use tracing::debug;

/// Compiler options
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Wrap text comparisons in `LOWER(..)`
    pub case_insensitive: bool,
    /// Target type of relational comparisons and numeric aggregates
    pub numeric_type: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            case_insensitive: true,
            numeric_type: "NUMERIC".to_string(),
        }
    }
}

/// Represents a source table name for sea-query
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl sea_query::Iden for TableName {
    fn unquoted(&self, s: &mut dyn Write) {
        let _ = write!(s, "{}", self.0);
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl sea_query::Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn Write) {
        let _ = write!(s, "{}", self.0);
    }
}

impl sea_query::Iden for TableAlias {
    fn unquoted(&self, s: &mut dyn Write) {
        let _ = write!(s, "{}", self.as_str());
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
}

impl CompileError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<SyntaxError> for CompileError {
    fn from(e: SyntaxError) -> Self {
        CompileError::new(format!("Invalid condition logic: {}", e.message))
    }
}

/// Result of SQL compilation
#[derive(Debug)]
pub struct CompileResult {
    pub sql: String,
}

/// SQL Compiler that converts a visual query to SQL text
pub struct SqlCompiler {
    config: CompilerConfig,
}

impl Default for SqlCompiler {
    fn default() -> Self {
        Self::new()
    }
}

fn column(alias: TableAlias, field: &str) -> Expr {
    Expr::col((alias, ColumnName(field.to_string())))
}

fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

impl SqlCompiler {
    pub fn new() -> Self {
        Self {
            config: CompilerConfig::default(),
        }
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// Compile a visual query into SQL
    pub fn compile(&self, query: &VisualQuery, limit: Option<usize>) -> Result<CompileResult, CompileError> {
        let table1 = query.table1.trim();
        if table1.is_empty() {
            return Err(CompileError::new("Please select at least one table"));
        }

        let mut select = SelectStatement::new();
        select.from_as(TableName(table1.to_string()), TableAlias::T1);

        if let Some(table2) = query.second_table() {
            let keys = query.conditions_list.join_leaves();
            let Some(first_key) = keys.first() else {
                return Err(CompileError::new("Please add at least one join condition"));
            };
            let on = keys
                .iter()
                .map(|key| {
                    column(TableAlias::T1, &key.t1_field).equals((TableAlias::T2, ColumnName(key.t2_field.clone())))
                })
                .reduce(SimpleExpr::and)
                .unwrap_or_else(|| Expr::val(true).into());

            match query.query_type {
                QueryJoinType::Inner => {
                    select.join_as(JoinType::InnerJoin, TableName(table2.to_string()), TableAlias::T2, on);
                }
                QueryJoinType::Anti => {
                    select.join_as(JoinType::LeftJoin, TableName(table2.to_string()), TableAlias::T2, on);
                    select.and_where(column(TableAlias::T2, &first_key.t2_field).is_null());
                }
            }
        }

        if let Some(tree) = query.conditions_list.build_tree()? {
            select.and_where(self.compile_node(&tree));
        }

        self.compile_outputs(&mut select, query)?;

        for field in &query.group_by {
            let field_ref = Self::field_ref(field)?;
            select.group_by_col((field_ref.table, ColumnName(field_ref.field)));
        }

        if let Some(limit) = limit {
            select.limit(limit as u64);
        }

        let sql = select.to_string(PostgresQueryBuilder);
        debug!(%sql, "compiled visual query");
        Ok(CompileResult { sql })
    }

    fn field_ref(label: &str) -> Result<FieldRef, CompileError> {
        FieldRef::parse(label).ok_or_else(|| CompileError::new(format!("Unknown output field '{}'", label)))
    }

    fn compile_outputs(&self, select: &mut SelectStatement, query: &VisualQuery) -> Result<(), CompileError> {
        if query.output_fields.is_empty() || query.output_fields.iter().any(|f| f.trim() == "*") {
            select.column(Asterisk);
            return Ok(());
        }

        for label in &query.output_fields {
            let expr: SimpleExpr = match OutputSpec::parse(label) {
                OutputSpec::Field(field) => {
                    let field_ref = Self::field_ref(&field)?;
                    column(field_ref.table, &field_ref.field).into()
                }
                OutputSpec::Aggregate { func, field } => {
                    let field_ref = Self::field_ref(&field)?;
                    self.compile_aggregate(func, column(field_ref.table, &field_ref.field))
                }
                OutputSpec::Unknown(text) => {
                    return Err(CompileError::new(format!("Unknown aggregate function in '{}'", text)));
                }
            };
            select.expr_as(expr, Alias::new(label.as_str()));
        }
        Ok(())
    }

    fn numeric(&self, expr: Expr) -> SimpleExpr {
        Func::cast_as(expr, Alias::new(self.config.numeric_type.as_str())).into()
    }

    fn compile_aggregate(&self, func: AggregateFunc, col: Expr) -> SimpleExpr {
        match func {
            AggregateFunc::Count => Func::count(col).into(),
            AggregateFunc::Sum => Func::sum(self.numeric(col)).into(),
            AggregateFunc::Avg => Func::avg(self.numeric(col)).into(),
            AggregateFunc::Min => Func::min(self.numeric(col)).into(),
            AggregateFunc::Max => Func::max(self.numeric(col)).into(),
        }
    }

    /// Compile a condition tree
    fn compile_node(&self, node: &ConditionNode) -> SimpleExpr {
        match node {
            ConditionNode::Leaf(leaf) => self.compile_leaf(leaf),
            ConditionNode::Group(kind, children) => {
                let mut compiled = children.iter().map(|child| self.compile_node(child));
                match kind {
                    GroupKind::And => compiled.reduce(SimpleExpr::and).unwrap_or_else(|| Expr::val(true).into()),
                    GroupKind::Or => compiled.reduce(SimpleExpr::or).unwrap_or_else(|| Expr::val(false).into()),
                    GroupKind::Not => compiled
                        .next()
                        .map(SimpleExpr::not)
                        .unwrap_or_else(|| Expr::val(true).into()),
                }
            }
        }
    }

    /// Compile a single comparison
    fn compile_leaf(&self, leaf: &ConditionLeaf) -> SimpleExpr {
        let col = column(leaf.table, &leaf.field);

        if let Some(part) = leaf.date_part {
            let Ok(expected) = leaf.value.trim().parse::<i64>() else {
                return Expr::val(false).into();
            };
            let template = match part {
                DatePart::Year => "EXTRACT(YEAR FROM CAST($1 AS DATE))",
                DatePart::Month => "EXTRACT(MONTH FROM CAST($1 AS DATE))",
                DatePart::Day => "EXTRACT(DAY FROM CAST($1 AS DATE))",
            };
            let extracted = Expr::expr(Expr::cust_with_expr(template, col));
            return Self::compare(extracted, leaf.op, expected);
        }

        if leaf.op.is_relational() {
            let Ok(number) = leaf.value.trim().parse::<f64>() else {
                return Expr::val(false).into();
            };
            return Self::compare(Expr::expr(self.numeric(col)), leaf.op, number);
        }

        let (target, value) = if self.config.case_insensitive {
            (Expr::expr(Func::lower(col)), leaf.value.to_lowercase())
        } else {
            (col, leaf.value.clone())
        };
        let pattern = escape_like(&value);
        match leaf.op {
            CompOp::Contains => target.like(LikeExpr::new(format!("%{}%", pattern)).escape('\\')),
            CompOp::NotContains => target.not_like(LikeExpr::new(format!("%{}%", pattern)).escape('\\')),
            CompOp::StartsWith => target.like(LikeExpr::new(format!("{}%", pattern)).escape('\\')),
            CompOp::EndsWith => target.like(LikeExpr::new(format!("%{}", pattern)).escape('\\')),
            CompOp::NotEq => target.ne(value),
            _ => target.eq(value),
        }
    }

    fn compare<V>(expr: Expr, op: CompOp, value: V) -> SimpleExpr
    where
        V: Into<sea_query::Value>,
    {
        match op {
            CompOp::NotEq => expr.ne(value.into()),
            CompOp::Gt => expr.gt(value.into()),
            CompOp::Lt => expr.lt(value.into()),
            CompOp::Gte => expr.gte(value.into()),
            CompOp::Lte => expr.lte(value.into()),
            _ => expr.eq(value.into()),
        }
    }
}
