//! 查询设计器的查询引擎
//!
//! 处理流程:
//! ```text
//! 条件 token 列表 ──build_tree──▶ ConditionNode ─┐
//! "show … where …" ──Parser──────▶ SimpleQuery ──┤
//! "SELECT … FROM …" ──query_text─▶ VisualQuery ──┤
//!                                                ▼
//!                       Executor (过滤 / 哈希连接 / 反连接)
//!                                                ▼
//!                         aggregate (GROUP BY) ─▶ QueryResult
//! ```

pub mod aggregate;
pub mod ast;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod expression;
pub mod lexer;
pub mod parser;
pub mod projector;
pub mod query_text;
pub mod row_source;
pub mod sql_compiler;
pub mod token;

pub use ast::{
    AggregateFunc, CompOp, ConditionLeaf, ConditionNode, DatePart, JoinLeaf, JoinType, LogicalOp, QueryToken,
    TableAlias, VisualQuery,
};
pub use config::{ActiveTab, ConfigError, QueryConfig};
pub use engine::QueryEngine;
pub use error::QueryError;
pub use executor::{CellValue, ExecutionError, ResultRow, MATCH_COUNT};
pub use expression::{SyntaxError, TokenList};
pub use projector::QueryResult;
pub use row_source::{MemoryRowSource, Row, RowId, RowSource};
