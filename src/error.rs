use crate::config::ConfigError;
use crate::executor::ExecutionError;
use crate::expression::SyntaxError;
use crate::parser::DslError;
use crate::query_text::GrammarParseError;
use crate::sql_compiler::CompileError;
use thiserror::Error;

/// Any failure surfaced by [`crate::engine::QueryEngine`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("Invalid condition logic: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("Query error: {0}")]
    Dsl(#[from] DslError),

    #[error("Failed to parse query: {0}")]
    Grammar(#[from] GrammarParseError),

    #[error("Query execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("SQL export failed: {0}")]
    Compile(#[from] CompileError),
}

impl QueryError {
    /// Character span to highlight in the query text, if the error has one.
    pub fn span(&self) -> Option<(usize, usize)> {
        match self {
            QueryError::Dsl(e) => e.span(),
            _ => None,
        }
    }

    /// Offending token index in the condition list, if the error has one.
    pub fn token_index(&self) -> Option<usize> {
        match self {
            QueryError::Syntax(e) => e.index,
            QueryError::Execution(ExecutionError::Syntax(e)) => e.index,
            _ => None,
        }
    }
}
