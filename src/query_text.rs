//! SQL 视图文本的解析与生成
//!
//! ## 支持的语法
//!
//! ```text
//! 单表：
//!   SELECT <fields> FROM '<table>' [AS T1]
//!     [WHERE <expr>] [GROUP BY <fields>] [LIMIT <int>] ;
//!
//! 两表：
//!   SELECT <fields> FROM '<t1>' AS T1 (INNER [JOIN] | LEFT ANTI[-JOIN]) '<t2>' AS T2
//!     ON T1.a = T2.b (AND T1.c = T2.d)*
//!     [WHERE <expr>] [GROUP BY <fields>] [LIMIT <int>] ;
//!
//! <expr> := 条件、AND、OR、NOT 和括号组成的序列
//! 条件    := [(YEAR|MONTH|DAY) OF] [T1.|T2.](field | "field") <op> 'value'
//! ```
//!
//! `SELECT … FROM '` 与 `FROM '<table>' …` 两个区域用正则定位（表名必须加引号，
//! 字段名里的 From 不会结束 SELECT 区域），
//! 其后的 ON / WHERE / GROUP BY / LIMIT 交给词法分析器逐个 token 处理，
//! 因此字符串值中出现的 `LIMIT`、`AND` 等单词不会截断子句。

use crate::ast::{
    qualified_field, CompOp, ConditionData, ConditionLeaf, DatePart, FieldRef, JoinLeaf, JoinType, LogicalOp,
    QueryToken, TableAlias, VisualQuery,
};
use crate::expression::{validate, TokenList};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

pub const FIELDS_PLACEHOLDER: &str = "[Select Output Fields]";
pub const JOIN_PLACEHOLDER: &str = "[Define Join Conditions]";
pub const NO_TABLE_MESSAGE: &str = "Please select at least one table to begin.";

/// 文本与语法不匹配，携带出错的子句文本
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct GrammarParseError {
    pub clause: String,
    pub message: String,
}

impl GrammarParseError {
    fn new(clause: &str, message: impl Into<String>) -> Self {
        Self {
            clause: clause.trim().to_string(),
            message: message.into(),
        }
    }
}

/// 解析结果：查询定义与可选的 LIMIT
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub query: VisualQuery,
    pub limit: Option<usize>,
}

fn select_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)\bSELECT\b\s*(.*?)\s*\bFROM\b(?:\s+'|[^']*$)").expect("valid select pattern"))
}

fn join_from_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?is)^\s*FROM\s+'((?:[^']|'')+)'\s+AS\s+(\w+)\s+(INNER(?:\s+JOIN)?|LEFT\s+ANTI(?:-JOIN|\s+JOIN)?)\s+'((?:[^']|'')+)'\s+AS\s+(\w+)",
        )
        .expect("valid join pattern")
    })
}

fn filter_from_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)^\s*FROM\s+'((?:[^']|'')+)'(?:\s+AS\s+(\w+))?").expect("valid from pattern")
    })
}

fn join_form_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)\bFROM\s+'(?:[^']|'')+'(?:\s+AS\s+\w+)?\s+(?:INNER|LEFT\s+ANTI)\b").expect("valid join form pattern")
    })
}

/// 表名后紧跟 `INNER` 或 `LEFT ANTI` 时为两表形式
pub fn is_join_form(text: &str) -> bool {
    join_form_pattern().is_match(text)
}

/// 解析 SQL 视图文本
pub fn parse_query_text(text: &str) -> Result<ParsedQuery, GrammarParseError> {
    let select = select_pattern()
        .captures(text)
        .ok_or_else(|| GrammarParseError::new(text, "Could not find SELECT clause."))?;
    let fields_match = select.get(1).ok_or_else(|| GrammarParseError::new(text, "Could not find SELECT clause."))?;
    let output_fields = parse_output_fields(fields_match.as_str());
    let rest = &text[fields_match.end()..];

    let join_form = is_join_form(text);
    let (mut query, tail) = if join_form {
        let caps = join_from_pattern()
            .captures(rest)
            .ok_or_else(|| GrammarParseError::new(rest, "Could not parse FROM/JOIN clause."))?;
        let (alias1, alias2) = (&caps[2], &caps[5]);
        if TableAlias::parse(alias1) != Some(TableAlias::T1) || TableAlias::parse(alias2) != Some(TableAlias::T2) {
            return Err(GrammarParseError::new(&caps[0], "Must use aliases T1 and T2."));
        }
        let join_type = if caps[3].to_ascii_uppercase().contains("ANTI") {
            JoinType::Anti
        } else {
            JoinType::Inner
        };
        let query = VisualQuery::join(unquote(&caps[1]), unquote(&caps[4]), join_type);
        (query, &rest[caps[0].len()..])
    } else {
        let caps = filter_from_pattern()
            .captures(rest)
            .ok_or_else(|| GrammarParseError::new(rest, "Could not parse FROM clause."))?;
        if let Some(alias) = caps.get(2) {
            if TableAlias::parse(alias.as_str()) != Some(TableAlias::T1) {
                return Err(GrammarParseError::new(&caps[0], "Alias for single table must be T1 if provided."));
            }
        }
        (VisualQuery::single(unquote(&caps[1])), &rest[caps[0].len()..])
    };

    let mut tail_parser = TailParser::new(tail, join_form);
    let clauses = tail_parser.parse()?;

    query.output_fields = output_fields;
    query.conditions_list = TokenList::from_parsed(clauses.joins, clauses.filters);
    query.group_by = clauses.group_by;

    Ok(ParsedQuery {
        query,
        limit: clauses.limit,
    })
}

fn parse_output_fields(fields: &str) -> Vec<String> {
    if fields.trim() == FIELDS_PLACEHOLDER {
        return Vec::new();
    }
    fields
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

fn unquote(name: &str) -> String {
    name.replace("''", "'")
}

fn quote(name: &str) -> String {
    name.replace('\'', "''")
}

/// 把 `T1: field` 形式的标签改写为 `T1.field`
fn dotted(label: &str) -> String {
    match FieldRef::parse(label) {
        Some(field) => qualified_field(field.table, &field.field),
        None => label.to_string(),
    }
}

/// 生成 SQL 视图文本
pub fn render_query_text(query: &VisualQuery, limit: Option<usize>) -> String {
    if query.table1.trim().is_empty() {
        return NO_TABLE_MESSAGE.to_string();
    }

    let select_clause = if query.output_fields.is_empty() {
        FIELDS_PLACEHOLDER.to_string()
    } else {
        query.output_fields.join(",\n  ")
    };

    let mut join_conditions = Vec::new();
    let mut filter_parts = Vec::new();
    for token in query.conditions_list.tokens() {
        match token {
            QueryToken::Operator { value } => filter_parts.push(value.to_string()),
            QueryToken::Condition { data } => match data {
                ConditionData::Join(leaf) => join_conditions.push(leaf.to_string()),
                ConditionData::Filter(leaf) => filter_parts.push(leaf.to_string()),
            },
        }
    }

    let where_str = if filter_parts.is_empty() {
        String::new()
    } else {
        format!("\nWHERE\n  {}", filter_parts.join(" "))
    };
    let group_str = if query.group_by.is_empty() {
        String::new()
    } else {
        let fields: Vec<String> = query.group_by.iter().map(|f| dotted(f)).collect();
        format!("\nGROUP BY\n  {}", fields.join(",\n  "))
    };
    let limit_str = limit.map(|n| format!("\nLIMIT {}", n)).unwrap_or_default();

    match query.second_table() {
        None => format!(
            "SELECT\n  {}\nFROM\n  '{}' AS T1{}{}{};",
            select_clause,
            quote(&query.table1),
            where_str,
            group_str,
            limit_str
        ),
        Some(table2) => {
            let on_clause = if join_conditions.is_empty() {
                JOIN_PLACEHOLDER.to_string()
            } else {
                join_conditions.join("\n    AND ")
            };
            format!(
                "SELECT\n  {}\nFROM\n  '{}' AS T1\n{}\n  '{}' AS T2\n  ON {}{}{}{};",
                select_clause,
                quote(&query.table1),
                query.query_type.keyword(),
                quote(table2),
                on_clause,
                where_str,
                group_str,
                limit_str
            )
        }
    }
}

#[derive(Debug, Default)]
struct TailClauses {
    joins: Vec<JoinLeaf>,
    filters: Vec<QueryToken>,
    group_by: Vec<String>,
    limit: Option<usize>,
}

/// FROM 子句之后的部分：ON / WHERE / GROUP BY / LIMIT
struct TailParser<'a> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    position: usize,
    join_form: bool,
}

impl<'a> TailParser<'a> {
    fn new(source: &'a str, join_form: bool) -> Self {
        Self {
            source,
            tokens: Lexer::new(source).collect(),
            position: 0,
            join_form,
        }
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.position)
    }

    fn peek_kind(&self) -> Option<&TokenKind<'a>> {
        self.peek().map(|t| &t.kind)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Identifier(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn eat(&mut self, expected: &TokenKind) -> bool {
        match self.peek() {
            Some(token) if token.kind == *expected => {
                self.position += 1;
                true
            }
            _ => false,
        }
    }

    /// 当前位置开始的剩余文本，用于错误信息
    fn rest_text(&self) -> &'a str {
        match self.peek() {
            Some(token) => &self.source[token.span.start..],
            None => "",
        }
    }

    fn text_since(&self, start: usize) -> &'a str {
        let Some(first) = self.tokens.get(start) else {
            return "";
        };
        let end = self
            .position
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span.end)
            .unwrap_or(first.span.end)
            .max(first.span.end);
        &self.source[first.span.start..end]
    }

    /// 子句边界：GROUP BY、LIMIT、分号或输入结束
    fn at_clause_end(&self) -> bool {
        match self.peek_kind() {
            None | Some(TokenKind::Semicolon) => true,
            _ => self.at_keyword("GROUP") || self.at_keyword("LIMIT"),
        }
    }

    fn parse(&mut self) -> Result<TailClauses, GrammarParseError> {
        let mut clauses = TailClauses::default();

        if self.eat_keyword("ON") {
            if !self.join_form {
                return Err(GrammarParseError::new(self.source, "ON clause requires a two-table query."));
            }
            clauses.joins = self.parse_on()?;
        } else if self.join_form {
            return Err(GrammarParseError::new(self.source, "Could not find ON clause."));
        }

        if self.eat(&TokenKind::Where) {
            clauses.filters = self.parse_where()?;
        }

        if self.eat_keyword("GROUP") {
            if !self.eat_keyword("BY") {
                return Err(GrammarParseError::new(self.rest_text(), "Expected BY after GROUP."));
            }
            clauses.group_by = self.parse_group_by()?;
        }

        if self.eat_keyword("LIMIT") {
            clauses.limit = Some(self.parse_limit()?);
        }

        self.eat(&TokenKind::Semicolon);
        if self.peek().is_some() {
            return Err(GrammarParseError::new(self.rest_text(), "Unexpected text at end of query."));
        }
        Ok(clauses)
    }

    /// 收集字段名单词，直到运算符或子句边界
    fn field_words(&mut self) -> Vec<&'a str> {
        let mut words = Vec::new();
        while let Some(token) = self.peek() {
            let word = match token.kind {
                TokenKind::Identifier(word) | TokenKind::Number(word) => word,
                _ => break,
            };
            if self.at_keyword("GROUP") || self.at_keyword("LIMIT") || word.parse::<CompOp>().is_ok() {
                break;
            }
            words.push(word);
            self.position += 1;
        }
        words
    }

    /// 引号中的字段名：`T1."Valid From"` 或不带前缀的 `"Valid From"`
    fn quoted_field(&mut self, default: TableAlias) -> Option<(TableAlias, String)> {
        let (alias, consumed) = match self.peek_kind()? {
            TokenKind::Identifier(word) => (TableAlias::parse(word.strip_suffix('.')?)?, 2),
            TokenKind::String(_) => (default, 1),
            _ => return None,
        };
        let string = self.tokens.get(self.position + consumed - 1)?;
        let TokenKind::String(content) = string.kind else {
            return None;
        };
        let field = match self.source[string.span.start..].chars().next() {
            Some('\'') => content.replace("''", "'"),
            _ => content.to_string(),
        };
        self.position += consumed;
        Some((alias, field))
    }

    /// 解析 `[T1.|T2.]field`，省略前缀时使用 `default`
    fn field_ref(&mut self, default: TableAlias) -> Option<(TableAlias, String)> {
        if let Some(quoted) = self.quoted_field(default) {
            return Some(quoted);
        }
        let words = self.field_words();
        let (first, rest) = words.split_first()?;
        let (alias, head) = match first.split_once('.') {
            Some((prefix, field)) => match TableAlias::parse(prefix) {
                Some(alias) => (alias, field),
                None => (default, *first),
            },
            None => (default, *first),
        };
        let mut field = head.to_string();
        for word in rest {
            field.push(' ');
            field.push_str(word);
        }
        (!field.is_empty()).then_some((alias, field))
    }

    fn parse_on(&mut self) -> Result<Vec<JoinLeaf>, GrammarParseError> {
        if matches!(self.peek_kind(), Some(TokenKind::Illegal)) {
            return Err(GrammarParseError::new(self.rest_text(), "Join conditions are not defined."));
        }

        let mut joins = Vec::new();
        loop {
            let start = self.position;
            let left = self.field_ref(TableAlias::T1);
            let has_eq = self.eat(&TokenKind::Eq);
            let right = self.field_ref(TableAlias::T2);
            match (left, has_eq, right) {
                (Some((TableAlias::T1, t1_field)), true, Some((TableAlias::T2, t2_field))) => {
                    joins.push(JoinLeaf::new(t1_field, t2_field));
                }
                _ => {
                    return Err(GrammarParseError::new(
                        self.text_since(start),
                        format!("Invalid join condition: '{}'", self.text_since(start).trim()),
                    ));
                }
            }
            if !self.eat(&TokenKind::And) {
                break;
            }
        }
        Ok(joins)
    }

    fn parse_where(&mut self) -> Result<Vec<QueryToken>, GrammarParseError> {
        let start = self.position;
        let mut tokens = Vec::new();

        while !self.at_clause_end() {
            let op = match self.peek_kind() {
                Some(TokenKind::LParen) => Some(LogicalOp::LParen),
                Some(TokenKind::RParen) => Some(LogicalOp::RParen),
                Some(TokenKind::And) => Some(LogicalOp::And),
                Some(TokenKind::Or) => Some(LogicalOp::Or),
                Some(TokenKind::Not) => Some(LogicalOp::Not),
                _ => None,
            };
            match op {
                Some(op) => {
                    self.position += 1;
                    tokens.push(QueryToken::op(op));
                }
                None => tokens.push(QueryToken::filter(self.parse_filter_condition()?)),
            }
        }

        if tokens.is_empty() {
            return Err(GrammarParseError::new(self.rest_text(), "WHERE clause has no conditions."));
        }
        validate(&tokens).map_err(|e| GrammarParseError::new(self.text_since(start), e.message))?;
        Ok(tokens)
    }

    fn parse_filter_condition(&mut self) -> Result<ConditionLeaf, GrammarParseError> {
        let start = self.position;
        let invalid = |parser: &Self| {
            let text = parser.text_since(start);
            GrammarParseError::new(text, format!("Invalid condition: '{}'", text.trim()))
        };

        let date_part = match (self.peek_kind(), self.tokens.get(self.position + 1).map(|t| &t.kind)) {
            (Some(TokenKind::Identifier(word)), Some(TokenKind::Of)) => {
                let part = DatePart::parse(word);
                if part.is_some() {
                    self.position += 2;
                }
                part
            }
            _ => None,
        };

        let Some((table, field)) = self.field_ref(TableAlias::T1) else {
            self.position += 1;
            return Err(invalid(self));
        };
        if table == TableAlias::T2 && !self.join_form {
            return Err(GrammarParseError::new(
                self.text_since(start),
                "T2 is not available in a single-table query.",
            ));
        }

        let Some(op) = self.comparison_operator() else {
            return Err(invalid(self));
        };

        let value = match self.peek_kind() {
            Some(TokenKind::String(content)) => content.replace("''", "'"),
            Some(TokenKind::Number(number)) => number.to_string(),
            _ => {
                self.position += 1;
                return Err(invalid(self));
            }
        };
        self.position += 1;

        let leaf = ConditionLeaf::new(table, field, op, value);
        Ok(match date_part {
            Some(part) => leaf.with_date_part(part),
            None => leaf,
        })
    }

    fn comparison_operator(&mut self) -> Option<CompOp> {
        let next = self.tokens.get(self.position + 1).map(|t| &t.kind);
        let (op, consumed) = match (self.peek_kind()?, next) {
            (TokenKind::Not, Some(TokenKind::Contains)) => (CompOp::NotContains, 2),
            (TokenKind::Contains, _) => (CompOp::Contains, 1),
            (TokenKind::Starts, Some(TokenKind::With)) => (CompOp::StartsWith, 2),
            (TokenKind::Ends, Some(TokenKind::With)) => (CompOp::EndsWith, 2),
            (TokenKind::Eq, _) => (CompOp::Eq, 1),
            (TokenKind::NotEq, _) => (CompOp::NotEq, 1),
            (TokenKind::Gt, _) => (CompOp::Gt, 1),
            (TokenKind::Lt, _) => (CompOp::Lt, 1),
            (TokenKind::Gte, _) => (CompOp::Gte, 1),
            (TokenKind::Lte, _) => (CompOp::Lte, 1),
            (TokenKind::Identifier(word), _) => (word.parse::<CompOp>().ok()?, 1),
            _ => return None,
        };
        self.position += consumed;
        Some(op)
    }

    fn parse_group_by(&mut self) -> Result<Vec<String>, GrammarParseError> {
        let mut fields = Vec::new();
        loop {
            let start = self.position;
            match self.field_ref(TableAlias::T1) {
                Some((alias, field)) => fields.push(format!("{}: {}", alias, field)),
                None => {
                    return Err(GrammarParseError::new(self.rest_text(), "Invalid GROUP BY field list."));
                }
            }
            if self.position == start || !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(fields)
    }

    fn parse_limit(&mut self) -> Result<usize, GrammarParseError> {
        let limit = match self.peek_kind() {
            Some(TokenKind::Number(number)) => number.parse::<usize>().ok(),
            _ => None,
        };
        match limit {
            Some(limit) => {
                self.position += 1;
                Ok(limit)
            }
            None => Err(GrammarParseError::new(self.rest_text(), "LIMIT requires a non-negative integer.")),
        }
    }
}
