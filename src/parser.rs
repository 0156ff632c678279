//! 简易查询的语法分析器
//!
//! ## 解析流程图
//!
//! ```text
//! parse()
//!   ├─ 期望 "show"
//!   ├─ parse_field_list()        直到 "where" 或输入结束
//!   │    ├─ 逗号分隔的字段，多个单词组成一个字段名 (first name)
//!   │    └─ "all" / "all fields" / "*" / 空列表 → 全部字段
//!   │
//!   └─ "where" → parse_condition() ("and" 分隔)
//!                  ├─ (year|month|day) of 字段 → 只允许关系运算符
//!                  ├─ 字段
//!                  ├─ parse_operator()
//!                  │    ├─ is / is not          → = / !=
//!                  │    ├─ contains / not contains
//!                  │    ├─ starts with / ends with
//!                  │    └─ = != <> > < >= <=
//!                  └─ 值：原始文本，去掉外层引号
//! ```
//!
//! ## 解析示例
//!
//! ```text
//! show name, city where age > 30 and status starts with 'active'
//! show all where year of created >= 2020
//! show where name is not 'Bob'
//! ```
//!
//! 字段名必须存在于表的列中；错误携带原始文本中的字符区间 `(start, end)`，
//! 便于编辑器高亮。

use crate::ast::{CompOp, ConditionLeaf, ConditionNode, DatePart, TableAlias};
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};
use thiserror::Error;

/// 简易查询的解析错误，区间为字符偏移
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DslError {
    #[error("Invalid query. Must start with 'show'.")]
    MissingShow,

    #[error("Field '{field}' not found.")]
    FieldNotFound { field: String, span: (usize, usize) },

    #[error("{message}")]
    InvalidCondition { message: String, span: (usize, usize) },

    #[error("'all' cannot be combined with named fields")]
    MixedWildcard { span: (usize, usize) },
}

impl DslError {
    /// 需要高亮的字符区间
    pub fn span(&self) -> Option<(usize, usize)> {
        match self {
            DslError::MissingShow => None,
            DslError::FieldNotFound { span, .. }
            | DslError::InvalidCondition { span, .. }
            | DslError::MixedWildcard { span } => Some(*span),
        }
    }
}

/// 解析后的简易查询，作用于单个表
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleQuery {
    /// 已展开的输出字段（通配符展开为全部列）
    pub fields: Vec<String>,
    /// 以 AND 连接的条件
    pub conditions: Vec<ConditionLeaf>,
}

impl SimpleQuery {
    /// 条件组成的 AND 树；没有条件时返回 `None`
    pub fn condition_tree(&self) -> Option<ConditionNode> {
        match self.conditions.as_slice() {
            [] => None,
            [single] => Some(ConditionNode::Leaf(single.clone())),
            many => Some(ConditionNode::and(
                many.iter().cloned().map(ConditionNode::Leaf).collect(),
            )),
        }
    }
}

/// 解析 `show … where …`，字段按 `columns` 校验
pub fn parse_simple_query(text: &str, columns: &[String]) -> Result<SimpleQuery, DslError> {
    Parser::new(text, columns).parse()
}

enum FieldItem {
    Wildcard(Span),
    Named(String, Span),
}

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    position: usize,
    columns: &'a [String],
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, columns: &'a [String]) -> Self {
        Self {
            source,
            tokens: Lexer::new(source).collect(),
            position: 0,
            columns,
        }
    }

    /// 返回当前 token，不推进位置
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.position)
    }

    /// 当前 token 类型匹配时消费它
    fn eat(&mut self, expected: &TokenKind) -> bool {
        match self.peek() {
            Some(token) if std::mem::discriminant(&token.kind) == std::mem::discriminant(expected) => {
                self.position += 1;
                true
            }
            _ => false,
        }
    }

    fn chars(&self, span: Span) -> (usize, usize) {
        span.char_range(self.source)
    }

    /// 输入末尾的空区间
    fn end_span(&self) -> Span {
        Span::new(self.source.len(), self.source.len())
    }

    /// token 的文本：字符串取引号内的内容，其他取原始文本
    fn text_of(&self, token: &Token<'a>) -> String {
        match token.kind {
            TokenKind::String(content) => unescape(content, self.quote_of(token)),
            _ => self.source[token.span.start..token.span.end].to_string(),
        }
    }

    fn quote_of(&self, token: &Token<'a>) -> char {
        self.source[token.span.start..].chars().next().unwrap_or('\'')
    }

    fn invalid(&self, message: impl Into<String>, span: Span) -> DslError {
        DslError::InvalidCondition {
            message: message.into(),
            span: self.chars(span),
        }
    }

    pub fn parse(&mut self) -> Result<SimpleQuery, DslError> {
        if !self.eat(&TokenKind::Show) {
            return Err(DslError::MissingShow);
        }

        let fields = self.parse_field_list()?;

        let mut conditions = Vec::new();
        if self.eat(&TokenKind::Where) {
            loop {
                conditions.push(self.parse_condition()?);
                if !self.eat(&TokenKind::And) {
                    break;
                }
            }
        }

        self.eat(&TokenKind::Semicolon);
        if let Some(token) = self.peek() {
            return Err(self.invalid("Unexpected input after query", token.span));
        }

        Ok(SimpleQuery { fields, conditions })
    }

    /// 解析 `show` 与 `where` 之间的字段列表
    fn parse_field_list(&mut self) -> Result<Vec<String>, DslError> {
        let start = self.position;
        while let Some(token) = self.peek() {
            if matches!(token.kind, TokenKind::Where | TokenKind::Semicolon) {
                break;
            }
            self.position += 1;
        }

        let mut items = Vec::new();
        for group in self.tokens[start..self.position].split(|t| t.kind == TokenKind::Comma) {
            if let Some(item) = self.field_item(group)? {
                items.push(item);
            }
        }

        let wildcard = items.iter().find_map(|item| match item {
            FieldItem::Wildcard(span) => Some(*span),
            FieldItem::Named(..) => None,
        });
        let has_named = items.iter().any(|item| matches!(item, FieldItem::Named(..)));

        match (wildcard, has_named) {
            (Some(span), true) => Err(DslError::MixedWildcard { span: self.chars(span) }),
            (_, false) => Ok(self.columns.to_vec()),
            (None, true) => {
                let mut fields = Vec::with_capacity(items.len());
                for item in items {
                    if let FieldItem::Named(name, span) = item {
                        self.check_field(&name, span)?;
                        fields.push(name);
                    }
                }
                Ok(fields)
            }
        }
    }

    fn field_item(&self, group: &[Token<'a>]) -> Result<Option<FieldItem>, DslError> {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            return Ok(None);
        };
        let span = first.span.to(last.span);

        if let Some(bad) = group.iter().find(|t| t.kind == TokenKind::Illegal) {
            return Err(self.invalid("Unexpected character in field list", bad.span));
        }

        let words: Vec<String> = group.iter().map(|t| self.text_of(t)).collect();
        let is_wildcard = match words.as_slice() {
            [w] => w == "*" || w.eq_ignore_ascii_case("all"),
            [a, b] => a.eq_ignore_ascii_case("all") && b.eq_ignore_ascii_case("fields"),
            _ => false,
        };

        Ok(Some(if is_wildcard {
            FieldItem::Wildcard(span)
        } else {
            FieldItem::Named(words.join(" "), span)
        }))
    }

    fn check_field(&self, field: &str, span: Span) -> Result<(), DslError> {
        if self.columns.iter().any(|c| c == field) {
            Ok(())
        } else {
            Err(DslError::FieldNotFound {
                field: field.to_string(),
                span: self.chars(span),
            })
        }
    }

    /// 解析一个条件，直到顶层的 `and` 或输入结束
    fn parse_condition(&mut self) -> Result<ConditionLeaf, DslError> {
        let start = self.position;
        while let Some(token) = self.peek() {
            if matches!(token.kind, TokenKind::And | TokenKind::Semicolon) {
                break;
            }
            self.position += 1;
        }
        let part = &self.tokens[start..self.position];

        let (Some(first), Some(last)) = (part.first(), part.last()) else {
            let span = self.peek().map(|t| t.span).unwrap_or_else(|| self.end_span());
            return Err(self.invalid("Missing condition", span));
        };
        let part_span = first.span.to(last.span);

        // (year|month|day) of <field> <op> <value>
        if let [Token { kind: TokenKind::Identifier(func), .. }, Token { kind: TokenKind::Of, .. }, rest @ ..] = part {
            if let Some(date_part) = DatePart::parse(func) {
                let Some(op_index) = rest.iter().position(|t| t.kind.is_relational()) else {
                    return Err(self.invalid("Invalid operator for date function.", part_span));
                };
                let (field, field_span) = self.field_name(&rest[..op_index], part_span)?;
                let op = relational_op(&rest[op_index].kind).ok_or_else(|| {
                    self.invalid("Invalid operator for date function.", rest[op_index].span)
                })?;
                let value = self.value_text(&rest[op_index + 1..]);
                self.check_field(&field, field_span)?;
                return Ok(ConditionLeaf::new(TableAlias::T1, field, op, value).with_date_part(date_part));
            }
        }

        let Some(op_index) = part.iter().position(|t| is_operator_start(&t.kind)) else {
            let text = &self.source[part_span.start..part_span.end];
            return Err(self.invalid(format!("Invalid condition format: '{}'", text), part_span));
        };
        let (field, field_span) = self.field_name(&part[..op_index], part_span)?;
        let (op, consumed) = self.parse_operator(&part[op_index..])?;
        let value = self.value_text(&part[op_index + consumed..]);
        self.check_field(&field, field_span)?;

        Ok(ConditionLeaf::new(TableAlias::T1, field, op, value))
    }

    fn field_name(&self, tokens: &[Token<'a>], part_span: Span) -> Result<(String, Span), DslError> {
        let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
            return Err(self.invalid("Missing field name in condition", part_span));
        };
        // 值按原始文本截取，只有字段名不允许非法字符
        if let Some(bad) = tokens.iter().find(|t| t.kind == TokenKind::Illegal) {
            return Err(self.invalid("Unexpected character in condition", bad.span));
        }
        let words: Vec<String> = tokens.iter().map(|t| self.text_of(t)).collect();
        Ok((words.join(" "), first.span.to(last.span)))
    }

    /// 返回运算符以及它占用的 token 数
    fn parse_operator(&self, tokens: &[Token<'a>]) -> Result<(CompOp, usize), DslError> {
        let kinds: Vec<&TokenKind> = tokens.iter().take(2).map(|t| &t.kind).collect();
        let parsed = match kinds.as_slice() {
            [TokenKind::Is, TokenKind::Not, ..] => Some((CompOp::NotEq, 2)),
            [TokenKind::Is, ..] => Some((CompOp::Eq, 1)),
            [TokenKind::Not, TokenKind::Contains, ..] => Some((CompOp::NotContains, 2)),
            [TokenKind::Contains, ..] => Some((CompOp::Contains, 1)),
            [TokenKind::Starts, TokenKind::With, ..] => Some((CompOp::StartsWith, 2)),
            [TokenKind::Ends, TokenKind::With, ..] => Some((CompOp::EndsWith, 2)),
            [kind, ..] => relational_op(kind).map(|op| (op, 1)),
            [] => None,
        };
        parsed.ok_or_else(|| {
            let span = tokens.first().map(|t| t.span).unwrap_or_else(|| self.end_span());
            self.invalid("Invalid operator", span)
        })
    }

    /// 值是原始文本；单个带引号的字面量去掉引号
    fn value_text(&self, tokens: &[Token<'a>]) -> String {
        match tokens {
            [] => String::new(),
            [single] => self.text_of(single),
            [first, .., last] => {
                let raw = self.source[first.span.start..last.span.end].trim();
                strip_quotes(raw).to_string()
            }
        }
    }
}

fn is_operator_start(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Is | TokenKind::Not | TokenKind::Contains | TokenKind::Starts | TokenKind::Ends
    ) || kind.is_relational()
}

fn relational_op(kind: &TokenKind) -> Option<CompOp> {
    match kind {
        TokenKind::Eq => Some(CompOp::Eq),
        TokenKind::NotEq => Some(CompOp::NotEq),
        TokenKind::Gt => Some(CompOp::Gt),
        TokenKind::Lt => Some(CompOp::Lt),
        TokenKind::Gte => Some(CompOp::Gte),
        TokenKind::Lte => Some(CompOp::Lte),
        _ => None,
    }
}

fn unescape(content: &str, quote: char) -> String {
    if quote == '\'' {
        content.replace("''", "'")
    } else {
        content.to_string()
    }
}

fn strip_quotes(raw: &str) -> &str {
    for quote in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}
