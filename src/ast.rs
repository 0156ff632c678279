//! 查询引擎的数据模型
//!
//! 条件 token 列表、条件树、输出表达式以及可视化查询本身。
//! serde 的序列化形状与保存的查询配置文件保持一致。

use crate::expression::TokenList;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// 表别名：左表 T1 或右表 T2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TableAlias {
    #[default]
    T1,
    T2,
}

impl TableAlias {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableAlias::T1 => "T1",
            TableAlias::T2 => "T2",
        }
    }

    /// 解析 `T1` / `T2`（大小写不敏感）
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("T1") {
            Some(TableAlias::T1)
        } else if s.eq_ignore_ascii_case("T2") {
            Some(TableAlias::T2)
        } else {
            None
        }
    }
}

impl fmt::Display for TableAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompOp {
    #[serde(rename = "CONTAINS")]
    Contains,
    #[serde(rename = "NOT CONTAINS", alias = "NOTCONTAINS")]
    NotContains,
    #[serde(rename = "STARTS WITH", alias = "STARTSWITH")]
    StartsWith,
    #[serde(rename = "ENDS WITH", alias = "ENDSWITH")]
    EndsWith,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
}

impl CompOp {
    pub const ALL: [CompOp; 10] = [
        CompOp::Contains,
        CompOp::NotContains,
        CompOp::Eq,
        CompOp::NotEq,
        CompOp::Gt,
        CompOp::Lt,
        CompOp::Gte,
        CompOp::Lte,
        CompOp::StartsWith,
        CompOp::EndsWith,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompOp::Contains => "CONTAINS",
            CompOp::NotContains => "NOT CONTAINS",
            CompOp::StartsWith => "STARTS WITH",
            CompOp::EndsWith => "ENDS WITH",
            CompOp::Eq => "=",
            CompOp::NotEq => "!=",
            CompOp::Gt => ">",
            CompOp::Lt => "<",
            CompOp::Gte => ">=",
            CompOp::Lte => "<=",
        }
    }

    /// 是否为需要数值转换的关系运算符
    pub fn is_relational(&self) -> bool {
        matches!(self, CompOp::Gt | CompOp::Lt | CompOp::Gte | CompOp::Lte)
    }

    /// 对两个可比较的值应用等值或关系运算；文本运算符返回 `None`
    pub fn compare<T: PartialOrd>(&self, left: T, right: T) -> Option<bool> {
        match self {
            CompOp::Eq => Some(left == right),
            CompOp::NotEq => Some(left != right),
            CompOp::Gt => Some(left > right),
            CompOp::Lt => Some(left < right),
            CompOp::Gte => Some(left >= right),
            CompOp::Lte => Some(left <= right),
            _ => None,
        }
    }
}

impl fmt::Display for CompOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompOp {
    type Err = String;

    /// 接受规范写法，多余空白和大小写差异会被忽略（`not   contains` → `NOT CONTAINS`）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        CompOp::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == normalized || op.as_str().replace(' ', "") == normalized)
            .ok_or_else(|| format!("Unknown operator '{}'", s))
    }
}

/// 日期部分提取：`YEAR OF field` 等
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePart {
    Year,
    Month,
    Day,
}

impl DatePart {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "year" => Some(DatePart::Year),
            "month" => Some(DatePart::Month),
            "day" => Some(DatePart::Day),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::Day => "DAY",
        }
    }
}

/// 过滤条件的叶子节点，例如：`T1.status CONTAINS 'open'`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionLeaf {
    #[serde(default)]
    pub table: TableAlias,
    pub field: String,
    pub op: CompOp,
    #[serde(default)]
    pub value: String,
    /// 仅简易查询会产生，例如 `year of created = 2024`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_part: Option<DatePart>,
}

impl ConditionLeaf {
    pub fn new(table: TableAlias, field: impl Into<String>, op: CompOp, value: impl Into<String>) -> Self {
        Self {
            table,
            field: field.into(),
            op,
            value: value.into(),
            date_part: None,
        }
    }

    pub fn with_date_part(mut self, part: DatePart) -> Self {
        self.date_part = Some(part);
        self
    }
}

impl fmt::Display for ConditionLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.value.replace('\'', "''");
        match self.date_part {
            Some(part) => write!(
                f,
                "{} OF {} {} '{}'",
                part.as_str(),
                qualified_field(self.table, &self.field),
                self.op,
                value
            ),
            None => write!(f, "{} {} '{}'", qualified_field(self.table, &self.field), self.op, value),
        }
    }
}

/// 文本形式中与子句、运算符冲突的单词
const CLAUSE_WORDS: [&str; 11] = ["select", "from", "as", "on", "group", "by", "limit", "inner", "left", "anti", "join"];

fn is_plain_field(field: &str) -> bool {
    let mut chars = field.chars();
    let starts_well = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    starts_well
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !crate::lexer::is_keyword(field)
        && !CLAUSE_WORDS.iter().any(|w| w.eq_ignore_ascii_case(field))
        && field.parse::<CompOp>().is_err()
}

/// `T1.field`；不是简单标识符的字段名加引号，例如 `T1."Valid From"`
pub fn qualified_field(table: TableAlias, field: &str) -> String {
    if is_plain_field(field) {
        format!("{}.{}", table, field)
    } else if field.contains('"') {
        format!("{}.'{}'", table, field.replace('\'', "''"))
    } else {
        format!("{}.\"{}\"", table, field)
    }
}

/// 连接条件：`T1.t1_field = T2.t2_field`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinLeaf {
    pub t1_field: String,
    pub t2_field: String,
}

impl JoinLeaf {
    pub fn new(t1_field: impl Into<String>, t2_field: impl Into<String>) -> Self {
        Self {
            t1_field: t1_field.into(),
            t2_field: t2_field.into(),
        }
    }
}

impl fmt::Display for JoinLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {}",
            qualified_field(TableAlias::T1, &self.t1_field),
            qualified_field(TableAlias::T2, &self.t2_field)
        )
    }
}

/// 逻辑运算符及括号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    #[serde(rename = "(")]
    LParen,
    #[serde(rename = ")")]
    RParen,
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
    #[serde(rename = "NOT")]
    Not,
}

impl LogicalOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOp::LParen => "(",
            LogicalOp::RParen => ")",
            LogicalOp::And => "AND",
            LogicalOp::Or => "OR",
            LogicalOp::Not => "NOT",
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, LogicalOp::And | LogicalOp::Or)
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 条件 token 的负载：过滤条件或连接条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConditionData {
    #[serde(rename = "filter")]
    Filter(ConditionLeaf),
    #[serde(rename = "join")]
    Join(JoinLeaf),
}

/// 条件 token 列表中的一个元素，顺序即语法
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueryToken {
    #[serde(rename = "op")]
    Operator { value: LogicalOp },
    #[serde(rename = "cond")]
    Condition { data: ConditionData },
}

impl QueryToken {
    pub fn op(value: LogicalOp) -> Self {
        QueryToken::Operator { value }
    }

    pub fn filter(leaf: ConditionLeaf) -> Self {
        QueryToken::Condition {
            data: ConditionData::Filter(leaf),
        }
    }

    pub fn join(leaf: JoinLeaf) -> Self {
        QueryToken::Condition {
            data: ConditionData::Join(leaf),
        }
    }

    pub fn is_join(&self) -> bool {
        matches!(
            self,
            QueryToken::Condition {
                data: ConditionData::Join(_)
            }
        )
    }

    /// 列表视图中的显示文本，二元运算符缩进两个空格
    pub fn display_text(&self) -> String {
        match self {
            QueryToken::Operator { value } if value.is_binary() => format!("  {}", value),
            QueryToken::Operator { value } => value.to_string(),
            QueryToken::Condition {
                data: ConditionData::Filter(leaf),
            } => leaf.to_string(),
            QueryToken::Condition {
                data: ConditionData::Join(leaf),
            } => leaf.to_string(),
        }
    }
}

/// 条件组的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    And,
    Or,
    Not,
}

/// 已解析的条件树
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    Leaf(ConditionLeaf),
    /// NOT 组恰好有一个子节点
    Group(GroupKind, Vec<ConditionNode>),
}

impl ConditionNode {
    pub fn and(children: Vec<ConditionNode>) -> Self {
        ConditionNode::Group(GroupKind::And, children)
    }

    pub fn or(children: Vec<ConditionNode>) -> Self {
        ConditionNode::Group(GroupKind::Or, children)
    }

    pub fn negate(child: ConditionNode) -> Self {
        ConditionNode::Group(GroupKind::Not, vec![child])
    }

    /// 按从左到右的顺序收集所有叶子
    pub fn leaves(&self) -> Vec<&ConditionLeaf> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a ConditionLeaf>) {
        match self {
            ConditionNode::Leaf(leaf) => out.push(leaf),
            ConditionNode::Group(_, children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }
}

/// 两表查询的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JoinType {
    #[default]
    #[serde(rename = "INNER")]
    Inner,
    #[serde(rename = "ANTI")]
    Anti,
}

impl JoinType {
    /// SQL 视图中的关键字
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::Anti => "LEFT ANTI-JOIN",
        }
    }
}

/// 聚合函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }
}

impl FromStr for AggregateFunc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "COUNT" => Ok(AggregateFunc::Count),
            "SUM" => Ok(AggregateFunc::Sum),
            "AVG" => Ok(AggregateFunc::Avg),
            "MIN" => Ok(AggregateFunc::Min),
            "MAX" => Ok(AggregateFunc::Max),
            _ => Err(format!("Unknown aggregate function '{}'", s)),
        }
    }
}

/// 带表别名的字段引用，文本形式为 `T1: field`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub table: TableAlias,
    pub field: String,
}

impl FieldRef {
    pub fn new(table: TableAlias, field: impl Into<String>) -> Self {
        Self {
            table,
            field: field.into(),
        }
    }

    /// 解析 `T1: field`；没有别名前缀时返回 `None`
    pub fn parse(s: &str) -> Option<Self> {
        let (alias, field) = s.split_once(':')?;
        let table = TableAlias::parse(alias.trim())?;
        Some(Self::new(table, field.trim()))
    }

    /// 结果行中使用的列标签
    pub fn label(&self) -> String {
        format!("{}: {}", self.table, self.field)
    }
}

/// 输出表达式
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSpec {
    /// 普通字段引用，例如 `T1: name`
    Field(String),
    /// 聚合表达式，例如 `COUNT(T1: id)`
    Aggregate { func: AggregateFunc, field: String },
    /// 形如 `name(argument)` 但函数名未知
    Unknown(String),
}

fn aggregate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\w+)\((.+)\)$").expect("valid aggregate pattern"))
}

impl OutputSpec {
    /// 按严格的 `name(argument)` 模式解析输出表达式
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match aggregate_pattern().captures(text) {
            Some(caps) => match caps[1].parse::<AggregateFunc>() {
                Ok(func) => OutputSpec::Aggregate {
                    func,
                    field: caps[2].trim().to_string(),
                },
                Err(_) => OutputSpec::Unknown(text.to_string()),
            },
            None => OutputSpec::Field(text.to_string()),
        }
    }
}

/// 可视化设计器中的查询定义
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisualQuery {
    #[serde(default)]
    pub table1: String,
    /// 空字符串表示单表查询
    #[serde(default)]
    pub table2: String,
    #[serde(default)]
    pub query_type: JoinType,
    #[serde(default)]
    pub conditions_list: TokenList,
    #[serde(default)]
    pub output_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,
}

impl VisualQuery {
    pub fn single(table1: impl Into<String>) -> Self {
        Self {
            table1: table1.into(),
            ..Default::default()
        }
    }

    pub fn join(table1: impl Into<String>, table2: impl Into<String>, query_type: JoinType) -> Self {
        Self {
            table1: table1.into(),
            table2: table2.into(),
            query_type,
            ..Default::default()
        }
    }

    pub fn second_table(&self) -> Option<&str> {
        let name = self.table2.trim();
        (!name.is_empty()).then_some(name)
    }

    pub fn is_join(&self) -> bool {
        self.second_table().is_some()
    }
}
