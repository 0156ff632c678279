//! Expression builder: turns the ordered condition token list into a
//! condition tree.
//!
//! ```text
//! [T1.age > '30', AND, (, T1.city = 'Oslo', OR, NOT, T1.vip = 'yes', )]
//!
//!                 AND
//!               /     \
//!     age > 30          OR
//!                     /    \
//!           city = Oslo    NOT
//!                           |
//!                      vip = yes
//! ```
//!
//! Join leaves live in the same list but never take part in the boolean
//! expression; they are skipped here and feed the join key instead.

use crate::ast::{ConditionData, ConditionNode, GroupKind, JoinLeaf, LogicalOp, QueryToken};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Invalid operator sequencing or unbalanced parentheses.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
    /// Offending token index in the original list, used for highlighting.
    pub index: Option<usize>,
}

impl SyntaxError {
    fn at(index: usize, message: &str) -> Self {
        Self {
            message: message.to_string(),
            index: Some(index),
        }
    }

    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            index: None,
        }
    }
}

/// Ordered sequence of condition and operator tokens.
///
/// Mutated only by appending/removing tokens or by replacing the whole
/// list (from a parsed text query or a loaded configuration).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenList {
    tokens: Vec<QueryToken>,
}

impl TokenList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tokens(tokens: Vec<QueryToken>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[QueryToken] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn push(&mut self, token: QueryToken) {
        self.tokens.push(token);
    }

    pub fn push_condition(&mut self, data: ConditionData) {
        self.tokens.push(QueryToken::Condition { data });
    }

    pub fn push_operator(&mut self, op: LogicalOp) {
        self.tokens.push(QueryToken::op(op));
    }

    /// Removes the tokens at the given indices; out-of-range indices are ignored.
    pub fn remove(&mut self, indices: &[usize]) {
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        for index in sorted.into_iter().rev() {
            if index < self.tokens.len() {
                self.tokens.remove(index);
            }
        }
    }

    /// Canonical list rebuilt from a parsed text query: join leaves first,
    /// then the filter tokens in their original order.
    pub fn from_parsed(joins: Vec<JoinLeaf>, filters: Vec<QueryToken>) -> Self {
        let mut tokens: Vec<QueryToken> = joins.into_iter().map(QueryToken::join).collect();
        tokens.extend(filters);
        Self { tokens }
    }

    /// Replaces the whole list, e.g. after parsing a text query.
    pub fn replace(&mut self, tokens: Vec<QueryToken>) {
        self.tokens = tokens;
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    pub fn join_leaves(&self) -> Vec<&JoinLeaf> {
        self.tokens
            .iter()
            .filter_map(|token| match token {
                QueryToken::Condition {
                    data: ConditionData::Join(leaf),
                } => Some(leaf),
                _ => None,
            })
            .collect()
    }

    /// Tokens that make up the filter expression, i.e. everything but join leaves.
    pub fn filter_tokens(&self) -> Vec<QueryToken> {
        self.tokens.iter().filter(|t| !t.is_join()).cloned().collect()
    }

    pub fn display_lines(&self) -> Vec<String> {
        self.tokens.iter().map(QueryToken::display_text).collect()
    }

    pub fn validate(&self) -> Result<(), SyntaxError> {
        validate(&self.tokens)
    }

    pub fn build_tree(&self) -> Result<Option<ConditionNode>, SyntaxError> {
        build_tree(&self.tokens)
    }
}

impl From<Vec<QueryToken>> for TokenList {
    fn from(tokens: Vec<QueryToken>) -> Self {
        Self::from_tokens(tokens)
    }
}

/// Single left-to-right scan checking paren balance and operand/operator
/// alternation. Join leaves are skipped.
pub fn validate(tokens: &[QueryToken]) -> Result<(), SyntaxError> {
    let mut open_parens: Vec<usize> = Vec::new();
    let mut expect_operand = true;
    let mut last_index = None;

    for (index, token) in tokens.iter().enumerate() {
        if token.is_join() {
            continue;
        }
        last_index = Some(index);

        match token {
            QueryToken::Condition { .. } => {
                if !expect_operand {
                    return Err(SyntaxError::at(index, "Invalid operator sequence: missing AND/OR before condition"));
                }
                expect_operand = false;
            }
            QueryToken::Operator { value } => match value {
                LogicalOp::LParen => {
                    if !expect_operand {
                        return Err(SyntaxError::at(index, "Invalid operator sequence: missing AND/OR before '('"));
                    }
                    open_parens.push(index);
                }
                LogicalOp::RParen => {
                    if open_parens.pop().is_none() {
                        return Err(SyntaxError::at(index, "Mismatched ')'"));
                    }
                    if expect_operand {
                        return Err(SyntaxError::at(index, "Incomplete expression before ')'"));
                    }
                }
                LogicalOp::And | LogicalOp::Or => {
                    if expect_operand {
                        return Err(SyntaxError::at(index, "Invalid operator sequence"));
                    }
                    expect_operand = true;
                }
                LogicalOp::Not => {
                    if !expect_operand {
                        return Err(SyntaxError::at(index, "NOT must precede a condition or '('"));
                    }
                }
            },
        }
    }

    if let Some(&index) = open_parens.last() {
        return Err(SyntaxError::at(index, "Mismatched '('"));
    }
    if let (true, Some(index)) = (expect_operand, last_index) {
        return Err(SyntaxError::at(index, "Incomplete expression: operator without operand"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum StackOp {
    Paren,
    Logical(GroupKind),
}

fn precedence(kind: GroupKind) -> u8 {
    match kind {
        GroupKind::Or => 1,
        GroupKind::And => 2,
        GroupKind::Not => 3,
    }
}

fn reduce(kind: GroupKind, index: usize, operands: &mut Vec<ConditionNode>) -> Result<(), SyntaxError> {
    match kind {
        GroupKind::Not => {
            let operand = operands
                .pop()
                .ok_or_else(|| SyntaxError::at(index, "Invalid syntax for NOT"))?;
            operands.push(ConditionNode::negate(operand));
        }
        GroupKind::And | GroupKind::Or => {
            if operands.len() < 2 {
                return Err(SyntaxError::at(index, "Invalid syntax for AND/OR"));
            }
            let right = operands.pop().ok_or_else(|| SyntaxError::at(index, "Invalid syntax for AND/OR"))?;
            let left = operands.pop().ok_or_else(|| SyntaxError::at(index, "Invalid syntax for AND/OR"))?;
            operands.push(ConditionNode::Group(kind, vec![left, right]));
        }
    }
    Ok(())
}

/// Two-stack shunting-yard conversion of the filter tokens into a tree.
///
/// Returns `Ok(None)` when the list holds no filter tokens at all. Operands
/// left over without a connecting operator are combined under AND.
pub fn build_tree(tokens: &[QueryToken]) -> Result<Option<ConditionNode>, SyntaxError> {
    let mut operands: Vec<ConditionNode> = Vec::new();
    let mut operators: Vec<(StackOp, usize)> = Vec::new();
    let mut saw_filter_token = false;

    for (index, token) in tokens.iter().enumerate() {
        match token {
            QueryToken::Condition {
                data: ConditionData::Join(_),
            } => continue,
            QueryToken::Condition {
                data: ConditionData::Filter(leaf),
            } => operands.push(ConditionNode::Leaf(leaf.clone())),
            QueryToken::Operator { value } => match value {
                LogicalOp::LParen => operators.push((StackOp::Paren, index)),
                LogicalOp::RParen => loop {
                    match operators.pop() {
                        Some((StackOp::Paren, _)) => break,
                        Some((StackOp::Logical(kind), op_index)) => reduce(kind, op_index, &mut operands)?,
                        None => return Err(SyntaxError::at(index, "Mismatched parentheses")),
                    }
                },
                LogicalOp::Not => operators.push((StackOp::Logical(GroupKind::Not), index)),
                LogicalOp::And | LogicalOp::Or => {
                    let kind = if *value == LogicalOp::And { GroupKind::And } else { GroupKind::Or };
                    while let Some(&(StackOp::Logical(top), op_index)) = operators.last() {
                        if precedence(top) < precedence(kind) {
                            break;
                        }
                        operators.pop();
                        reduce(top, op_index, &mut operands)?;
                    }
                    operators.push((StackOp::Logical(kind), index));
                }
            },
        }
        saw_filter_token = true;
    }

    while let Some((op, index)) = operators.pop() {
        match op {
            StackOp::Paren => return Err(SyntaxError::at(index, "Mismatched parentheses")),
            StackOp::Logical(kind) => reduce(kind, index, &mut operands)?,
        }
    }

    match operands.len() {
        0 if saw_filter_token => Err(SyntaxError::new("Condition list contains no conditions")),
        0 => Ok(None),
        1 => Ok(operands.pop()),
        n => {
            debug!(operands = n, "combining leftover operands under AND");
            Ok(Some(ConditionNode::and(operands)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompOp, ConditionLeaf, TableAlias};

    fn cond(field: &str) -> QueryToken {
        QueryToken::filter(ConditionLeaf::new(TableAlias::T1, field, CompOp::Eq, "x"))
    }

    fn op(value: LogicalOp) -> QueryToken {
        QueryToken::op(value)
    }

    fn leaf(field: &str) -> ConditionNode {
        ConditionNode::Leaf(ConditionLeaf::new(TableAlias::T1, field, CompOp::Eq, "x"))
    }

    fn assert_well_formed(node: &ConditionNode) {
        if let ConditionNode::Group(kind, children) = node {
            if *kind == GroupKind::Not {
                assert_eq!(children.len(), 1, "NOT must have exactly one child");
            }
            children.iter().for_each(assert_well_formed);
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        use LogicalOp::*;
        let tokens = vec![cond("a"), op(Or), cond("b"), op(And), cond("c")];
        validate(&tokens).unwrap();
        let tree = build_tree(&tokens).unwrap().unwrap();
        assert_eq!(
            tree,
            ConditionNode::or(vec![leaf("a"), ConditionNode::and(vec![leaf("b"), leaf("c")])])
        );
    }

    #[test]
    fn test_parentheses_override_precedence() {
        use LogicalOp::*;
        let tokens = vec![op(LParen), cond("a"), op(Or), cond("b"), op(RParen), op(And), cond("c")];
        validate(&tokens).unwrap();
        let tree = build_tree(&tokens).unwrap().unwrap();
        assert_eq!(
            tree,
            ConditionNode::and(vec![ConditionNode::or(vec![leaf("a"), leaf("b")]), leaf("c")])
        );
    }

    #[test]
    fn test_not_binds_tightest_and_nests() {
        use LogicalOp::*;
        let tokens = vec![op(Not), cond("a"), op(And), op(Not), op(Not), cond("b")];
        validate(&tokens).unwrap();
        let tree = build_tree(&tokens).unwrap().unwrap();
        assert_eq!(
            tree,
            ConditionNode::and(vec![
                ConditionNode::negate(leaf("a")),
                ConditionNode::negate(ConditionNode::negate(leaf("b"))),
            ])
        );
        assert_well_formed(&tree);
    }

    #[test]
    fn test_not_over_group() {
        use LogicalOp::*;
        let tokens = vec![op(Not), op(LParen), cond("a"), op(Or), cond("b"), op(RParen)];
        let tree = build_tree(&tokens).unwrap().unwrap();
        assert_eq!(tree, ConditionNode::negate(ConditionNode::or(vec![leaf("a"), leaf("b")])));
    }

    #[test]
    fn test_every_leaf_reachable() {
        use LogicalOp::*;
        let tokens = vec![
            cond("a"), op(And), op(LParen), cond("b"), op(Or), op(Not), cond("c"), op(RParen),
            op(Or), cond("d"),
        ];
        validate(&tokens).unwrap();
        let tree = build_tree(&tokens).unwrap().unwrap();
        let fields: Vec<_> = tree.leaves().iter().map(|l| l.field.as_str()).collect();
        assert_eq!(fields, vec!["a", "b", "c", "d"]);
        assert_well_formed(&tree);
    }

    #[test]
    fn test_empty_list_builds_no_tree() {
        assert_eq!(build_tree(&[]).unwrap(), None);
        validate(&[]).unwrap();
    }

    #[test]
    fn test_join_leaves_are_skipped() {
        use crate::ast::JoinLeaf;
        let tokens = vec![
            QueryToken::join(JoinLeaf::new("id", "id")),
            QueryToken::join(JoinLeaf::new("k", "k")),
            cond("a"),
        ];
        validate(&tokens).unwrap();
        assert_eq!(build_tree(&tokens).unwrap(), Some(leaf("a")));

        let only_joins = vec![QueryToken::join(JoinLeaf::new("id", "id"))];
        assert_eq!(build_tree(&only_joins).unwrap(), None);
    }

    #[test]
    fn test_validate_reports_unbalanced_parens() {
        use LogicalOp::*;
        let extra_close = vec![cond("a"), op(RParen), op(And), cond("b")];
        assert_eq!(validate(&extra_close).unwrap_err().index, Some(1));

        let unclosed = vec![op(LParen), cond("a"), op(And), op(LParen), cond("b"), op(RParen)];
        assert_eq!(validate(&unclosed).unwrap_err().index, Some(0));

        let nested_unclosed = vec![cond("z"), op(And), op(LParen), op(LParen), cond("a"), op(RParen)];
        assert_eq!(validate(&nested_unclosed).unwrap_err().index, Some(2));
    }

    #[test]
    fn test_validate_reports_operator_sequencing() {
        use LogicalOp::*;
        assert_eq!(validate(&[op(And), cond("a")]).unwrap_err().index, Some(0));
        assert_eq!(validate(&[op(LParen), op(Or), cond("a"), op(RParen)]).unwrap_err().index, Some(1));
        assert_eq!(validate(&[cond("a"), cond("b")]).unwrap_err().index, Some(1));
        assert_eq!(validate(&[cond("a"), op(Not), cond("b")]).unwrap_err().index, Some(1));
        assert_eq!(validate(&[cond("a"), op(And)]).unwrap_err().index, Some(1));
    }

    #[test]
    fn test_build_tree_mismatched_parens() {
        use LogicalOp::*;
        assert!(build_tree(&[cond("a"), op(RParen)]).is_err());
        assert!(build_tree(&[op(LParen), cond("a")]).is_err());
    }

    #[test]
    fn test_build_tree_operator_without_operands() {
        use LogicalOp::*;
        let err = build_tree(&[cond("a"), op(And)]).unwrap_err();
        assert_eq!(err.index, Some(1));
        assert!(build_tree(&[op(Not)]).is_err());
    }

    #[test]
    fn test_leftover_operands_fall_back_to_and() {
        let tokens = vec![cond("a"), cond("b")];
        assert!(validate(&tokens).is_err());
        let tree = build_tree(&tokens).unwrap().unwrap();
        assert_eq!(tree, ConditionNode::and(vec![leaf("a"), leaf("b")]));
    }

    #[test]
    fn test_token_list_mutation() {
        let mut list = TokenList::new();
        list.push(cond("a"));
        list.push_operator(LogicalOp::And);
        list.push(cond("b"));
        list.push_operator(LogicalOp::Or);
        assert!(list.validate().is_err());

        list.remove(&[3, 10]);
        list.validate().unwrap();
        assert_eq!(list.display_lines(), vec!["T1.a = 'x'", "  AND", "T1.b = 'x'"]);

        list.replace(vec![cond("c")]);
        assert_eq!(list.build_tree().unwrap(), Some(leaf("c")));
    }
}
