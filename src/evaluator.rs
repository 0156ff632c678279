//! Predicate evaluation of condition leaves and condition trees against a
//! row pair.
//!
//! Comparisons never fail: numeric or date coercion problems simply mean
//! "no match".

use crate::ast::{CompOp, ConditionLeaf, ConditionNode, DatePart, GroupKind, TableAlias};
use crate::row_source::Row;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::trace;

/// Datetime formats tried in order; first match wins.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%b-%y"];

/// Parses a cell into a date using the known formats.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok().map(|dt| dt.date()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        })
}

/// Lenient float coercion shared by evaluation and aggregation.
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

fn date_part_value(date: NaiveDate, part: DatePart) -> i64 {
    match part {
        DatePart::Year => i64::from(date.year()),
        DatePart::Month => i64::from(date.month()),
        DatePart::Day => i64::from(date.day()),
    }
}

fn compare_text(op: CompOp, cell: &str, value: &str) -> bool {
    let cell = cell.to_lowercase();
    let value = value.to_lowercase();
    match op {
        CompOp::Contains => cell.contains(&value),
        CompOp::NotContains => !cell.contains(&value),
        CompOp::StartsWith => cell.starts_with(&value),
        CompOp::EndsWith => cell.ends_with(&value),
        CompOp::Eq => cell == value,
        CompOp::NotEq => cell != value,
        CompOp::Gt | CompOp::Lt | CompOp::Gte | CompOp::Lte => false,
    }
}

fn compare_numeric(op: CompOp, cell: &str, value: &str) -> bool {
    match (parse_number(cell), parse_number(value)) {
        (Some(cell), Some(value)) => op.compare(cell, value).unwrap_or(false),
        _ => {
            trace!(cell, value, "numeric coercion failed, treating as no match");
            false
        }
    }
}

fn compare_date_part(op: CompOp, part: DatePart, cell: &str, value: &str) -> bool {
    let Some(date) = parse_date(cell) else {
        trace!(cell, "unrecognised date format, treating as no match");
        return false;
    };
    let Ok(expected) = value.trim().parse::<i64>() else {
        return false;
    };
    op.compare(date_part_value(date, part), expected).unwrap_or(false)
}

/// Evaluates a single leaf. A leaf targeting a missing row (the right side
/// of an anti join) never matches.
pub fn eval_leaf(leaf: &ConditionLeaf, row1: &Row, row2: Option<&Row>) -> bool {
    let target = match leaf.table {
        TableAlias::T1 => Some(row1),
        TableAlias::T2 => row2,
    };
    let Some(row) = target else {
        return false;
    };
    let cell = row.get(&leaf.field);

    match leaf.date_part {
        Some(part) => compare_date_part(leaf.op, part, cell, &leaf.value),
        None if leaf.op.is_relational() => compare_numeric(leaf.op, cell, &leaf.value),
        None => compare_text(leaf.op, cell, &leaf.value),
    }
}

/// Evaluates a condition tree with short-circuiting AND/OR.
pub fn eval(node: &ConditionNode, row1: &Row, row2: Option<&Row>) -> bool {
    match node {
        ConditionNode::Leaf(leaf) => eval_leaf(leaf, row1, row2),
        ConditionNode::Group(GroupKind::And, children) => children.iter().all(|c| eval(c, row1, row2)),
        ConditionNode::Group(GroupKind::Or, children) => children.iter().any(|c| eval(c, row1, row2)),
        ConditionNode::Group(GroupKind::Not, children) => {
            !children.first().is_some_and(|c| eval(c, row1, row2))
        }
    }
}

/// Evaluates an optional tree; no conditions means every row matches.
pub fn matches(tree: Option<&ConditionNode>, row1: &Row, row2: Option<&Row>) -> bool {
    tree.map_or(true, |node| eval(node, row1, row2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row_source::RowId;

    fn row(pairs: &[(&str, &str)]) -> Row {
        Row::from_pairs(RowId(1), pairs.iter().copied())
    }

    fn leaf(field: &str, op: CompOp, value: &str) -> ConditionLeaf {
        ConditionLeaf::new(TableAlias::T1, field, op, value)
    }

    #[test]
    fn test_text_operators_are_case_insensitive() {
        let r = row(&[("status", "Active-User")]);
        assert!(eval_leaf(&leaf("status", CompOp::Contains, "USER"), &r, None));
        assert!(!eval_leaf(&leaf("status", CompOp::NotContains, "user"), &r, None));
        assert!(eval_leaf(&leaf("status", CompOp::StartsWith, "active"), &r, None));
        assert!(eval_leaf(&leaf("status", CompOp::EndsWith, "-user"), &r, None));
        assert!(eval_leaf(&leaf("status", CompOp::Eq, "active-user"), &r, None));
        assert!(eval_leaf(&leaf("status", CompOp::NotEq, "inactive"), &r, None));
    }

    #[test]
    fn test_relational_operators_coerce_numbers() {
        let r = row(&[("age", "31"), ("name", "Bob")]);
        assert!(eval_leaf(&leaf("age", CompOp::Gt, "30"), &r, None));
        assert!(eval_leaf(&leaf("age", CompOp::Gte, "31.0"), &r, None));
        assert!(!eval_leaf(&leaf("age", CompOp::Lt, "31"), &r, None));
        assert!(eval_leaf(&leaf("age", CompOp::Lte, "31"), &r, None));
        // Non-numeric data is "no match", never an error
        assert!(!eval_leaf(&leaf("name", CompOp::Gt, "1"), &r, None));
        assert!(!eval_leaf(&leaf("age", CompOp::Gt, "abc"), &r, None));
        assert!(!eval_leaf(&leaf("missing", CompOp::Lt, "100"), &r, None));
    }

    #[test]
    fn test_date_part_formats() {
        let cases = [
            ("2024-03-15 10:20:30", DatePart::Year, "2024"),
            ("2024-03-15", DatePart::Month, "3"),
            ("03/15/2024", DatePart::Day, "15"),
            ("15-Mar-24", DatePart::Year, "2024"),
        ];
        for (cell, part, expected) in cases {
            let r = row(&[("created", cell)]);
            let l = leaf("created", CompOp::Eq, expected).with_date_part(part);
            assert!(eval_leaf(&l, &r, None), "{} {:?}", cell, part);
        }
    }

    #[test]
    fn test_date_part_degrades_to_false() {
        let r = row(&[("created", "yesterday")]);
        let l = leaf("created", CompOp::Eq, "2024").with_date_part(DatePart::Year);
        assert!(!eval_leaf(&l, &r, None));

        let r = row(&[("created", "2024-01-01")]);
        let l = leaf("created", CompOp::Gt, "soon").with_date_part(DatePart::Year);
        assert!(!eval_leaf(&l, &r, None));
        let l = leaf("created", CompOp::Gte, "2023").with_date_part(DatePart::Year);
        assert!(eval_leaf(&l, &r, None));
    }

    #[test]
    fn test_missing_right_row_never_matches() {
        let r = row(&[("a", "x")]);
        let l = ConditionLeaf::new(TableAlias::T2, "a", CompOp::NotEq, "y");
        assert!(!eval_leaf(&l, &r, None));
        assert!(eval_leaf(&l, &r, Some(&r)));
    }

    #[test]
    fn test_groups() {
        let r = row(&[("a", "1"), ("b", "2")]);
        let yes = ConditionNode::Leaf(leaf("a", CompOp::Eq, "1"));
        let no = ConditionNode::Leaf(leaf("b", CompOp::Eq, "9"));

        assert!(!eval(&ConditionNode::and(vec![yes.clone(), no.clone()]), &r, None));
        assert!(eval(&ConditionNode::or(vec![no.clone(), yes.clone()]), &r, None));
        assert!(eval(&ConditionNode::negate(no.clone()), &r, None));
        assert!(eval(&ConditionNode::and(vec![]), &r, None));
        assert!(!eval(&ConditionNode::or(vec![]), &r, None));
        assert!(matches(None, &r, None));
        assert!(!matches(Some(&no), &r, None));
    }
}
