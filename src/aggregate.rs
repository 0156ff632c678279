//! GROUP BY aggregation over executor output.

use crate::ast::{AggregateFunc, OutputSpec};
use crate::evaluator::parse_number;
use crate::executor::{CellValue, ResultRow};
use indexmap::IndexMap;
use tracing::{debug, warn};

/// Rendered for output fields that are neither grouped nor aggregated.
pub const NON_AGGREGATED_PLACEHOLDER: &str = "N/A (Non-aggregated field in GROUP BY query)";

/// Column order of grouped output: group-by fields, then the remaining
/// output fields in their requested order.
pub fn grouped_columns(group_by: &[String], output_fields: &[String]) -> Vec<String> {
    let mut columns = group_by.to_vec();
    for field in output_fields {
        if !columns.contains(field) {
            columns.push(field.clone());
        }
    }
    columns
}

fn apply(func: AggregateFunc, raw: &[String]) -> CellValue {
    let numbers: Vec<f64> = raw.iter().filter_map(|v| parse_number(v)).collect();
    match func {
        // raw cardinality, numeric or not
        AggregateFunc::Count => CellValue::Integer(raw.len() as i64),
        AggregateFunc::Sum => CellValue::Float(numbers.iter().sum()),
        AggregateFunc::Avg if numbers.is_empty() => CellValue::Integer(0),
        AggregateFunc::Avg => CellValue::Float(numbers.iter().sum::<f64>() / numbers.len() as f64),
        AggregateFunc::Min => numbers
            .iter()
            .copied()
            .reduce(f64::min)
            .map_or_else(|| CellValue::Text(String::new()), CellValue::Float),
        AggregateFunc::Max => numbers
            .iter()
            .copied()
            .reduce(f64::max)
            .map_or_else(|| CellValue::Text(String::new()), CellValue::Float),
    }
}

/// Groups `rows` by the values of `group_by` (first-seen order) and builds
/// one row per group.
pub fn aggregate(rows: &[ResultRow], group_by: &[String], output_fields: &[String]) -> Vec<ResultRow> {
    let mut groups: IndexMap<Vec<String>, Vec<&ResultRow>> = IndexMap::new();
    for row in rows {
        let key = group_by.iter().map(|field| row.text(field)).collect();
        groups.entry(key).or_default().push(row);
    }
    debug!(input = rows.len(), groups = groups.len(), "grouped rows");

    let specs: Vec<(&String, OutputSpec)> = output_fields
        .iter()
        .filter(|field| !group_by.contains(field))
        .map(|field| (field, OutputSpec::parse(field)))
        .collect();
    for (field, spec) in &specs {
        if !matches!(spec, OutputSpec::Aggregate { .. }) {
            warn!(field = field.as_str(), "output field is neither grouped nor aggregated");
        }
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let mut out = ResultRow::new();
            for (field, value) in group_by.iter().zip(key) {
                out.insert(field.clone(), value);
            }
            for (field, spec) in &specs {
                let value = match spec {
                    OutputSpec::Aggregate { func, field: source } => {
                        let raw: Vec<String> = members.iter().map(|row| row.text(source)).collect();
                        apply(*func, &raw)
                    }
                    OutputSpec::Field(_) | OutputSpec::Unknown(_) => CellValue::from(NON_AGGREGATED_PLACEHOLDER),
                };
                out.insert((*field).clone(), value);
            }
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[(&str, &str)]) -> Vec<ResultRow> {
        data.iter()
            .map(|(status, id)| ResultRow::new().with_value("status", *status).with_value("id", *id))
            .collect()
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_count_per_group_in_first_seen_order() {
        let input = rows(&[("A", "1"), ("A", "2"), ("B", "3")]);
        let out = aggregate(&input, &labels(&["status"]), &labels(&["status", "COUNT(id)"]));

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text("status"), "A");
        assert_eq!(out[0].get("COUNT(id)"), Some(&CellValue::Integer(2)));
        assert_eq!(out[1].text("status"), "B");
        assert_eq!(out[1].get("COUNT(id)"), Some(&CellValue::Integer(1)));
    }

    #[test]
    fn test_numeric_aggregates_skip_non_numbers() {
        let input = rows(&[("A", "1"), ("A", "n/a"), ("A", "4")]);
        let out = aggregate(
            &input,
            &labels(&["status"]),
            &labels(&["COUNT(id)", "SUM(id)", "AVG(id)", "MIN(id)", "MAX(id)"]),
        );

        let row = &out[0];
        assert_eq!(row.get("COUNT(id)"), Some(&CellValue::Integer(3)));
        assert_eq!(row.get("SUM(id)"), Some(&CellValue::Float(5.0)));
        assert_eq!(row.get("AVG(id)"), Some(&CellValue::Float(2.5)));
        assert_eq!(row.get("MIN(id)"), Some(&CellValue::Float(1.0)));
        assert_eq!(row.get("MAX(id)"), Some(&CellValue::Float(4.0)));
    }

    #[test]
    fn test_empty_numeric_set() {
        let input = rows(&[("A", "x"), ("A", "")]);
        let out = aggregate(&input, &labels(&["status"]), &labels(&["AVG(id)", "MIN(id)", "MAX(id)", "SUM(id)"]));

        let row = &out[0];
        assert_eq!(row.get("AVG(id)"), Some(&CellValue::Integer(0)));
        assert_eq!(row.text("MIN(id)"), "");
        assert_eq!(row.text("MAX(id)"), "");
        assert_eq!(row.get("SUM(id)"), Some(&CellValue::Float(0.0)));
    }

    #[test]
    fn test_non_aggregated_field_is_tolerated() {
        let input = rows(&[("A", "1")]);
        let out = aggregate(&input, &labels(&["status"]), &labels(&["id", "MEDIAN(id)"]));
        assert_eq!(out[0].text("id"), NON_AGGREGATED_PLACEHOLDER);
        assert_eq!(out[0].text("MEDIAN(id)"), NON_AGGREGATED_PLACEHOLDER);
    }

    #[test]
    fn test_grouped_columns() {
        assert_eq!(
            grouped_columns(&labels(&["status"]), &labels(&["COUNT(id)", "status"])),
            labels(&["status", "COUNT(id)"])
        );
    }
}
