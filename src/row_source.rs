//! Row source: the narrow interface through which the engine reads tables.
//!
//! The engine never loads or mutates data itself. Callers hand it a
//! [`RowSource`] whose slices stay borrowed, and therefore unchanged, for
//! the whole duration of a query.

use crate::config::ConfigError;
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Opaque identity of a source row, used to correlate results back to the
/// element they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RowId(pub u64);

/// A single row: field name to raw cell text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub id: RowId,
    values: HashMap<String, String>,
}

impl Row {
    pub fn new(id: RowId) -> Self {
        Self {
            id,
            values: HashMap::new(),
        }
    }

    pub fn from_pairs<K, V, I>(id: RowId, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            id,
            values: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.values.insert(field.into(), value.into());
    }

    /// Cell text with surrounding whitespace trimmed; missing cells read as "".
    pub fn get(&self, field: &str) -> &str {
        self.values.get(field).map(|v| v.trim()).unwrap_or("")
    }
}

/// Provider of named tables.
pub trait RowSource {
    /// Ordered column list of `table`, or `None` when the table is unknown.
    fn columns(&self, table: &str) -> Option<&[String]>;

    /// Rows of `table` as a stable snapshot, or `None` when the table is unknown.
    fn rows(&self, table: &str) -> Option<&[Row]>;

    fn table_names(&self) -> Vec<&str>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// In-memory row source, loadable from a JSON snapshot:
///
/// ```json
/// { "Orders": { "columns": ["id", "cust"], "rows": [{"id": 1, "cust": "A"}] } }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRowSource {
    tables: IndexMap<String, TableData>,
    next_id: u64,
}

#[derive(Deserialize)]
struct RawTable {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl MemoryRowSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a table; row ids are assigned in insertion order.
    pub fn add_table<I, R, K, V>(&mut self, name: impl Into<String>, columns: &[&str], rows: I)
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let rows = rows
            .into_iter()
            .map(|pairs| {
                let id = self.allocate_id();
                Row::from_pairs(id, pairs)
            })
            .collect();
        self.tables.insert(
            name.into(),
            TableData {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
    }

    fn allocate_id(&mut self) -> RowId {
        self.next_id += 1;
        RowId(self.next_id)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let raw: IndexMap<String, RawTable> = serde_json::from_str(json)
            .map_err(|e| ConfigError::new(format!("无法解析表数据: {}", e)))?;

        let mut source = MemoryRowSource::new();
        for (name, table) in raw {
            let mut columns = table.columns;
            let mut rows = Vec::with_capacity(table.rows.len());
            for raw_row in &table.rows {
                let mut row = Row::new(source.allocate_id());
                for (field, value) in raw_row {
                    if !columns.contains(field) {
                        columns.push(field.clone());
                    }
                    row.set(field.clone(), cell_text(value));
                }
                rows.push(row);
            }
            source.tables.insert(name, TableData { columns, rows });
        }
        Ok(source)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let content = fs::read_to_string(path_ref).map_err(|e| {
            ConfigError::new(format!("无法读取表数据文件 {}: {}", path_ref.display(), e))
        })?;
        Self::from_json_str(&content)
    }
}

impl RowSource for MemoryRowSource {
    fn columns(&self, table: &str) -> Option<&[String]> {
        self.tables.get(table).map(|t| t.columns.as_slice())
    }

    fn rows(&self, table: &str) -> Option<&[Row]> {
        self.tables.get(table).map(|t| t.rows.as_slice())
    }

    fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_get_trims_and_defaults() {
        let row = Row::from_pairs(RowId(1), [("name", "  Alice ")]);
        assert_eq!(row.get("name"), "Alice");
        assert_eq!(row.get("missing"), "");
    }

    #[test]
    fn test_load_json_snapshot() {
        let source = MemoryRowSource::from_json_str(
            r#"{
                "Orders": {"columns": ["id", "cust"], "rows": [{"id": 1, "cust": "A"}, {"id": 2, "cust": null}]},
                "Customers": {"rows": [{"cust": "A", "name": "Alice"}]}
            }"#,
        )
        .unwrap();

        assert_eq!(source.table_names(), vec!["Orders", "Customers"]);
        assert_eq!(source.columns("Orders").unwrap(), ["id", "cust"]);
        let rows = source.rows("Orders").unwrap();
        assert_eq!(rows[0].get("id"), "1");
        assert_eq!(rows[1].get("cust"), "");
        assert_ne!(rows[0].id, rows[1].id);

        let customer_columns = source.columns("Customers").unwrap();
        assert!(customer_columns.contains(&"name".to_string()));
        assert!(source.rows("Missing").is_none());
    }

    #[test]
    fn test_invalid_json_snapshot() {
        assert!(MemoryRowSource::from_json_str("not json").is_err());
    }

    #[test]
    fn test_add_table_assigns_ids() {
        let mut source = MemoryRowSource::new();
        source.add_table("T", &["a"], vec![vec![("a", "1")], vec![("a", "2")]]);
        let rows = source.rows("T").unwrap();
        assert_eq!(rows[0].id, RowId(1));
        assert_eq!(rows[1].id, RowId(2));
    }
}
