//! 配置模块，负责保存和加载查询配置（JSON）

use crate::ast::VisualQuery;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// 配置读写错误
#[derive(Debug, Clone, PartialEq, Error)]
#[error("配置错误: {message}")]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

/// 保存配置时处于激活状态的查询页
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActiveTab {
    #[default]
    #[serde(rename = "Visual Designer")]
    VisualDesigner,
    #[serde(rename = "Simple Query")]
    SimpleQuery,
    #[serde(rename = "SQL View")]
    SqlView,
}

/// 简单查询页：`show … where …` 文本及其作用的表
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimpleQueryConfig {
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub text: String,
}

/// SQL 视图页
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SqlQueryConfig {
    #[serde(default)]
    pub text: String,
}

fn default_limit_value() -> usize {
    100
}

/// 完整的已保存查询配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub source_file: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub visual_query: VisualQuery,
    #[serde(default)]
    pub simple_query: SimpleQueryConfig,
    #[serde(default)]
    pub sql_query: SqlQueryConfig,
    #[serde(default)]
    pub limit_enabled: bool,
    #[serde(default = "default_limit_value")]
    pub limit_value: usize,
    #[serde(default)]
    pub active_tab: ActiveTab,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            source_file: String::new(),
            file_type: String::new(),
            visual_query: VisualQuery::default(),
            simple_query: SimpleQueryConfig::default(),
            sql_query: SqlQueryConfig::default(),
            limit_enabled: false,
            limit_value: default_limit_value(),
            active_tab: ActiveTab::default(),
        }
    }
}

impl QueryConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::new(format!("无法解析查询配置: {}", e)))
    }

    /// 从JSON文件加载查询配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ConfigError::new(format!("配置文件不存在: {}", path_ref.display())));
        }

        let content = fs::read_to_string(path_ref)
            .map_err(|e| ConfigError::new(format!("无法读取配置文件 {}: {}", path_ref.display(), e)))?;

        serde_json::from_str(&content)
            .map_err(|e| ConfigError::new(format!("无法解析JSON配置文件 {}: {}", path_ref.display(), e)))
    }

    /// 以缩进格式写出JSON
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path_ref = path.as_ref();
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::new(format!("无法序列化查询配置: {}", e)))?;
        fs::write(path_ref, content)
            .map_err(|e| ConfigError::new(format!("无法写入配置文件 {}: {}", path_ref.display(), e)))
    }

    /// 启用时返回行数上限
    pub fn effective_limit(&self) -> Option<usize> {
        self.limit_enabled.then_some(self.limit_value)
    }

    /// 配置是否针对给定的数据源文件保存
    pub fn is_for_source(&self, path: &str) -> bool {
        self.source_file == path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompOp, ConditionLeaf, JoinLeaf, JoinType, LogicalOp, QueryToken, TableAlias};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_config() -> QueryConfig {
        let mut visual = VisualQuery::join("Orders", "Customers", JoinType::Anti);
        visual.conditions_list.push(QueryToken::join(JoinLeaf::new("cust", "cust")));
        visual.conditions_list.push(QueryToken::filter(ConditionLeaf::new(
            TableAlias::T1,
            "id",
            CompOp::Gt,
            "1",
        )));
        visual.conditions_list.push_operator(LogicalOp::Or);
        visual.conditions_list.push(QueryToken::filter(ConditionLeaf::new(
            TableAlias::T1,
            "id",
            CompOp::Eq,
            "0",
        )));
        visual.output_fields = vec!["T1: id".to_string()];

        QueryConfig {
            source_file: "orders.xml".to_string(),
            file_type: "xml".to_string(),
            visual_query: visual,
            limit_enabled: true,
            limit_value: 5,
            active_tab: ActiveTab::SqlView,
            ..QueryConfig::default()
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let config = sample_config();
        let file = NamedTempFile::new().unwrap();
        config.to_json_file(file.path()).unwrap();

        let loaded = QueryConfig::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.effective_limit(), Some(5));
        assert!(loaded.is_for_source("orders.xml"));
        assert!(!loaded.is_for_source("other.csv"));
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = QueryConfig::from_json_str(r#"{"visual_query": {"table1": "Orders"}}"#).unwrap();
        assert_eq!(config.limit_value, 100);
        assert!(!config.limit_enabled);
        assert_eq!(config.effective_limit(), None);
        assert_eq!(config.active_tab, ActiveTab::VisualDesigner);
        assert_eq!(config.visual_query.query_type, JoinType::Inner);
        assert!(config.visual_query.conditions_list.is_empty());
    }

    #[test]
    fn test_load_saved_file_shape() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
                "source_file": "data.xml",
                "file_type": "xml",
                "active_tab": "Simple Query",
                "limit_enabled": false,
                "limit_value": 50,
                "visual_query": {{
                    "table1": "Orders", "table2": "", "query_type": "INNER",
                    "conditions_list": [
                        {{"type": "cond", "data": {{"type": "filter", "table": "T1", "field": "cust", "op": "NOT CONTAINS", "value": "x"}}}},
                        {{"type": "op", "value": "AND"}},
                        {{"type": "cond", "data": {{"type": "filter", "table": "T1", "field": "id", "op": "!=", "value": "2"}}}}
                    ],
                    "output_fields": ["T1: id"]
                }},
                "simple_query": {{"table": "Orders", "text": "show id where cust is A"}},
                "sql_query": {{"text": ""}}
            }}"#
        )
        .unwrap();

        let config = QueryConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.active_tab, ActiveTab::SimpleQuery);
        assert_eq!(config.simple_query.text, "show id where cust is A");
        assert_eq!(config.visual_query.conditions_list.len(), 3);
        assert_eq!(config.limit_value, 50);
    }

    #[test]
    fn test_invalid_json_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid json").unwrap();
        let err = QueryConfig::from_json_file(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("配置错误"));
    }

    #[test]
    fn test_missing_file() {
        let result = QueryConfig::from_json_file("non_existent_query.json");
        assert!(result.is_err());
    }
}
