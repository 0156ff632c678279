use query_designer::aggregate::NON_AGGREGATED_PLACEHOLDER;
use query_designer::ast::{CompOp, ConditionLeaf, JoinLeaf, JoinType, LogicalOp, QueryToken, TableAlias};
use query_designer::config::{ActiveTab, QueryConfig};
use query_designer::executor::ExecutionError;
use query_designer::parser::DslError;
use query_designer::query_text::{parse_query_text, render_query_text};
use query_designer::sql_compiler::SqlCompiler;
use query_designer::{MemoryRowSource, QueryEngine, QueryError, VisualQuery, MATCH_COUNT};
use std::io::Write;
use tempfile::NamedTempFile;

const TABLES: &str = r#"{
    "Orders": {
        "columns": ["id", "cust"],
        "rows": [{"id": 1, "cust": "A"}, {"id": 2, "cust": "B"}, {"id": 3, "cust": "A"}]
    },
    "Customers": {
        "columns": ["cust", "name"],
        "rows": [{"cust": "A", "name": "Alice"}]
    },
    "People": {
        "columns": ["name", "age", "status", "id"],
        "rows": [
            {"name": "Ann", "age": 41, "status": "active", "id": 1},
            {"name": "Bob", "age": 25, "status": "active", "id": 2},
            {"name": "Cid", "age": 35, "status": "closed", "id": 3}
        ]
    }
}"#;

fn source() -> MemoryRowSource {
    MemoryRowSource::from_json_str(TABLES).unwrap()
}

fn orders_join(join_type: JoinType) -> VisualQuery {
    let mut query = VisualQuery::join("Orders", "Customers", join_type);
    query.conditions_list.push(QueryToken::join(JoinLeaf::new("cust", "cust")));
    query.output_fields = vec!["T1: id".to_string(), "T2: name".to_string()];
    query
}

#[test]
fn test_inner_and_anti_join_example() {
    let source = source();
    let engine = QueryEngine::new(&source);

    let inner = engine.execute(&orders_join(JoinType::Inner), None).unwrap();
    assert_eq!(inner.columns, vec![MATCH_COUNT, "T1: id", "T2: name"]);
    assert_eq!(
        inner.text_rows(),
        vec![
            vec!["1".to_string(), "1".to_string(), "Alice".to_string()],
            vec!["1".to_string(), "3".to_string(), "Alice".to_string()],
        ]
    );

    let anti = engine.execute(&orders_join(JoinType::Anti), None).unwrap();
    assert_eq!(anti.columns, vec!["T1: id", "T2: name"]);
    assert_eq!(anti.text_rows(), vec![vec!["2".to_string(), String::new()]]);
}

#[test]
fn test_simple_query_example() {
    let source = source();
    let engine = QueryEngine::new(&source);

    let result = engine
        .execute_simple("People", "show name where age > 30 and status starts with 'active'", None)
        .unwrap();
    assert_eq!(result.text_rows(), vec![vec!["Ann".to_string()]]);

    let err = engine
        .execute_simple("Orders", "show id where cust = A and status starts with 'active'", None)
        .unwrap_err();
    match err {
        QueryError::Dsl(DslError::FieldNotFound { field, span }) => {
            assert_eq!(field, "status");
            assert_eq!(span, (27, 33));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_group_by_count_example() {
    let source = source();
    let mut query = VisualQuery::single("People");
    query.output_fields = vec!["T1: status".to_string(), "COUNT(T1: id)".to_string(), "T1: name".to_string()];
    query.group_by = vec!["T1: status".to_string()];

    let result = QueryEngine::new(&source).execute(&query, None).unwrap();
    assert_eq!(result.columns, vec!["T1: status", "COUNT(T1: id)", "T1: name"]);
    assert_eq!(
        result.text_rows(),
        vec![
            vec!["active".to_string(), "2".to_string(), NON_AGGREGATED_PLACEHOLDER.to_string()],
            vec!["closed".to_string(), "1".to_string(), NON_AGGREGATED_PLACEHOLDER.to_string()],
        ]
    );
}

#[test]
fn test_query_text_round_trip_executes_identically() {
    let source = source();
    let engine = QueryEngine::new(&source);

    let mut query = orders_join(JoinType::Inner);
    query.conditions_list.push(QueryToken::op(LogicalOp::Not));
    query
        .conditions_list
        .push(QueryToken::filter(ConditionLeaf::new(TableAlias::T1, "id", CompOp::Gt, "2")));

    let text = render_query_text(&query, Some(10));
    let parsed = parse_query_text(&text).unwrap();
    assert_eq!(parsed.query, query);
    assert_eq!(parsed.limit, Some(10));

    let direct = engine.execute(&query, Some(10)).unwrap();
    let via_text = engine.execute_text(&text).unwrap();
    assert_eq!(direct, via_text);
    assert_eq!(direct.text_rows(), vec![vec!["1".to_string(), "1".to_string(), "Alice".to_string()]]);
}

#[test]
fn test_saved_config_runs_active_tab() {
    let source = source();
    let engine = QueryEngine::new(&source);

    let mut config = QueryConfig {
        source_file: "tables.json".to_string(),
        file_type: "json".to_string(),
        visual_query: orders_join(JoinType::Anti),
        ..QueryConfig::default()
    };
    config.simple_query.table = "People".to_string();
    config.simple_query.text = "show all where status is active".to_string();
    config.sql_query.text = "SELECT T1: name FROM 'People' AS T1 WHERE T1.age < '30';".to_string();

    let file = NamedTempFile::new().unwrap();
    config.to_json_file(file.path()).unwrap();
    let mut loaded = QueryConfig::from_json_file(file.path()).unwrap();
    assert_eq!(loaded, config);

    assert_eq!(engine.run_config(&loaded).unwrap().len(), 1);

    loaded.active_tab = ActiveTab::SimpleQuery;
    loaded.limit_enabled = true;
    loaded.limit_value = 1;
    let simple = engine.run_config(&loaded).unwrap();
    assert_eq!(simple.columns, vec!["name", "age", "status", "id"]);
    assert_eq!(simple.len(), 1);

    loaded.active_tab = ActiveTab::SqlView;
    let sql = engine.run_config(&loaded).unwrap();
    assert_eq!(sql.text_rows(), vec![vec!["Bob".to_string()]]);
}

#[test]
fn test_hand_written_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "source_file": "orders.json",
            "visual_query": {{
                "table1": "Orders",
                "table2": "Customers",
                "query_type": "INNER",
                "conditions_list": [
                    {{"type": "cond", "data": {{"type": "join", "t1_field": "cust", "t2_field": "cust"}}}},
                    {{"type": "op", "value": "NOT"}},
                    {{"type": "cond", "data": {{"type": "filter", "table": "T1", "field": "id", "op": "=", "value": "1"}}}}
                ],
                "output_fields": ["T1: id"]
            }},
            "limit_enabled": false,
            "active_tab": "Visual Designer"
        }}"#
    )
    .unwrap();

    let config = QueryConfig::from_json_file(file.path()).unwrap();
    let source = source();
    let result = QueryEngine::new(&source).run_config(&config).unwrap();
    assert_eq!(result.text_rows(), vec![vec!["1".to_string(), "3".to_string()]]);
}

#[test]
fn test_faults_leave_token_list_untouched() {
    let source = source();
    let engine = QueryEngine::new(&source);

    let mut query = VisualQuery::join("Orders", "Missing", JoinType::Inner);
    query.conditions_list.push(QueryToken::join(JoinLeaf::new("cust", "cust")));
    query.output_fields = vec!["T1: id".to_string()];
    let before = query.conditions_list.clone();

    let err = engine.execute(&query, None).unwrap_err();
    assert_eq!(err, QueryError::Execution(ExecutionError::TableNotFound("Missing".to_string())));
    assert_eq!(query.conditions_list, before);

    let mut no_keys = VisualQuery::join("Orders", "Customers", JoinType::Inner);
    no_keys.output_fields = vec!["T1: id".to_string()];
    assert_eq!(
        engine.execute(&no_keys, None).unwrap_err(),
        QueryError::Execution(ExecutionError::MissingJoinCondition)
    );
}

#[test]
fn test_sql_export_of_designer_query() {
    let sql = SqlCompiler::new().compile(&orders_join(JoinType::Anti), Some(5)).unwrap().sql;
    assert!(sql.contains(r#"FROM "Orders" AS "T1""#));
    assert!(sql.contains("LEFT JOIN"));
    assert!(sql.contains("IS NULL"));
    assert!(sql.contains("LIMIT 5"));
}
