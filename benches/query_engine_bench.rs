use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use query_designer::ast::{CompOp, ConditionLeaf, JoinLeaf, JoinType, LogicalOp, QueryToken, TableAlias};
use query_designer::expression::build_tree;
use query_designer::lexer::Lexer;
use query_designer::parser::parse_simple_query;
use query_designer::query_text::parse_query_text;
use query_designer::{MemoryRowSource, QueryEngine, VisualQuery};
use std::hint::black_box;

const SIMPLE_QUERIES: [(&str, &str); 3] = [
    ("simple", "show name"),
    ("medium", "show name, age where age > 30 and status is active"),
    (
        "complex",
        "show name, age, status where age >= 18 and status starts with 'act' and name not contains 'x' and year of joined > 2019",
    ),
];

const SQL_TEXT: &str = "SELECT T1: id, T2: name FROM 'Orders' AS T1 INNER JOIN 'Customers' AS T2 ON T1.cust = T2.id \
                        WHERE (T1.total > '10' OR NOT T2.name CONTAINS 'test') AND YEAR OF T1.created >= '2020' LIMIT 50;";

fn columns() -> Vec<String> {
    ["name", "age", "status", "joined"].iter().map(|c| c.to_string()).collect()
}

fn leaf(field: &str, op: CompOp, value: &str) -> QueryToken {
    QueryToken::filter(ConditionLeaf::new(TableAlias::T1, field, op, value))
}

// 交替的 AND/OR 条件链，每四个条件加一层括号
fn condition_chain(len: usize) -> Vec<QueryToken> {
    let mut tokens = Vec::new();
    for i in 0..len {
        if i > 0 {
            tokens.push(QueryToken::op(if i % 2 == 0 { LogicalOp::And } else { LogicalOp::Or }));
        }
        if i % 4 == 0 {
            tokens.push(QueryToken::op(LogicalOp::LParen));
        }
        tokens.push(leaf("total", CompOp::Gt, &i.to_string()));
        if i % 4 == 3 {
            tokens.push(QueryToken::op(LogicalOp::RParen));
        }
    }
    if len % 4 != 0 {
        tokens.push(QueryToken::op(LogicalOp::RParen));
    }
    tokens
}

fn source(orders: usize, customers: usize) -> MemoryRowSource {
    let mut source = MemoryRowSource::new();
    source.add_table(
        "Customers",
        &["id", "name"],
        (0..customers).map(|i| vec![("id", i.to_string()), ("name", format!("customer {}", i))]),
    );
    source.add_table(
        "Orders",
        &["id", "cust", "total"],
        (0..orders).map(|i| {
            vec![
                ("id", i.to_string()),
                ("cust", (i % (customers * 2).max(1)).to_string()),
                ("total", (i % 97).to_string()),
            ]
        }),
    );
    source
}

// 基准测试：词法分析性能
fn benchmark_lexer(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer_performance");
    for (name, text) in SIMPLE_QUERIES {
        group.bench_with_input(BenchmarkId::new("tokenize", name), &text, |b, &text| {
            b.iter(|| {
                let tokens: Vec<_> = Lexer::new(black_box(text)).collect();
                black_box(tokens)
            })
        });
    }
    group.finish();
}

// 基准测试：简单查询与 SQL 视图文本的解析
fn benchmark_parsers(c: &mut Criterion) {
    let columns = columns();
    let mut group = c.benchmark_group("parser_performance");
    for (name, text) in SIMPLE_QUERIES {
        group.bench_with_input(BenchmarkId::new("simple_query", name), &text, |b, &text| {
            b.iter(|| black_box(parse_simple_query(black_box(text), &columns)))
        });
    }
    group.bench_function("query_text", |b| b.iter(|| black_box(parse_query_text(black_box(SQL_TEXT)))));
    group.finish();
}

// 基准测试：条件树构建
fn benchmark_build_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_tree_performance");
    for len in [4, 32, 256] {
        let tokens = condition_chain(len);
        group.bench_with_input(BenchmarkId::new("shunting_yard", len), &tokens, |b, tokens| {
            b.iter(|| black_box(build_tree(black_box(tokens))))
        });
    }
    group.finish();
}

// 基准测试：过滤与哈希连接执行
fn benchmark_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("execution_performance");
    for orders in [1_000, 10_000] {
        let source = source(orders, orders / 10);
        let engine = QueryEngine::new(&source);

        let mut filter = VisualQuery::single("Orders");
        filter.output_fields = vec!["T1: id".to_string(), "T1: total".to_string()];
        filter.conditions_list.push(leaf("total", CompOp::Gt, "50"));
        group.bench_with_input(BenchmarkId::new("filter", orders), &filter, |b, query| {
            b.iter(|| black_box(engine.execute(query, None)))
        });

        for join_type in [JoinType::Inner, JoinType::Anti] {
            let mut join = VisualQuery::join("Orders", "Customers", join_type);
            join.conditions_list.push(QueryToken::join(JoinLeaf::new("cust", "id")));
            join.output_fields = vec!["T1: id".to_string(), "T2: name".to_string()];
            let id = BenchmarkId::new(format!("{:?}_join", join_type).to_lowercase(), orders);
            group.bench_with_input(id, &join, |b, query| b.iter(|| black_box(engine.execute(query, None))));
        }
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_lexer,
    benchmark_parsers,
    benchmark_build_tree,
    benchmark_execution
);
criterion_main!(benches);
