mod repl;

use anyhow::Context;
use clap::Parser;
use query_designer::{MemoryRowSource, QueryConfig, QueryEngine, RowSource};
use repl::Repl;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "query_designer")]
#[command(about = "对 JSON 表数据执行查询设计器查询")]
struct Args {
    /// 表数据文件（JSON：表名 -> {columns, rows}）
    #[arg(short, long, value_name = "FILE")]
    tables: Option<String>,

    /// 已保存的查询配置；与 --run 一起使用时执行后退出
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 执行配置中的查询并退出，不进入交互模式
    #[arg(long, requires = "config")]
    run: bool,

    /// 未设置 RUST_LOG 时使用的日志级别
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let mut config = match &args.config {
        Some(path) => QueryConfig::from_json_file(path).with_context(|| format!("无法加载查询配置 {}", path))?,
        None => QueryConfig::default(),
    };

    // 未指定 --tables 时使用配置中记录的数据源
    let tables = args
        .tables
        .clone()
        .or_else(|| (!config.source_file.is_empty()).then(|| config.source_file.clone()))
        .context("请用 --tables 指定表数据文件")?;
    let source = MemoryRowSource::from_json_file(&tables).with_context(|| format!("无法加载表数据 {}", tables))?;
    info!(file = tables.as_str(), tables = source.table_names().len(), "loaded table data");

    if !config.source_file.is_empty() && !config.is_for_source(&tables) {
        println!("⚠️ 查询配置保存自另一个数据源: {}", config.source_file);
    }
    config.source_file = tables;
    config.file_type = "json".to_string();

    if args.run {
        let result = QueryEngine::new(&source).run_config(&config)?;
        print!("{}", result.render());
        println!("{} 行", result.len());
        return Ok(());
    }

    let mut repl = Repl::new(source, config)?;
    repl.run()
}
