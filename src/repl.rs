use anyhow::{anyhow, Context};
use query_designer::config::ActiveTab;
use query_designer::query_text::parse_query_text;
use query_designer::sql_compiler::SqlCompiler;
use query_designer::{MemoryRowSource, QueryConfig, QueryEngine, QueryError, QueryResult, RowSource};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

/// 以 `:` 开头的交互命令
#[derive(Debug, Clone, PartialEq)]
pub enum MetaCommand {
    Quit,
    Help,
    ListTables,
    UseTable(String),
    Limit(Option<usize>),
    Sort { column: String, ascending: bool },
    Load(String),
    Save(String),
    ExportSql,
}

impl MetaCommand {
    /// 非 `:` 开头的行返回 `None`；无法识别的命令返回错误信息
    pub fn parse(line: &str) -> Option<Result<Self, String>> {
        let rest = line.trim().strip_prefix(':')?;
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let command = match (name.to_lowercase().as_str(), arg) {
            ("q" | "quit", _) => Ok(MetaCommand::Quit),
            ("h" | "help", _) => Ok(MetaCommand::Help),
            ("tables", _) => Ok(MetaCommand::ListTables),
            ("use", table) if !table.is_empty() => Ok(MetaCommand::UseTable(table.to_string())),
            ("limit", "off") => Ok(MetaCommand::Limit(None)),
            ("limit", value) => value
                .parse()
                .map(|n| MetaCommand::Limit(Some(n)))
                .map_err(|_| format!("无效的行数上限: '{}'", value)),
            ("sort", args) if !args.is_empty() => {
                let (column, ascending) = match args.rsplit_once(char::is_whitespace) {
                    Some((column, dir)) if dir.eq_ignore_ascii_case("desc") => (column.trim(), false),
                    Some((column, dir)) if dir.eq_ignore_ascii_case("asc") => (column.trim(), true),
                    _ => (args, true),
                };
                Ok(MetaCommand::Sort {
                    column: column.to_string(),
                    ascending,
                })
            }
            ("load", path) if !path.is_empty() => Ok(MetaCommand::Load(path.to_string())),
            ("save", path) if !path.is_empty() => Ok(MetaCommand::Save(path.to_string())),
            ("sql", _) => Ok(MetaCommand::ExportSql),
            _ => Err(format!("未知命令: ':{}'，输入 :help 查看帮助", rest)),
        };
        Some(command)
    }
}

pub struct Repl {
    source: MemoryRowSource,
    editor: DefaultEditor,
    config: QueryConfig,
    table: Option<String>,
    last_result: Option<QueryResult>,
}

impl Repl {
    pub fn new(source: MemoryRowSource, config: QueryConfig) -> anyhow::Result<Self> {
        let table = source.table_names().first().map(|name| name.to_string());
        let editor = DefaultEditor::new().context("无法初始化行编辑器")?;
        Ok(Self {
            source,
            editor,
            config,
            table,
            last_result: None,
        })
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        println!("--- 查询设计器 ---");
        println!("输入 :help 查看帮助，:quit 退出\n");

        loop {
            let prompt = match &self.table {
                Some(table) => format!("{}> ", table),
                None => "query> ".to_string(),
            };
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let _ = self.editor.add_history_entry(line.as_str());

                    match MetaCommand::parse(&line) {
                        Some(Ok(command)) => match self.handle_meta_command(command) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(e) => eprintln!("✗ {:#}", e),
                        },
                        Some(Err(message)) => eprintln!("✗ {}", message),
                        None => self.run_query(&line),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err).context("读取输入失败"),
            }
        }
        Ok(())
    }

    fn run_query(&mut self, line: &str) {
        let text = line.trim();
        let outcome = if text.to_lowercase().starts_with("select") {
            self.config.sql_query.text = text.to_string();
            self.config.active_tab = ActiveTab::SqlView;
            if let Ok(parsed) = parse_query_text(text) {
                self.config.visual_query = parsed.query;
            }
            QueryEngine::new(&self.source).execute_text(text)
        } else {
            match &self.table {
                Some(table) => {
                    self.config.simple_query.table = table.clone();
                    self.config.simple_query.text = text.to_string();
                    self.config.active_tab = ActiveTab::SimpleQuery;
                    QueryEngine::new(&self.source).execute_simple(table, text, self.config.effective_limit())
                }
                None => {
                    eprintln!("✗ 请先用 :use <表名> 选择一张表");
                    return;
                }
            }
        };
        self.show(outcome, text);
    }

    fn show(&mut self, outcome: Result<QueryResult, QueryError>, text: &str) {
        match outcome {
            Ok(result) => {
                print!("{}", result.render());
                println!("{} 行", result.len());
                self.last_result = Some(result);
            }
            Err(e) => {
                eprintln!("✗ {}", e);
                if let Some((start, end)) = e.span() {
                    let marker: String = text
                        .chars()
                        .enumerate()
                        .map(|(i, _)| if i >= start && i < end { '^' } else { ' ' })
                        .collect();
                    eprintln!("  {}\n  {}", text, marker.trim_end());
                }
            }
        }
    }

    fn handle_meta_command(&mut self, command: MetaCommand) -> anyhow::Result<bool> {
        debug!(?command, "meta command");
        match command {
            MetaCommand::Quit => return Ok(true),
            MetaCommand::Help => print_help(),
            MetaCommand::ListTables => {
                for name in self.source.table_names() {
                    let columns = self.source.columns(name).unwrap_or_default();
                    println!("{} ({})", name, columns.join(", "));
                }
            }
            MetaCommand::UseTable(table) => {
                if self.source.columns(&table).is_none() {
                    return Err(anyhow!("表不存在: {}", table));
                }
                println!("当前表: {}", table);
                self.table = Some(table);
            }
            MetaCommand::Limit(limit) => {
                match limit {
                    Some(n) => {
                        self.config.limit_enabled = true;
                        self.config.limit_value = n;
                        println!("行数上限: {}", n);
                    }
                    None => {
                        self.config.limit_enabled = false;
                        println!("已关闭行数上限");
                    }
                }
            }
            MetaCommand::Sort { column, ascending } => {
                let result = self.last_result.as_mut().ok_or_else(|| anyhow!("没有可排序的结果"))?;
                if !result.columns.contains(&column) {
                    return Err(anyhow!("结果中没有列: {}", column));
                }
                result.sort_by(&column, ascending);
                print!("{}", result.render());
            }
            MetaCommand::Load(path) => {
                let config = QueryConfig::from_json_file(&path)?;
                let other_source = !config.source_file.is_empty()
                    && !self.config.source_file.is_empty()
                    && !config.is_for_source(&self.config.source_file);
                if other_source {
                    println!("⚠️ 该查询保存自另一个数据源: {}", config.source_file);
                }
                let outcome = QueryEngine::new(&self.source).run_config(&config);
                let text = config.simple_query.text.clone();
                self.config = QueryConfig {
                    source_file: self.config.source_file.clone(),
                    ..config
                };
                self.show(outcome, &text);
            }
            MetaCommand::Save(path) => {
                self.config
                    .to_json_file(&path)
                    .with_context(|| format!("保存查询失败: {}", path))?;
                println!("✅ 查询已保存到 {}", path);
            }
            MetaCommand::ExportSql => {
                if self.config.visual_query.table1.is_empty() {
                    return Err(anyhow!("没有可导出的设计器查询"));
                }
                let limit = match self.config.active_tab {
                    ActiveTab::SqlView => parse_query_text(&self.config.sql_query.text)?.limit,
                    _ => self.config.effective_limit(),
                };
                let result = SqlCompiler::new().compile(&self.config.visual_query, limit)?;
                println!("{}", result.sql);
            }
        }
        Ok(false)
    }
}

fn print_help() {
    println!(
        "
命令:
  show <字段> [where <条件> and ...]   在当前表上执行简单查询
  SELECT ... FROM '<表>' AS T1 ...     执行 SQL 视图文本
  :tables                              列出所有表及其列
  :use <表名>                          切换当前表
  :limit <n> | :limit off              设置或关闭行数上限
  :sort <列名> [asc|desc]              对上一次结果排序
  :load <文件>                         加载并执行已保存的查询
  :save <文件>                         保存当前查询
  :sql                                 导出当前设计器查询的 PostgreSQL 语句
  :help                                显示本帮助
  :quit                                退出
"
    );
}
