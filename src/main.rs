use academy_filters::config::AppConfig;
use academy_filters::parser::{parse_command, parse_filter, Command, ParseError};
use academy_filters::registry::Entity;
use academy_filters::saved::SavedFilterStore;
use academy_filters::session::{ListRequest, ListSession, Outcome};
use academy_filters::{FilterGroup, FindManyArgs};
use anyhow::{Context, Result};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// 学员CRM列表过滤器：交互式构建过滤器并编译为查询条件
#[derive(Debug, Parser)]
#[command(name = "academy-filters", version)]
struct Args {
    /// JSON配置文件
    #[arg(short, long, default_value = "academy_filters.json")]
    config: PathBuf,

    /// 列表实体: contacts, customers, subscriptions
    #[arg(short, long, default_value = "contacts", value_parser = parse_entity)]
    entity: Entity,

    /// 初始过滤器（FilterGroup JSON 文件）
    #[arg(long, conflicts_with = "where")]
    filter: Option<PathBuf>,

    /// 初始过滤器（快速过滤表达式）
    #[arg(long = "where")]
    r#where: Option<String>,
}

fn parse_entity(name: &str) -> Result<Entity, String> {
    Entity::from_name(name).ok_or_else(|| {
        let names: Vec<_> = Entity::ALL.iter().map(|e| e.as_str()).collect();
        format!("未知实体 '{}'，可选: {}", name, names.join(", "))
    })
}

/// 日志写到 stderr，stdout 只留给程序输出
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("academy_filters=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// 加载配置，失败时使用默认配置
fn load_config(path: &Path) -> AppConfig {
    match AppConfig::load_or_default(path) {
        Ok(config) => {
            println!("✅ 配置已加载 ({})", path.display());
            config
        }
        Err(e) => {
            println!("⚠️ 无法加载配置文件 ({}), 使用默认配置", e);
            AppConfig::default()
        }
    }
}

fn open_store(config: &AppConfig) -> Result<SavedFilterStore> {
    match &config.saved_filters_path {
        Some(path) => {
            let store = SavedFilterStore::open(path)?;
            println!("✅ 已加载 {} 个保存的过滤器 ({})", store.len(), path.display());
            Ok(store)
        }
        None => {
            println!("⚠️ 未配置 savedFiltersPath，保存的过滤器只保留在内存中");
            Ok(SavedFilterStore::in_memory())
        }
    }
}

fn initial_filter(args: &Args) -> Result<Option<FilterGroup>> {
    if let Some(path) = &args.filter {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("无法读取过滤器文件 {}", path.display()))?;
        let group: FilterGroup = serde_json::from_str(&content).with_context(|| format!("无法解析过滤器文件 {}", path.display()))?;
        return Ok(Some(group));
    }
    if let Some(expr) = &args.r#where {
        return parse_filter(expr)
            .map(Some)
            .map_err(|e| anyhow::anyhow!("初始表达式解析失败: {}", e));
    }
    Ok(None)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    println!("--- Academy CRM: 列表过滤器 ---");

    println!("\n[配置信息]:");
    let config = load_config(&args.config);
    let store = open_store(&config)?;
    let mut session = ListSession::new(args.entity, &config, store)?;
    println!("✅ 实体: {} -> 表 {}", session.entity(), session.table());

    if let Some(group) = initial_filter(&args)? {
        println!("\n[初始过滤器]:");
        match session.execute(Command::Where(group), Instant::now()) {
            Ok(outcome) => print_outcome(&session, outcome)?,
            Err(e) => println!("✗ {}", e),
        }
    }

    println!("\n输入 help 查看命令，quit 退出");
    let mut editor = DefaultEditor::new()?;
    let prompt = format!("{}> ", session.entity());

    loop {
        let line = match editor.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        editor.add_history_entry(line)?;

        let command = match parse_command(line) {
            Ok(command) => command,
            Err(e) => {
                print_parse_error(line, &e);
                continue;
            }
        };

        match session.execute(command, Instant::now()) {
            Ok(Outcome::Quit) => break,
            Ok(Outcome::SearchScheduled(deadline)) => {
                println!("⏳ 搜索输入已记录，{}ms 后执行", millis_until(deadline));
                // 终端里没有后续按键，等到防抖结束
                std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                match session.poll(Instant::now()) {
                    Ok(Some(request)) => print_request(&session, &request)?,
                    Ok(None) => {}
                    Err(e) => println!("✗ {}", e),
                }
            }
            Ok(outcome) => print_outcome(&session, outcome)?,
            Err(e) => println!("✗ {}", e),
        }
    }

    println!("再见");
    Ok(())
}

fn millis_until(deadline: Instant) -> u128 {
    deadline.saturating_duration_since(Instant::now()).as_millis()
}

fn print_parse_error(line: &str, e: &ParseError) {
    println!("✗ 解析失败: {}", e);
    if let Some(span) = e.span {
        let width = line[span.start..span.end].chars().count().max(1);
        let offset = line[..span.start].chars().count();
        println!("  {}", line);
        println!("  {}{}", " ".repeat(offset), "^".repeat(width));
    }
}

fn print_outcome(session: &ListSession, outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Refetch(request) => print_request(session, &request)?,
        Outcome::SearchScheduled(_) | Outcome::Quit => {}
        Outcome::Outline(outline) => {
            print!("{}", outline);
            if let Some(term) = session.active_search() {
                println!("搜索: {:?}", term);
            }
            let page = session.pagination();
            println!("分页: 第 {} 页，每页 {} 条", page.page, page.limit);
            if let Some(sort) = session.sort() {
                println!("排序: {} {}", sort.field, sort.direction.as_str());
            }
        }
        Outcome::Compiled(args) => print_args(&args)?,
        Outcome::Sql(sql) => println!("{}", sql),
        Outcome::Saved { name, replaced } => {
            if replaced {
                println!("✅ 已覆盖保存的过滤器 '{}'", name);
            } else {
                println!("✅ 已保存过滤器 '{}'", name);
            }
        }
        Outcome::Deleted(name) => println!("✅ 已删除过滤器 '{}'", name),
        Outcome::SavedList(list) => {
            if list.is_empty() {
                println!("（没有保存的过滤器）");
            }
            for saved in list {
                println!("  {} ({} 个条件)", saved.name, saved.filter.condition_count());
            }
        }
        Outcome::Fields(fields) => {
            for field in fields {
                let operators: Vec<_> = field.offered_operators().iter().map(|op| op.as_str()).collect();
                print!("  {:<16} {:<8} [{}]", field.id, field.field_type.as_str(), operators.join(", "));
                if let Some(options) = &field.options {
                    print!(" 可选值: {}", options.join(", "));
                }
                println!();
            }
        }
        Outcome::Help => print_help(),
    }
    Ok(())
}

fn print_args(args: &FindManyArgs) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&args.to_json())?);
    for dropped in &args.dropped {
        println!("⚠️ 已忽略 {}", dropped);
    }
    Ok(())
}

fn print_request(session: &ListSession, request: &ListRequest) -> Result<()> {
    println!("[请求 #{}] {}", request.ticket.id(), session.entity());
    print_args(&request.args)?;
    println!("SQL: {}", request.sql);
    Ok(())
}

fn print_help() {
    println!(
        r#"路径: 组 g0、g0.g1（根组可写 root 或省略），条件 c0、g0.c1

过滤器:
  add [组]                  添加空条件
  field <条件> <字段>        选择字段（运算符重置，值清空）
  op <条件> <运算符>         选择运算符: equals contains startsWith endsWith
                            greaterThan lessThan between in（或 = ~ ^ $ > <）
  value <条件> <值>          "文本"、123、2024-03-01、true、1..5、(a, b)
  clear <条件>              清空值
  rm <条件>                 删除条件
  group [组] and|or          添加嵌套组
  rmgroup <组>              删除嵌套组
  logic [组] and|or          修改组的逻辑
  where <表达式>             用表达式替换整个过滤器，如 city = Lviv AND rating > 1500
  reset                     清空过滤器和搜索

列表:
  search [文本]             搜索框（防抖后执行）
  page <页码> [每页条数]     分页
  sort [字段 [asc|desc]]     排序；不带字段时取消排序

查看:
  show / compile / sql / fields

保存:
  save <名称> / load <名称> / delete <名称> / saved

  help / quit"#
    );
}
