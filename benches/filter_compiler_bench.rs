use academy_filters::compiler::FilterCompiler;
use academy_filters::lexer::Lexer;
use academy_filters::model::FilterGroup;
use academy_filters::parser::{parse_filter, Parser};
use academy_filters::request::{EntityFilter, Pagination};
use academy_filters::sql;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

const CASES: [(&str, &str); 4] = [
    ("simple", r#"city = "Lviv""#),
    ("medium", r#"isActive = true AND rating between 1200..1800 AND email ~ gmail"#),
    (
        "complex",
        r#"(level = BEGINNER OR level = INTERMEDIATE) AND (city in (Lviv, Kyiv, Odesa) OR rating > 2000) AND joinedAt between 2024-01-01..2024-06-30"#,
    ),
    (
        "wide_or",
        r#"city = Lviv OR city = Kyiv OR city = Odesa OR city = Dnipro OR city = Kharkiv OR city = Zhytomyr"#,
    ),
];

fn filter_for(expr: &str) -> FilterGroup {
    parse_filter(expr).expect("解析应该成功")
}

// 基准测试：词法分析性能
fn benchmark_lexer(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer_performance");

    for (name, expr) in CASES {
        group.bench_with_input(BenchmarkId::new("tokenize", name), &expr, |b, &expr| {
            b.iter(|| {
                let tokens: Vec<_> = Lexer::new(black_box(expr)).collect();
                black_box(tokens)
            })
        });
    }

    group.finish();
}

// 基准测试：语法分析性能
fn benchmark_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_performance");

    for (name, expr) in CASES {
        // 预先词法分析
        let tokens: Vec<_> = Lexer::new(expr).collect();

        group.bench_with_input(BenchmarkId::new("parse", name), &tokens, |b, tokens| {
            b.iter(|| {
                let mut parser = Parser::new(expr, black_box(tokens));
                match parser.parse_filter() {
                    Ok(group) => black_box(group),
                    Err(_) => panic!("解析失败"),
                }
            })
        });
    }

    group.finish();
}

// 基准测试：过滤器编译性能
fn benchmark_compiler(c: &mut Criterion) {
    let compiler = FilterCompiler::new();
    let mut group = c.benchmark_group("compiler_performance");

    for (name, expr) in CASES {
        let filter = filter_for(expr);

        group.bench_with_input(BenchmarkId::new("compile", name), &filter, |b, filter| {
            b.iter(|| match compiler.compile(black_box(filter)) {
                Ok(compiled) => black_box(compiled),
                Err(_) => panic!("编译失败"),
            })
        });
    }

    group.finish();
}

// 基准测试：完整的端到端处理（表达式 → 查询参数 → SQL）
fn benchmark_end_to_end(c: &mut Criterion) {
    let compiler = FilterCompiler::new();
    let mut group = c.benchmark_group("end_to_end_performance");

    for (name, expr) in CASES {
        group.bench_with_input(BenchmarkId::new("full_pipeline", name), &expr, |b, &expr| {
            b.iter(|| {
                let filter = parse_filter(black_box(expr)).expect("解析应该成功");
                let args = EntityFilter::new(filter)
                    .with_pagination(Pagination::new(2, 50))
                    .find_many_args(&compiler, 100)
                    .expect("编译应该成功");
                let sql = sql::to_postgres("customers", &args).expect("SQL 生成应该成功");
                black_box(sql)
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_lexer,
    benchmark_parser,
    benchmark_compiler,
    benchmark_end_to_end
);
criterion_main!(benches);
