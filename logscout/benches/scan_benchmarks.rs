#![allow(unused_must_use)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flate2::{write::GzEncoder, Compression};
use logscout::{RegexSpec, ScanConfig, ScanReport, Scanner, ScannerOptions, TargetsConfig};
use std::{fs::File, io::Write, num::NonZeroUsize, path::Path};
use tempfile::tempdir;

const CODES: [&str; 5] = ["200", "201", "404", "500", "503"];

fn log_line(j: usize) -> String {
    format!(
        "2024-01-01T00:00:{:02} ERROR {} request {} took {}ms path=/api/v1/items/{}",
        j % 60,
        CODES[j % CODES.len()],
        j,
        j % 997,
        j % 31
    )
}

fn create_log_files(dir: &Path, file_count: usize, lines_per_file: usize) -> std::io::Result<()> {
    for i in 0..file_count {
        let mut file = File::create(dir.join(format!("app_{}.log", i)))?;
        for j in 0..lines_per_file {
            writeln!(file, "{}", log_line(j))?;
        }
    }
    Ok(())
}

fn create_gzip_files(dir: &Path, file_count: usize, lines_per_file: usize) -> std::io::Result<()> {
    for i in 0..file_count {
        let file = File::create(dir.join(format!("app.log.{}.gz", i + 1)))?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        for j in 0..lines_per_file {
            writeln!(encoder, "{}", log_line(j))?;
        }
        encoder.finish()?;
    }
    Ok(())
}

fn create_scanner(threads: usize, patterns: &[(&str, &str)]) -> Scanner {
    let config = ScanConfig {
        scanner: ScannerOptions {
            max_concurrency: NonZeroUsize::new(threads).unwrap(),
            max_retained_lines: Some(100),
            ..Default::default()
        },
        ..Default::default()
    };
    let specs = patterns
        .iter()
        .map(|(name, pattern)| RegexSpec::new(*name, pattern).unwrap())
        .collect();
    Scanner::new(config, specs).unwrap()
}

fn scan(scanner: &Scanner, targets: &TargetsConfig) -> ScanReport {
    scanner.scan_config(targets).unwrap()
}

fn bench_pattern_complexity(c: &mut Criterion) -> std::io::Result<()> {
    let dir = tempdir()?;
    create_log_files(dir.path(), 4, 5_000)?;
    let targets = TargetsConfig::local(dir.path(), "app_*.log");

    let pattern_sets: Vec<(&str, Vec<(&str, &str)>)> = vec![
        ("literal", vec![("error", "ERROR")]),
        ("one_group", vec![("error", r"ERROR (?P<code>\d+)")]),
        (
            "three_patterns",
            vec![
                ("error", r"ERROR (?P<code>\d+)"),
                ("slow", r"took (?P<ms>\d{3})ms"),
                ("item", r"items/(?P<id>\d+)"),
            ],
        ),
    ];

    let mut group = c.benchmark_group("Pattern Complexity");
    for (name, patterns) in &pattern_sets {
        let scanner = create_scanner(4, patterns);
        group.bench_function(*name, |b| {
            b.iter(|| black_box(scan(&scanner, &targets)));
        });
    }
    group.finish();
    Ok(())
}

fn bench_file_scaling(c: &mut Criterion) -> std::io::Result<()> {
    let scanner = create_scanner(num_cpus::get(), &[("error", r"ERROR (?P<code>\d+)")]);

    let mut group = c.benchmark_group("File Scaling");
    for &count in &[1, 10, 100] {
        let dir = tempdir()?;
        create_log_files(dir.path(), count, 1_000)?;
        let targets = TargetsConfig::local(dir.path(), "app_*.log");

        group.bench_function(format!("files_{}", count), |b| {
            b.iter(|| black_box(scan(&scanner, &targets)));
        });
    }
    group.finish();
    Ok(())
}

fn bench_thread_scaling(c: &mut Criterion) -> std::io::Result<()> {
    let dir = tempdir()?;
    create_log_files(dir.path(), 32, 2_000)?;
    let targets = TargetsConfig::local(dir.path(), "app_*.log");

    let mut group = c.benchmark_group("Thread Scaling");
    for &threads in &[1, 2, 4, 8] {
        let scanner = create_scanner(threads, &[("error", r"ERROR (?P<code>\d+)")]);
        group.bench_function(format!("threads_{}", threads), |b| {
            b.iter(|| black_box(scan(&scanner, &targets)));
        });
    }
    group.finish();
    Ok(())
}

fn bench_gzip_archives(c: &mut Criterion) -> std::io::Result<()> {
    let dir = tempdir()?;
    create_gzip_files(dir.path(), 8, 5_000)?;
    let targets = TargetsConfig {
        is_archive: true,
        ..TargetsConfig::local(dir.path(), "app.log")
    };
    let scanner = create_scanner(4, &[("error", r"ERROR (?P<code>\d+)")]);

    let mut group = c.benchmark_group("Gzip Archives");
    group.bench_function("archives_8", |b| {
        b.iter(|| black_box(scan(&scanner, &targets)));
    });
    group.finish();
    Ok(())
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = bench_pattern_complexity, bench_file_scaling,
              bench_thread_scaling, bench_gzip_archives
}

criterion_main!(benches);
