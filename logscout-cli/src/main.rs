use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use logscout::{
    logging, AggregateStats, EncodingMode, FileOutcome, RegexSpec, ScanConfig, ScanReport,
    ScanResult, Scanner, TargetsConfig,
};
use std::{num::NonZeroUsize, path::PathBuf};
use tracing::debug;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
struct CliScanConfig {
    /// Configuration file (YAML), layered over the global and local config files
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Named pattern as NAME=REGEX (can be specified multiple times)
    #[arg(short = 'p', long = "pattern", value_parser = parse_named_pattern)]
    patterns: Vec<(String, String)>,

    /// Directory holding the log files
    #[arg(short = 'd', long)]
    path: Option<PathBuf>,

    /// Log file name or glob (can be specified multiple times)
    #[arg(short = 'f', long = "file")]
    files: Vec<String>,

    /// Scan rotated archive members instead of the live file
    #[arg(long)]
    archive: bool,

    /// Directory holding the archives (default: --path)
    #[arg(long)]
    archive_path: Option<PathBuf>,

    /// Treat every file as gzip-compressed
    #[arg(long)]
    gzip: bool,

    /// Fetch the files from this host over SSH
    #[arg(long)]
    remote: Option<String>,

    /// SSH port (default: 22)
    #[arg(long)]
    port: Option<u16>,

    /// SSH user (default: current user)
    #[arg(long)]
    user: Option<String>,

    /// SSH credentials: agent | password:<secret> | key:<path>
    #[arg(long)]
    credentials: Option<String>,

    /// Date tag inserted into the file name (app.log -> app-<DATE>.log)
    #[arg(long)]
    date: Option<String>,

    /// Read archives instead of live files for dates older than this many days
    #[arg(long)]
    days_before_archiving: Option<u32>,

    /// Environment whose host (from `levels_to_boxes`) holds the logs
    #[arg(long)]
    level: Option<String>,

    /// Maximum number of files scanned concurrently
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// How to handle invalid UTF-8 lines (skip|lossy)
    #[arg(long, value_parser = parse_encoding)]
    encoding: Option<EncodingMode>,

    /// Print statistics for every file
    #[arg(long)]
    per_file: bool,

    /// Print the matching lines of every file
    #[arg(long)]
    view: bool,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,

    /// Show a progress bar
    #[arg(long)]
    progress: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,
}

impl CliScanConfig {
    /// Overlays the flags that were given onto the loaded configuration
    fn apply_to(&self, config: &mut ScanConfig) {
        let mut overrides = TargetsConfig {
            default_path: self.path.clone(),
            archive_path: self.archive_path.clone(),
            is_archive: self.archive,
            is_gzip: self.gzip,
            is_remote: self.remote.is_some(),
            remote_host: self.remote.clone(),
            remote_port: self.port,
            remote_user: self.user.clone(),
            remote_credentials: self.credentials.clone(),
            log_date: self.date.clone(),
            days_before_archiving: self.days_before_archiving,
            level: self.level.clone(),
            ..Default::default()
        };
        match self.files.as_slice() {
            [] => {}
            [single] => overrides.default_filename = Some(single.clone()),
            [first, ..] => {
                overrides.default_filename = Some(first.clone());
                overrides.filenames = self.files.clone();
            }
        }
        config.targets = std::mem::take(&mut config.targets).merge(overrides);

        let scanner = &mut config.scanner;
        if let Some(threads) = self.threads {
            scanner.max_concurrency = threads;
        }
        if let Some(encoding) = self.encoding {
            scanner.encoding_mode = encoding;
        }
        if let Some(level) = &self.log_level {
            scanner.log_level = level.clone();
        }
        scanner.show_progress |= self.progress;
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Scan log files and print match statistics
    Scan(Box<CliScanConfig>),
}

fn parse_named_pattern(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, pattern)) if !name.is_empty() => Ok((name.to_string(), pattern.to_string())),
        _ => Err(format!("expected NAME=REGEX, got '{}'", raw)),
    }
}

fn parse_encoding(raw: &str) -> std::result::Result<EncodingMode, String> {
    match raw.to_lowercase().as_str() {
        "skip" => Ok(EncodingMode::Skip),
        "lossy" => Ok(EncodingMode::Lossy),
        _ => Err(format!("unknown encoding mode '{}' (expected skip or lossy)", raw)),
    }
}

fn main() -> Result<()> {
    run()
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan(args) => scan(&args),
    }
}

fn scan(args: &CliScanConfig) -> Result<()> {
    let mut config = ScanConfig::load_from(args.config.as_deref())?;
    args.apply_to(&mut config);
    logging::init_tracing(&config.scanner.log_level);
    debug!("Effective targets: {:?}", config.targets);

    let specs = args
        .patterns
        .iter()
        .map(|(name, pattern)| RegexSpec::new(name.as_str(), pattern))
        .collect::<ScanResult<Vec<_>>>()?;
    let scanner = Scanner::new(config, specs)?;
    if scanner.registry().is_empty() {
        bail!("No patterns given: pass -p NAME=REGEX or add a `patterns:` section to the config");
    }

    let report = scanner.scan()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_failures(&report);
    if args.per_file {
        print_per_file(&report);
    }
    if args.view {
        print_matching_lines(&report);
    }
    print_totals(&report.aggregate);
    Ok(())
}

fn print_failures(report: &ScanReport) {
    for stats in report.per_file.values() {
        if let Some(failure) = &stats.failure {
            let label = match stats.outcome() {
                FileOutcome::Partial => "partial:".yellow().bold(),
                _ => "failed:".red().bold(),
            };
            eprintln!("{} {} ({}): {}", label, stats.identity, failure.kind, failure.message);
        }
    }
    if report.cancelled {
        eprintln!("{}", "Scan was cancelled; results are partial".yellow());
    }
}

fn print_regex_stats(name: &str, stats: &logscout::RegexStats, indent: &str) {
    println!(
        "{}{} {}",
        indent,
        name.blue().bold(),
        format!("({} hits)", stats.total_hits).green()
    );
    for (group, values) in &stats.group_hits {
        match stats.group_summary(group) {
            Some(summary) => println!(
                "{}  {} max {}={} min {}={} avg {:.1}",
                indent,
                group.cyan(),
                summary.max_key,
                summary.max_count,
                summary.min_key,
                summary.min_count,
                summary.avg_count
            ),
            None => println!("{}  {}", indent, group.cyan()),
        }
        for (value, count) in values {
            println!("{}    {}: {}", indent, value, count.to_string().green());
        }
    }
}

fn print_per_file(report: &ScanReport) {
    for (identity, stats) in &report.per_file {
        println!(
            "\n{} {}",
            identity.to_string().blue().underline(),
            format!("[{} lines]", stats.lines_scanned).dimmed()
        );
        for (name, regex_stats) in &stats.regexes {
            print_regex_stats(name, regex_stats, "  ");
        }
    }
}

fn print_matching_lines(report: &ScanReport) {
    for (identity, lines) in report.matching_lines() {
        println!("\n{}", identity.to_string().blue());
        for line in lines {
            println!("{}: {}", line.line_number.to_string().green(), line.text);
        }
    }
}

fn print_totals(aggregate: &AggregateStats) {
    println!("\n{}", "Totals".bold());
    for (name, stats) in &aggregate.regexes {
        print_regex_stats(name, stats, "");
    }
    println!(
        "\nScanned {} files ({} failed, {} undecodable lines)",
        aggregate.files_scanned, aggregate.files_failed, aggregate.decode_errors
    );
}
