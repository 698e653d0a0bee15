//! CLI parsing and orchestration. Parses args, runs one harvest job per
//! category, writes the snapshot and export artifacts, and maps errors to
//! exit codes.

use crate::config;
use crate::export::{export, ExportReport};
use crate::harvest::request::Category;
use crate::harvest::{run_job, ApiClient, HarvestJob, HarvestOutcome, HarvestStatus, PageOutcome};
use clap::Parser;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("No records harvested for any requested category. Check the network or the API, or retry later.")]
    NothingHarvested,

    #[error("{0}")]
    Export(String),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::NothingHarvested => 2,
            CliRunError::Export(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "nmdcharvest")]
#[command(about = "Harvest the NMDC GCPathogen species table and write TSV, CSV, and JSON")]
#[command(
    after_help = "Config file keys (output_dir, user_agent, endpoint, request_delay_ms, timeout_secs, retry_count, retry_backoff_secs, page_size, max_pages) are documented in the README. CLI flags override config."
)]
pub struct Args {
    /// Categories to harvest: bacteria, virus, fungi, parasite. Default: all four.
    #[arg(value_parser = parse_category)]
    pub categories: Vec<Category>,

    /// Output directory for all artifacts. Default: config output_dir or the current directory.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Records per page (overrides config; default 50).
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Cap on pages harvested per category (overrides config; default: all pages).
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// First page to fetch (1-based). Use to manually resume an interrupted run.
    #[arg(long, default_value_t = 1)]
    pub start_page: u32,

    /// Pacing delay in milliseconds between requests (overrides config; default 500).
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Total HTTP attempts per page; 1 means failed pages are skipped, not retried (overrides config; default 1).
    #[arg(long)]
    pub retries: Option<u32>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// API endpoint URL (overrides config).
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Skip writing the raw first-page envelope snapshot.
    #[arg(long)]
    pub no_snapshot: bool,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Print verbose error chain.
    #[arg(long)]
    pub verbose: bool,
}

/// Effective run settings after layering: CLI flag beats config key beats
/// built-in default.
#[derive(Debug, Clone, PartialEq)]
struct Settings {
    output_dir: PathBuf,
    page_size: u32,
    max_pages: Option<u32>,
    delay_ms: u64,
    timeout_secs: u64,
    attempts: u32,
    retry_backoff_secs: Vec<u64>,
    user_agent: Option<String>,
    endpoint: Option<String>,
}

const DEFAULT_PAGE_SIZE: u32 = 50;
const DEFAULT_DELAY_MS: u64 = 500;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Resolve the effective settings from flags and config. Pure; no I/O.
fn resolve_settings(args: &Args, config: Option<&config::Config>) -> Settings {
    Settings {
        output_dir: args
            .output_dir
            .clone()
            .or_else(|| config.and_then(|c| c.output_dir.clone()))
            .unwrap_or_else(|| PathBuf::from(".")),
        page_size: args
            .page_size
            .or_else(|| config.and_then(|c| c.page_size))
            .unwrap_or(DEFAULT_PAGE_SIZE),
        max_pages: args.max_pages.or_else(|| config.and_then(|c| c.max_pages)),
        delay_ms: args
            .delay_ms
            .or_else(|| config.and_then(|c| c.request_delay_ms))
            .unwrap_or(DEFAULT_DELAY_MS),
        timeout_secs: args
            .timeout
            .or_else(|| config.and_then(|c| c.timeout_secs))
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
        attempts: args
            .retries
            .or_else(|| config.and_then(|c| c.retry_count))
            .unwrap_or(1)
            .max(1),
        retry_backoff_secs: config
            .and_then(|c| c.retry_backoff_secs.clone())
            .unwrap_or_else(|| vec![1, 2, 4]),
        user_agent: args
            .user_agent
            .clone()
            .or_else(|| config.and_then(|c| c.user_agent.clone())),
        endpoint: args
            .endpoint
            .clone()
            .or_else(|| config.and_then(|c| c.endpoint.clone())),
    }
}

fn parse_category(s: &str) -> Result<Category, String> {
    match s.to_lowercase().as_str() {
        "bacteria" => Ok(Category::Bacteria),
        "virus" => Ok(Category::Virus),
        "fungi" => Ok(Category::Fungi),
        "parasite" => Ok(Category::Parasite),
        _ => Err(format!(
            "Invalid category: '{}'. Use bacteria, virus, fungi, or parasite.",
            s
        )),
    }
}

/// Dated artifact prefix for one category, e.g. "nmdc_bacteria_20260826".
fn artifact_prefix(category: Category, date_tag: &str) -> String {
    format!("nmdc_{}_{}", category, date_tag)
}

/// File size in human-readable units for the summary lines.
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{:.2} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.2} TB", size)
}

/// Ensure the output directory exists; return an error otherwise.
fn validate_output_dir(dir: &Path) -> Result<(), CliRunError> {
    if !dir.as_os_str().is_empty() && !dir.is_dir() {
        return Err(CliRunError::InvalidInput(format!(
            "Cannot write output: {}: directory does not exist.",
            dir.display()
        )));
    }
    Ok(())
}

/// Persist the raw first-page envelope for diagnostic inspection. Failure is a
/// warning, never fatal.
fn write_snapshot(outcome: &HarvestOutcome, path: &Path) {
    let Some(ref envelope) = outcome.first_envelope else {
        return;
    };
    let result = std::fs::File::create(path).and_then(|f| {
        serde_json::to_writer_pretty(f, envelope)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    });
    if let Err(e) = result {
        eprintln!(
            "Warning: could not write snapshot {}: {}",
            path.display(),
            e
        );
    }
}

/// Print why the first page produced nothing.
fn report_empty(category: Category, outcome: &HarvestOutcome) {
    match outcome.pages.first().map(|p| &p.outcome) {
        Some(PageOutcome::TransportFailed(e)) => {
            eprintln!("{}: no data: {}", category, e);
        }
        _ => {
            eprintln!("{}: no data: first page contained no records.", category);
        }
    }
}

/// Print the export summary. With `quiet` only warnings are printed.
fn report_export(category: Category, report: &ExportReport, quiet: bool) {
    if report.no_data {
        if !quiet {
            eprintln!("{}: no data to export.", category);
        }
        return;
    }
    if !quiet {
        eprintln!(
            "{}: exported {} records, {} columns",
            category, report.record_count, report.column_count
        );
        for file in &report.files {
            eprintln!(
                "  Wrote {} ({})",
                file.path.display(),
                human_size(file.bytes)
            );
        }
    }
    for failure in &report.failures {
        eprintln!(
            "Warning: {}: {}. Other formats unaffected.",
            failure.path.display(),
            failure.error
        );
    }
}

/// Cap on columns shown per preview line.
const PREVIEW_COLUMNS: usize = 6;
/// Cap on characters shown per preview cell.
const PREVIEW_CELL_CHARS: usize = 32;

/// Render the first `limit` records as one `key=value` line each, showing the
/// leading columns with long cells truncated.
fn preview_lines(records: &[crate::model::Record], columns: &[String], limit: usize) -> Vec<String> {
    records
        .iter()
        .take(limit)
        .map(|record| {
            columns
                .iter()
                .take(PREVIEW_COLUMNS)
                .map(|c| format!("{}={}", c, truncate_cell(&crate::export::cell_text(record, c))))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect()
}

fn truncate_cell(s: &str) -> String {
    if s.chars().count() <= PREVIEW_CELL_CHARS {
        s.to_string()
    } else {
        let head: String = s.chars().take(PREVIEW_CELL_CHARS).collect();
        format!("{}...", head)
    }
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    if args.start_page < 1 {
        return Err(CliRunError::InvalidInput(
            "Invalid --start-page: must be 1 or greater.".to_string(),
        ));
    }
    if args.page_size == Some(0) {
        return Err(CliRunError::InvalidInput(
            "Invalid --page-size: must be 1 or greater.".to_string(),
        ));
    }

    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let settings = resolve_settings(args, config.as_ref());
    let output_dir = settings.output_dir.clone();
    let page_size = settings.page_size;
    let max_pages = settings.max_pages;

    validate_output_dir(&output_dir)?;

    let mut builder = ApiClient::builder()
        .delay_ms(settings.delay_ms)
        .timeout_secs(settings.timeout_secs)
        .attempts(settings.attempts)
        .retry_backoff_secs(settings.retry_backoff_secs.clone());
    if let Some(ua) = settings.user_agent.clone() {
        builder = builder.user_agent(ua);
    }
    if let Some(url) = settings.endpoint.clone() {
        builder = builder.endpoint(url);
    }
    let mut client = builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    let categories: Vec<Category> = if args.categories.is_empty() {
        Category::ALL.to_vec()
    } else {
        args.categories.clone()
    };

    let date_tag = chrono::Local::now().format("%Y%m%d").to_string();
    let mut harvested_any = false;
    let mut dead_exports: Vec<String> = Vec::new();

    for category in categories {
        if !args.quiet {
            eprintln!("Harvesting {} (page size {})...", category, page_size);
        }

        let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
        let progress_cb = |n: u32, total: u32| {
            if total == 0 {
                return;
            }
            let mut state = progress_state.borrow_mut();
            let pb = state.get_or_insert_with(|| {
                let bar = indicatif::ProgressBar::new(total as u64);
                bar.set_style(
                    indicatif::ProgressStyle::default_bar()
                        .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
                        .unwrap()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                        .progress_chars("█▉▊▋▌▍▎▏ "),
                );
                bar.enable_steady_tick(Duration::from_millis(80));
                bar
            });
            pb.set_position(n as u64);
            pb.set_message(format!("Fetching page {}/{}", n, total));
        };
        let progress: Option<&dyn Fn(u32, u32)> =
            if args.quiet { None } else { Some(&progress_cb) };

        let job = HarvestJob {
            category,
            page_size,
            start_page: args.start_page,
            max_pages,
        };
        let outcome = run_job(&job, &mut client, progress);

        if let Some(pb) = progress_state.borrow_mut().take() {
            pb.disable_steady_tick();
            pb.finish_and_clear();
        }

        if !args.no_snapshot {
            let snapshot_path =
                output_dir.join(format!("response_sample_{}_{}.json", category, date_tag));
            write_snapshot(&outcome, &snapshot_path);
        }

        if outcome.status == HarvestStatus::DoneEmpty {
            report_empty(category, &outcome);
            continue;
        }
        harvested_any = true;

        for page in outcome.pages.iter().filter(|p| p.outcome.is_skip()) {
            match &page.outcome {
                PageOutcome::TransportFailed(e) => {
                    eprintln!("Page {}: {}. Skipped.", page.page, e);
                }
                PageOutcome::NoRecords => {
                    eprintln!("Page {}: no records. Skipped.", page.page);
                }
                PageOutcome::Fetched(_) => {}
            }
        }

        let summary = outcome.summary(category);
        if !args.quiet {
            eprintln!(
                "{}: {} records from {} attempted pages ({} skipped); server reports {} rows over {} pages",
                category,
                summary.record_count,
                summary.attempted_pages,
                summary.skipped_pages,
                summary.total_rows,
                summary.total_pages,
            );
        }

        let base = output_dir.join(artifact_prefix(category, &date_tag));
        let report = export(&outcome.records, &base);
        report_export(category, &report, args.quiet);
        if !report.no_data && report.files.is_empty() {
            dead_exports.push(format!(
                "{}: every export format failed (see warnings above)",
                category
            ));
        }
        if !args.quiet && !report.no_data {
            let columns = crate::export::column_union(&outcome.records);
            eprintln!("Columns ({}): {}", columns.len(), columns.join(", "));
            let preview = preview_lines(&outcome.records, &columns, 3);
            eprintln!("Preview (first {} records):", preview.len());
            for line in &preview {
                eprintln!("  {}", line);
            }
        }
    }

    if !harvested_any {
        return Err(CliRunError::NothingHarvested);
    }
    if !dead_exports.is_empty() {
        return Err(CliRunError::Export(dead_exports.join("; ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_category_known_values() {
        assert_eq!(parse_category("bacteria").unwrap(), Category::Bacteria);
        assert_eq!(parse_category("virus").unwrap(), Category::Virus);
        assert_eq!(parse_category("fungi").unwrap(), Category::Fungi);
        assert_eq!(parse_category("parasite").unwrap(), Category::Parasite);
        assert_eq!(parse_category("BACTERIA").unwrap(), Category::Bacteria);
    }

    #[test]
    fn parse_category_invalid() {
        assert!(parse_category("archaea").is_err());
        assert!(parse_category("").is_err());
    }

    #[test]
    fn artifact_prefix_is_dated_per_category() {
        assert_eq!(
            artifact_prefix(Category::Bacteria, "20260826"),
            "nmdc_bacteria_20260826"
        );
        assert_eq!(
            artifact_prefix(Category::Virus, "20260826"),
            "nmdc_virus_20260826"
        );
    }

    #[test]
    fn human_size_units() {
        assert_eq!(human_size(512), "512.00 B");
        assert_eq!(human_size(2048), "2.00 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn validate_output_dir_accepts_existing() {
        assert!(validate_output_dir(&std::env::temp_dir()).is_ok());
    }

    #[test]
    fn validate_output_dir_rejects_missing() {
        let result = validate_output_dir(Path::new("/nonexistent_dir_nmdcharvest_xyz"));
        assert!(result.is_err());
        if let Err(CliRunError::InvalidInput(msg)) = result {
            assert!(msg.contains("directory does not exist"));
        }
    }

    #[test]
    fn flag_overrides_config_key() {
        let config: config::Config =
            toml::from_str("page_size = 80\nrequest_delay_ms = 100\nretry_count = 4").unwrap();
        let args = Args::parse_from([
            "nmdcharvest",
            "--page-size",
            "200",
            "--delay-ms",
            "50",
            "--retries",
            "9",
        ]);
        let settings = resolve_settings(&args, Some(&config));
        assert_eq!(settings.page_size, 200);
        assert_eq!(settings.delay_ms, 50);
        assert_eq!(settings.attempts, 9);
    }

    #[test]
    fn config_key_overrides_default() {
        let config: config::Config =
            toml::from_str("page_size = 80\nrequest_delay_ms = 100\nretry_count = 4").unwrap();
        let args = Args::parse_from(["nmdcharvest"]);
        let settings = resolve_settings(&args, Some(&config));
        assert_eq!(settings.page_size, 80);
        assert_eq!(settings.delay_ms, 100);
        assert_eq!(settings.attempts, 4);
    }

    #[test]
    fn defaults_apply_without_flags_or_config() {
        let args = Args::parse_from(["nmdcharvest"]);
        let settings = resolve_settings(&args, None);
        assert_eq!(settings.page_size, 50);
        assert_eq!(settings.delay_ms, 500);
        assert_eq!(settings.timeout_secs, 30);
        assert_eq!(settings.attempts, 1);
        assert_eq!(settings.retry_backoff_secs, vec![1, 2, 4]);
        assert_eq!(settings.output_dir, PathBuf::from("."));
        assert!(settings.user_agent.is_none());
        assert!(settings.endpoint.is_none());
    }

    fn outcome_with_envelope(
        status: HarvestStatus,
        envelope: Option<serde_json::Value>,
    ) -> HarvestOutcome {
        HarvestOutcome {
            status,
            records: Vec::new(),
            total_rows: 0,
            total_pages: 0,
            pages: Vec::new(),
            first_envelope: envelope,
        }
    }

    #[test]
    fn snapshot_persists_envelope_for_populated_outcome() {
        let envelope = serde_json::json!({"data": {"list": [{"a": 1}], "totalPage": 1}});
        let outcome = outcome_with_envelope(HarvestStatus::Done, Some(envelope.clone()));
        let path = std::env::temp_dir().join("nmdcharvest_test_snapshot_done.json");
        write_snapshot(&outcome, &path);
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(written, envelope);
    }

    #[test]
    fn snapshot_persists_envelope_for_empty_first_page() {
        // An empty first page still yields a snapshot: the raw envelope is
        // the diagnostic for why the job came back empty.
        let envelope = serde_json::json!({"data": {"list": [], "totalPage": 9}});
        let outcome = outcome_with_envelope(HarvestStatus::DoneEmpty, Some(envelope.clone()));
        let path = std::env::temp_dir().join("nmdcharvest_test_snapshot_empty.json");
        write_snapshot(&outcome, &path);
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(written, envelope);
    }

    #[test]
    fn snapshot_skipped_when_first_fetch_failed() {
        let outcome = outcome_with_envelope(HarvestStatus::DoneEmpty, None);
        let path = std::env::temp_dir().join("nmdcharvest_test_snapshot_none.json");
        write_snapshot(&outcome, &path);
        assert!(!path.exists());
    }

    #[test]
    fn preview_caps_record_count() {
        let records: Vec<crate::model::Record> = (0..5)
            .map(|i| {
                serde_json::json!({"n": i})
                    .as_object()
                    .unwrap()
                    .clone()
            })
            .collect();
        let columns = crate::export::column_union(&records);
        let lines = preview_lines(&records, &columns, 3);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "n=0");
        assert_eq!(lines[2], "n=2");
    }

    #[test]
    fn preview_shows_leading_columns_and_empty_cells() {
        let records: Vec<crate::model::Record> = vec![
            serde_json::json!({"a": 1, "b": 2}).as_object().unwrap().clone(),
            serde_json::json!({"a": 3, "c": 4}).as_object().unwrap().clone(),
        ];
        let columns = crate::export::column_union(&records);
        let lines = preview_lines(&records, &columns, 3);
        assert_eq!(lines[0], "a=1, b=2, c=");
        assert_eq!(lines[1], "a=3, b=, c=4");
    }

    #[test]
    fn preview_truncates_long_cells() {
        let long = "x".repeat(100);
        let records: Vec<crate::model::Record> =
            vec![serde_json::json!({"a": long }).as_object().unwrap().clone()];
        let columns = crate::export::column_union(&records);
        let lines = preview_lines(&records, &columns, 3);
        assert!(lines[0].ends_with("..."));
        assert!(lines[0].len() < 100);
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(CliRunError::NothingHarvested.exit_code(), 2);
        assert_eq!(CliRunError::Export("x".into()).exit_code(), 3);
    }

    #[test]
    fn default_categories_are_all_four() {
        let args = Args::parse_from(["nmdcharvest"]);
        assert!(args.categories.is_empty());
        assert_eq!(Category::ALL.len(), 4);
    }

    #[test]
    fn args_accept_category_and_flags() {
        let args = Args::parse_from([
            "nmdcharvest",
            "bacteria",
            "virus",
            "--page-size",
            "100",
            "--max-pages",
            "10",
            "--start-page",
            "3",
            "--retries",
            "2",
        ]);
        assert_eq!(args.categories, vec![Category::Bacteria, Category::Virus]);
        assert_eq!(args.page_size, Some(100));
        assert_eq!(args.max_pages, Some(10));
        assert_eq!(args.start_page, 3);
        assert_eq!(args.retries, Some(2));
    }
}
