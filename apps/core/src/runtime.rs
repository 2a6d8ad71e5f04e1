use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::config::{self, ConfigError};
use crate::error::IconError;
use crate::icon_service::{IconService, ServiceError};
use crate::logging;
use crate::model::{Entry, IconOwnership, IconSize, ResolvedIcon};

const USAGE: &str = "usage: menuicon-core [--config <path>] [--large] [--hidden] [--depth <n>] [--workers <n>] [--json] <path>...";

#[derive(Debug)]
pub enum RuntimeError {
    Config(ConfigError),
    Service(ServiceError),
    Output(String),
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(error) => write!(f, "config error: {error}"),
            Self::Service(error) => write!(f, "service error: {error}"),
            Self::Output(error) => write!(f, "output error: {error}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<ConfigError> for RuntimeError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<ServiceError> for RuntimeError {
    fn from(value: ServiceError) -> Self {
        Self::Service(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub config_path: Option<PathBuf>,
    pub icon_size: Option<IconSize>,
    pub force_hidden: bool,
    pub depth: usize,
    pub workers: usize,
    pub json: bool,
    pub paths: Vec<PathBuf>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            icon_size: None,
            force_hidden: false,
            depth: 1,
            workers: 4,
            json: false,
            paths: Vec::new(),
        }
    }
}

pub fn parse_cli_args(args: &[String]) -> Result<RuntimeOptions, String> {
    let mut options = RuntimeOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter.next().ok_or("--config requires a path")?;
                options.config_path = Some(PathBuf::from(value));
            }
            "--large" => options.icon_size = Some(IconSize::Large),
            "--hidden" => options.force_hidden = true,
            "--json" => options.json = true,
            "--depth" => options.depth = parse_count(iter.next(), "--depth")?,
            "--workers" => options.workers = parse_count(iter.next(), "--workers")?,
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with("--") => {
                return Err(format!("unknown option '{flag}'\n{USAGE}"));
            }
            path => options.paths.push(PathBuf::from(path)),
        }
    }

    if options.paths.is_empty() {
        return Err(format!("at least one path is required\n{USAGE}"));
    }
    Ok(options)
}

fn parse_count(value: Option<&String>, flag: &str) -> Result<usize, String> {
    let raw = value.ok_or_else(|| format!("{flag} requires a number"))?;
    match raw.parse::<usize>() {
        Ok(count) if count > 0 => Ok(count),
        _ => Err(format!("{flag} must be a positive number, got '{raw}'")),
    }
}

pub fn run_with_options(options: RuntimeOptions) -> Result<(), RuntimeError> {
    if let Err(error) = logging::init() {
        eprintln!("[menuicon-core] logging disabled: {error}");
    }

    let mut config = config::load(options.config_path.as_deref())?;
    if let Some(size) = options.icon_size {
        config.icon_size = size;
    }
    logging::info(&format!(
        "startup icon_size={:?} config_path={}",
        config.icon_size,
        config.config_path.display()
    ));

    let service = IconService::initialize(config)?;

    let mut entries = collect_entries(&options.paths, options.depth);
    if options.force_hidden {
        for entry in &mut entries {
            entry.is_hidden_entry = true;
        }
    }

    let results = populate(&service, &mut entries, options.workers);
    let rows: Vec<RowReport> = entries
        .iter()
        .zip(&results)
        .map(|(entry, result)| RowReport::new(entry, result))
        .collect();

    // The rows are discarded here; give back what they own.
    for icon in results.into_iter().flatten() {
        icon.release();
    }

    let stats = service.cache().stats();
    let shutdown = service.shutdown();
    let report = Report {
        rows,
        cache_hits: stats.hits,
        cache_misses: stats.misses,
        cached_extensions: stats.entries,
        cached_icons_released: shutdown.cached_icons_released,
    };

    if options.json {
        let encoded = serde_json::to_string_pretty(&report)
            .map_err(|e| RuntimeError::Output(e.to_string()))?;
        println!("{encoded}");
    } else {
        print_report(&report);
    }
    Ok(())
}

pub fn collect_entries(paths: &[PathBuf], depth: usize) -> Vec<Entry> {
    let mut entries = Vec::new();
    for path in paths {
        if !path.is_dir() {
            entries.push(Entry::from_path(path));
            continue;
        }

        let walker = WalkDir::new(path)
            .min_depth(1)
            .max_depth(depth.max(1))
            .sort_by_file_name();
        for item in walker {
            match item {
                Ok(item) => entries.push(Entry::from_path(item.path())),
                Err(error) => logging::warn_at(path, "skipping entry", &error),
            }
        }
    }
    entries
}

/// Results line up with `entries`.
pub fn populate(
    service: &IconService,
    entries: &mut [Entry],
    workers: usize,
) -> Vec<Result<ResolvedIcon, IconError>> {
    if entries.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, entries.len());
    let chunk_len = entries.len().div_ceil(workers);

    std::thread::scope(|scope| {
        let handles: Vec<_> = entries
            .chunks_mut(chunk_len)
            .map(|chunk| {
                let len = chunk.len();
                let handle = scope.spawn(move || {
                    chunk
                        .iter_mut()
                        .map(|entry| service.resolve_icon(entry))
                        .collect::<Vec<_>>()
                });
                (len, handle)
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|(len, handle)| {
                handle.join().unwrap_or_else(|_| {
                    logging::error("population worker panicked");
                    vec![
                        Err(IconError::unexpected(
                            Path::new(""),
                            "population worker panicked"
                        ));
                        len
                    ]
                })
            })
            .collect()
    })
}

#[derive(Debug, Serialize)]
struct RowReport {
    path: String,
    label: String,
    target: String,
    is_directory: bool,
    hidden: bool,
    ownership: Option<IconOwnership>,
    width: u32,
    height: u32,
    error: Option<String>,
}

impl RowReport {
    fn new(entry: &Entry, result: &Result<ResolvedIcon, IconError>) -> Self {
        let (ownership, width, height, error) = match result {
            Ok(icon) => (
                Some(icon.ownership()),
                icon.icon().width(),
                icon.icon().height(),
                None,
            ),
            Err(error) => (None, 0, 0, Some(error.to_string())),
        };
        Self {
            path: entry.original_path().display().to_string(),
            label: entry.label.clone(),
            target: entry.target_path.display().to_string(),
            is_directory: entry.is_directory,
            hidden: entry.is_hidden_entry,
            ownership,
            width,
            height,
            error,
        }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    rows: Vec<RowReport>,
    cache_hits: u64,
    cache_misses: u64,
    cached_extensions: usize,
    cached_icons_released: usize,
}

fn print_report(report: &Report) {
    for row in &report.rows {
        match (&row.error, row.ownership) {
            (Some(error), _) => println!("[menuicon-core] {} error={error}", row.path),
            (None, ownership) => println!(
                "[menuicon-core] {} label={} icon={}x{} owner={} dir={} hidden={}",
                row.path,
                row.label,
                row.width,
                row.height,
                ownership_name(ownership),
                row.is_directory,
                row.hidden,
            ),
        }
    }
    println!(
        "[menuicon-core] cache hits={} misses={} extensions={} released={}",
        report.cache_hits,
        report.cache_misses,
        report.cached_extensions,
        report.cached_icons_released
    );
}

fn ownership_name(ownership: Option<IconOwnership>) -> &'static str {
    match ownership {
        Some(IconOwnership::Cache) => "cache",
        Some(IconOwnership::Caller) => "row",
        Some(IconOwnership::Shared) => "placeholder",
        None => "none",
    }
}
