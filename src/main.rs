use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::future::join_all;
use gcpscan::config::Config;
use gcpscan::connection::Connection;
use gcpscan::engine::{FilterPredicate, Flow, ListError, PredicateSet};
use gcpscan::gcp::http::format_gcp_error;
use gcpscan::output::{render, OutputFormat, ResourceRows};
use gcpscan::resource::{get_all_resource_keys, get_resource};
use serde_json::Value;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// List Google Cloud resources as rows
#[derive(Parser, Debug)]
#[command(name = "gcpscan", version = gcpscan::VERSION, about, long_about = None)]
struct Args {
    /// GCP project to use
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Default GCP region
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// Default GCP zone
    #[arg(short, long, global = true)]
    zone: Option<String>,

    /// Restrict per-region and per-zone listings to these regions
    #[arg(long, global = true, value_delimiter = ',')]
    regions: Vec<String>,

    /// Skip scopes failing with this HTTP status, status code or reason
    #[arg(long = "ignore-error-code", global = true)]
    ignore_error_codes: Vec<String>,

    /// Skip scopes whose error message contains this text
    #[arg(long = "ignore-error-message", global = true)]
    ignore_error_messages: Vec<String>,

    /// Page fetches per second
    #[arg(long, global = true)]
    requests_per_second: Option<u32>,

    /// Base URL replacing https://<service>.googleapis.com
    #[arg(long, global = true)]
    api_endpoint: Option<String>,

    /// Pre-issued access token instead of Application Default Credentials
    #[arg(long, global = true, env = "GCPSCAN_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Configuration file (defaults to <config dir>/gcpscan/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List known resource types
    Resources,
    /// Show the resolved project, region and common columns
    Context,
    /// List rows of one or more resource types
    List {
        /// Resource types, e.g. compute-instances
        #[arg(required = true)]
        keys: Vec<String>,

        /// Maximum rows per resource type
        #[arg(short, long)]
        limit: Option<u64>,

        /// Predicate `column OP value`, e.g. "status = RUNNING"
        #[arg(short = 'w', long = "where")]
        predicates: Vec<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Fetch one resource by identifier
    Get {
        key: String,
        id: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        output: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

impl Args {
    fn overrides(&self) -> Config {
        Config {
            project: self.project.clone(),
            region: self.region.clone(),
            zone: self.zone.clone(),
            regions: self.regions.clone(),
            ignore_error_codes: self.ignore_error_codes.clone(),
            ignore_error_messages: self.ignore_error_messages.clone(),
            requests_per_second: self.requests_per_second,
            api_endpoint: self.api_endpoint.clone(),
            access_token: self.access_token.clone(),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("gcpscan {} started with log level: {:?}", gcpscan::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("gcpscan").join("gcpscan.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".gcpscan").join("gcpscan.log");
    }
    PathBuf::from("gcpscan.log")
}

/// Log the full error, surface the short one
fn user_error(error: ListError) -> anyhow::Error {
    tracing::error!("{:?}", error);
    anyhow::anyhow!(format_gcp_error(&error))
}

fn parse_predicates(key: &str, expressions: &[String]) -> Result<PredicateSet> {
    let def = get_resource(key).ok_or_else(|| user_error(ListError::UnknownResource(key.into())))?;
    expressions
        .iter()
        .map(|expr| FilterPredicate::parse(expr, &def.filters))
        .collect()
}

async fn list_rows(
    conn: &Connection,
    key: &str,
    predicates: &PredicateSet,
    limit: Option<u64>,
) -> Result<Vec<Value>> {
    let mut rows = Vec::new();
    let mut sink = |row: Value| {
        rows.push(row);
        Flow::Continue
    };

    let report = conn
        .list(key, predicates, limit, &mut sink)
        .await
        .map_err(user_error)?;

    if !report.scopes_skipped.is_empty() {
        eprintln!(
            "{}: skipped {} location(s): {}",
            key,
            report.scopes_skipped.len(),
            report.scopes_skipped.join(", ")
        );
    }

    Ok(rows)
}

async fn run(args: Args) -> Result<()> {
    let file_config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    let config = file_config.merge(args.overrides());

    match args.command {
        Command::Resources => {
            for key in get_all_resource_keys() {
                if let Some(def) = get_resource(key) {
                    println!("{:<34}{}", key, def.display_name);
                }
            }
        },
        Command::Context => {
            let conn = Connection::connect(config).await?;
            let context = conn.context().await.map_err(user_error)?;
            println!("{}", serde_json::to_string_pretty(&context)?);
        },
        Command::List {
            keys,
            limit,
            predicates,
            output,
        } => {
            let conn = Connection::connect(config).await?;

            let mut jobs = Vec::new();
            for key in &keys {
                let parsed = parse_predicates(key, &predicates)?;
                let conn = conn.clone();
                jobs.push(async move {
                    let rows = list_rows(&conn, key, &parsed, limit).await;
                    (key.as_str(), rows)
                });
            }

            let mut results = Vec::new();
            for (key, rows) in join_all(jobs).await {
                results.push(ResourceRows { key, rows: rows? });
            }

            println!("{}", render(output, &results)?);
        },
        Command::Get { key, id, output } => {
            let conn = Connection::connect(config).await?;
            match conn.get(&key, &id).await.map_err(user_error)? {
                Some(row) => {
                    let results = [ResourceRows {
                        key: &key,
                        rows: vec![row],
                    }];
                    println!("{}", render(output, &results)?);
                },
                None => anyhow::bail!("{} '{}' not found", key, id),
            }
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let result = run(args).await;
    if let Err(err) = &result {
        tracing::error!("{:#}", err);
    }
    result
}
