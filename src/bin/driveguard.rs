//! DriveGuard CLI - Command-line interface for the incident engine
//!
//! Commands:
//! - resolve: Resolve raw incident identifiers to catalog entries
//! - ingest: Normalize raw events into incident records
//! - dashboard: Aggregate raw events into a dashboard snapshot
//! - validate: Validate raw event schema
//! - catalog: Print the active incident catalog
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use driveguard::config::{EngineConfig, CONFIG_ENV_VAR};
use driveguard::logging::{init_tracing, LOG_ENV_VAR};
use driveguard::schema::{IncidentIngestor, RawIncidentEvent, SCHEMA_VERSION};
use driveguard::{
    DashboardEngine, DataFeed, EngineError, FallbackPolicy, UnavailableReason, ENGINE_VERSION,
    PRODUCER_NAME,
};

/// DriveGuard - Driver-safety incident normalization and aggregation
#[derive(Parser)]
#[command(name = "driveguard")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Normalize driver-safety incidents into dashboard snapshots", long_about = None)]
struct Cli {
    /// Engine config file (JSON); defaults to $DRIVEGUARD_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve raw incident identifiers (arguments, or one JSON value per stdin line)
    Resolve {
        /// Identifiers such as 3, '"phone"' or null; bare words are treated as text
        identifiers: Vec<String>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Normalize raw events into incident records
    Ingest {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Aggregate raw events into a dashboard snapshot
    Dashboard {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Number of trips in the period
        #[arg(long, default_value = "0")]
        trips: u64,

        /// Per-trip scores, comma separated
        #[arg(long, value_delimiter = ',')]
        scores: Option<Vec<f64>>,

        /// Serve the fallback snapshot as if upstream data were unavailable
        #[arg(long)]
        unavailable: Option<ReasonArg>,

        /// Pretty-print the snapshot
        #[arg(long)]
        pretty: bool,
    },

    /// Validate raw event schema
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the active incident catalog
    Catalog {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReasonArg {
    Transport,
    Malformed,
    Timeout,
    Cancelled,
}

impl From<ReasonArg> for UnavailableReason {
    fn from(reason: ReasonArg) -> Self {
        match reason {
            ReasonArg::Transport => UnavailableReason::Transport,
            ReasonArg::Malformed => UnavailableReason::Malformed,
            ReasonArg::Timeout => UnavailableReason::Timeout,
            ReasonArg::Cancelled => UnavailableReason::Cancelled,
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), DriveGuardCliError> {
    let config_path = cli.config;

    match cli.command {
        Commands::Resolve {
            identifiers,
            output_format,
        } => cmd_resolve(&load_engine(config_path.as_deref())?, &identifiers, &output_format),

        Commands::Ingest {
            input,
            output,
            input_format,
            output_format,
        } => cmd_ingest(
            &load_engine(config_path.as_deref())?,
            &input,
            &output,
            input_format,
            &output_format,
        ),

        Commands::Dashboard {
            input,
            input_format,
            trips,
            scores,
            unavailable,
            pretty,
        } => cmd_dashboard(
            &load_engine(config_path.as_deref())?,
            input.as_deref(),
            input_format,
            trips,
            scores,
            unavailable,
            pretty,
        ),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Catalog { json } => cmd_catalog(&load_engine(config_path.as_deref())?, json),

        Commands::Doctor { json } => cmd_doctor(config_path.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, EngineError> {
    match path {
        Some(path) => EngineConfig::from_path(path),
        None => Ok(EngineConfig::from_env()?.unwrap_or_default()),
    }
}

fn load_engine(path: Option<&Path>) -> Result<DashboardEngine, DriveGuardCliError> {
    let config = load_config(path)?;
    Ok(DashboardEngine::from_config(&config)?)
}

fn read_input(input: &Path) -> Result<String, DriveGuardCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_events(
    data: &str,
    input_format: InputFormat,
) -> Result<Vec<RawIncidentEvent>, DriveGuardCliError> {
    let events = match input_format {
        InputFormat::Ndjson => IncidentIngestor::parse_ndjson(data)?,
        InputFormat::Json => IncidentIngestor::parse_array(data)?,
    };
    Ok(events)
}

fn cmd_resolve(
    engine: &DashboardEngine,
    identifiers: &[String],
    output_format: &OutputFormat,
) -> Result<(), DriveGuardCliError> {
    let stdin_lines;
    let identifiers: Vec<&str> = if identifiers.is_empty() {
        stdin_lines = read_input(Path::new("-"))?;
        stdin_lines
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    } else {
        identifiers.iter().map(String::as_str).collect()
    };

    let results: Vec<_> = identifiers
        .iter()
        .map(|raw| {
            let value = serde_json::from_str::<serde_json::Value>(raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
            engine.resolve_value(&value)
        })
        .collect();

    print!("{}", format_output(&results, output_format)?);
    Ok(())
}

fn cmd_ingest(
    engine: &DashboardEngine,
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: &OutputFormat,
) -> Result<(), DriveGuardCliError> {
    let events = parse_events(&read_input(input)?, input_format)?;

    if events.is_empty() {
        return Err(DriveGuardCliError::NoEvents);
    }

    let report = engine.ingest(&events);
    for rejected in &report.rejected {
        eprintln!(
            "{}",
            serde_json::to_string(rejected).unwrap_or_else(|_| rejected.reason.clone())
        );
    }

    let output_data = format_output(&report.records, output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_dashboard(
    engine: &DashboardEngine,
    input: Option<&Path>,
    input_format: InputFormat,
    trips: u64,
    scores: Option<Vec<f64>>,
    unavailable: Option<ReasonArg>,
    pretty: bool,
) -> Result<(), DriveGuardCliError> {
    let snapshot = match unavailable {
        Some(reason) => engine
            .aggregate_feed(DataFeed::Unavailable(reason.into()))
            .into_snapshot(),
        // Broken lines or elements are tallied as rejected, not fatal
        None => {
            let data = match input {
                Some(path) => read_input(path)?,
                None => String::new(),
            };
            match input_format {
                InputFormat::Ndjson => engine.snapshot_from_ndjson(trips, &data, scores.as_deref()),
                InputFormat::Json => {
                    let values: Vec<serde_json::Value> = if data.trim().is_empty() {
                        Vec::new()
                    } else {
                        serde_json::from_str(&data)?
                    };
                    engine.snapshot_from_values(trips, &values, scores.as_deref())
                }
            }
        }
    };

    if pretty {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{}", serde_json::to_string(&snapshot)?);
    }

    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    json: bool,
) -> Result<(), DriveGuardCliError> {
    let events = parse_events(&read_input(input)?, input_format)?;
    let results = IncidentIngestor::validate_events(&events);

    let report = ValidationReport {
        total_events: events.len(),
        valid_events: events.len() - results.len(),
        invalid_events: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                event_id: r.event_id.clone(),
                error: r.result.as_ref().map(|e| e.to_string()).unwrap_or_default(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Event {} (index {}): {}",
                    err.event_id.as_deref().unwrap_or("unknown"),
                    err.index,
                    err.error
                );
            }
        }
    }

    if report.invalid_events > 0 {
        Err(DriveGuardCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_catalog(engine: &DashboardEngine, json: bool) -> Result<(), DriveGuardCliError> {
    let catalog = engine.catalog();

    if json {
        println!("{}", serde_json::to_string_pretty(catalog.as_ref())?);
        return Ok(());
    }

    println!("Incident Catalog v{}", catalog.version());
    println!("====================");
    for entry in catalog.entries() {
        let marker = if entry.code == catalog.default_code() {
            " (default)"
        } else {
            ""
        };
        println!(
            "  {:>3}  {:<14} {:<6} {}{}",
            entry.code,
            entry.kind.as_str(),
            entry.severity.as_str(),
            entry.display_name,
            marker
        );
    }

    Ok(())
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), DriveGuardCliError> {
    let mut checks = vec![
        DoctorCheck::new(
            "engine_version",
            CheckStatus::Ok,
            format!("DriveGuard version {}", ENGINE_VERSION),
        ),
        DoctorCheck::new(
            "schema_version",
            CheckStatus::Ok,
            format!("Input schema: {}", SCHEMA_VERSION),
        ),
    ];

    let config_source = match config_path {
        Some(path) => path.display().to_string(),
        None => match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.is_empty() => format!("{} (from {})", path, CONFIG_ENV_VAR),
            _ => "built-in defaults".to_string(),
        },
    };

    match load_config(config_path).and_then(|c| DashboardEngine::from_config(&c)) {
        Ok(engine) => {
            checks.push(DoctorCheck::new(
                "config",
                CheckStatus::Ok,
                format!("Config valid ({})", config_source),
            ));
            checks.push(DoctorCheck::new(
                "catalog",
                CheckStatus::Ok,
                format!(
                    "Catalog v{} with {} entries, {} resolver rules",
                    engine.catalog().version(),
                    engine.catalog().len(),
                    engine.resolver().rules().len()
                ),
            ));
        }
        Err(e) => checks.push(DoctorCheck::new(
            "config",
            CheckStatus::Error,
            format!("Config from {} is unusable: {}", config_source, e),
        )),
    }

    let fallback = FallbackPolicy::snapshot(UnavailableReason::Transport);
    let fallback_status = if fallback.alerts.is_empty() {
        CheckStatus::Warning
    } else {
        CheckStatus::Ok
    };
    checks.push(DoctorCheck::new(
        "fallback",
        fallback_status,
        format!(
            "Fallback snapshot has {} alerts over {} trips",
            fallback.alerts.len(),
            fallback.total_trips
        ),
    ));

    let log_filter = match std::env::var(LOG_ENV_VAR) {
        Ok(filter) => format!("{}={}", LOG_ENV_VAR, filter),
        Err(_) => format!("{} unset, using driveguard=info", LOG_ENV_VAR),
    };
    checks.push(DoctorCheck::new("log_filter", CheckStatus::Ok, log_filter));

    let stdin_mode = if atty::is(atty::Stream::Stdin) {
        "stdin is a TTY (interactive mode)"
    } else {
        "stdin is a pipe (ready for --input -)"
    };
    checks.push(DoctorCheck::new("stdin", CheckStatus::Ok, stdin_mode));

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("DriveGuard Doctor Report");
        println!("========================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(DriveGuardCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn format_output<T: Serialize>(
    items: &[T],
    format: &OutputFormat,
) -> Result<String, DriveGuardCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for item in items {
                lines.push(serde_json::to_string(item)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(items)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(items)? + "\n"),
    }
}

// Error types

#[derive(Debug)]
enum DriveGuardCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    NoEvents,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for DriveGuardCliError {
    fn from(e: io::Error) -> Self {
        DriveGuardCliError::Io(e)
    }
}

impl From<EngineError> for DriveGuardCliError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Io(e) => DriveGuardCliError::Io(e),
            other => DriveGuardCliError::Engine(other),
        }
    }
}

impl From<serde_json::Error> for DriveGuardCliError {
    fn from(e: serde_json::Error) -> Self {
        DriveGuardCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<DriveGuardCliError> for CliError {
    fn from(e: DriveGuardCliError) -> Self {
        match e {
            DriveGuardCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            DriveGuardCliError::Engine(e) => {
                let (code, hint) = match &e {
                    EngineError::InvalidConfig(_) | EngineError::CatalogConflict(_) => (
                        "CONFIG_ERROR",
                        "Run 'driveguard doctor' to check the config",
                    ),
                    _ => (
                        "PARSE_ERROR",
                        "Ensure input matches incident.raw_event.v1 schema",
                    ),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            DriveGuardCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            DriveGuardCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            DriveGuardCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            DriveGuardCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct ValidationReport {
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    index: usize,
    event_id: Option<String>,
    error: String,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
