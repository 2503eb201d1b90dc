//! Pulse CLI - Command-line interface for Synheart Pulse
//!
//! Commands:
//! - replay: Drive a tracker from a pulse.host_signal.v1 script and print store writes
//! - validate: Validate a replay script
//! - doctor: Diagnose configuration and environment
//! - schema: Print input/output record formats

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use synheart_pulse::replay::{self, ReplayRecord, Replayer};
use synheart_pulse::store::NdjsonStore;
use synheart_pulse::{
    TrackerConfig, TrackerError, PRODUCER_NAME, PULSE_VERSION, REPLAY_SCHEMA_VERSION,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Pulse - On-device session and engagement tracker
#[derive(Parser)]
#[command(name = "pulse")]
#[command(author = "Synheart AI Inc")]
#[command(version = PULSE_VERSION)]
#[command(about = "Replay host signals through the session tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a signal script and print every store write as NDJSON
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Tracker configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the heartbeat interval in seconds
        #[arg(long)]
        heartbeat_secs: Option<u64>,

        /// End a session left open at the end of the script
        #[arg(long)]
        end_at_eof: bool,
    },

    /// Validate a signal script
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

    /// Diagnose configuration and environment
    Doctor {
        /// Check a tracker configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (pulse.host_signal.v1)
    Input,
    /// Output records (store calls)
    Output,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

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

fn run(cli: Cli) -> Result<(), PulseCliError> {
    match cli.command {
        Commands::Replay {
            input,
            input_format,
            config,
            heartbeat_secs,
            end_at_eof,
        } => cmd_replay(
            &input,
            input_format,
            config.as_deref(),
            heartbeat_secs,
            end_at_eof,
        ),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),

        Commands::Schema { schema_type } => cmd_schema(schema_type),
    }
}

fn cmd_replay(
    input: &Path,
    input_format: InputFormat,
    config_path: Option<&Path>,
    heartbeat_secs: Option<u64>,
    end_at_eof: bool,
) -> Result<(), PulseCliError> {
    let mut config = match config_path {
        Some(path) => TrackerConfig::from_json(&fs::read_to_string(path)?)?,
        None => TrackerConfig::default(),
    };
    if let Some(secs) = heartbeat_secs {
        config.heartbeat_interval_secs = secs;
        config.validate()?;
    }

    let records = read_records(input, input_format)?;
    if records.is_empty() {
        return Err(PulseCliError::NoRecords);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let summary = runtime.block_on(async {
        let store = Arc::new(NdjsonStore::new(io::stdout()));
        let replayer = Replayer::new(store, config)?;
        replayer.run(&records, end_at_eof).await
    })?;

    info!(
        records = summary.records,
        sessions = summary.sessions_started,
        interval_heartbeats = summary.interval_heartbeats,
        session_open = summary.session_open,
        "replay finished"
    );
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), PulseCliError> {
    let records = read_records(input, input_format)?;

    let mut errors = Vec::new();
    let mut previous = None;
    for (index, record) in records.iter().enumerate() {
        if let Err(e) = record.validate() {
            errors.push(ValidationErrorDetail {
                index,
                signal: record.signal.type_name().to_string(),
                error: e.to_string(),
            });
        }
        if previous.is_some_and(|p| record.at < p) {
            errors.push(ValidationErrorDetail {
                index,
                signal: record.signal.type_name().to_string(),
                error: "timestamp earlier than previous record".to_string(),
            });
        }
        previous = Some(record.at);
    }

    let report = ValidationReport {
        total_records: records.len(),
        invalid_records: errors.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Problems found:  {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Record {} ({}): {}", err.index, err.signal, err.error);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(PulseCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), PulseCliError> {
    let mut checks: Vec<DoctorCheck> = vec![
        DoctorCheck {
            name: "pulse_version".to_string(),
            status: CheckStatus::Ok,
            message: format!("Pulse version {}", PULSE_VERSION),
        },
        DoctorCheck {
            name: "schema_version".to_string(),
            status: CheckStatus::Ok,
            message: format!("Input schema: {}", REPLAY_SCHEMA_VERSION),
        },
    ];

    if let Some(path) = config_path {
        let check = match fs::read_to_string(path) {
            Ok(content) => match TrackerConfig::from_json(&content) {
                Ok(config) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid (heartbeat every {}s, store timeout {}s)",
                        config.heartbeat_interval_secs, config.store_timeout_secs
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read config file: {}", e),
            },
        };
        checks.push(check);
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is piped (replay with --input -)".to_string(),
        }
    };
    checks.push(stdin_check);

    let failed = checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: PULSE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Pulse Doctor");
        println!("============");
        for check in &report.checks {
            let marker = match check.status {
                CheckStatus::Ok => "ok",
                CheckStatus::Error => "error",
            };
            println!("[{}] {}: {}", marker, check.name, check.message);
        }
    }

    if failed {
        Err(PulseCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType) -> Result<(), PulseCliError> {
    match schema_type {
        SchemaType::Input => {
            println!("Input Schema: {}", REPLAY_SCHEMA_VERSION);
            println!();
            println!("One record per line: {{ schema_version, at, signal }}");
            println!("`at` is an RFC 3339 timestamp; records must not go back in time.");
            println!();
            println!("Signal types:");
            println!("  start_session  {{ user_id, client_metadata? }}");
            println!("  page_view      {{ path }}");
            println!("  scroll         {{ scroll_top, scroll_height, viewport_height }}");
            println!("  visibility     {{ state: visible | hidden }}");
            println!("  unload");
            println!("  event          {{ name, properties? }}");
            println!("  heartbeat");
            println!("  end_session");
        }
        SchemaType::Output => {
            println!("Output: one store call per line, tagged by `op`");
            println!();
            println!("  create_session  {{ session_id, user_id, started_at,");
            println!("                    client_metadata }}");
            println!("  update_session  {{ session_id, user_id, last_heartbeat_at?,");
            println!("                    ended_at?, page_views? }}");
            println!("  append_event    {{ user_id, session_id, event_name,");
            println!("                    properties, timestamp }}");
            println!();
            println!("page_views always carries the full history:");
            println!("  {{ page, duration_seconds, scroll_depth_percent }}");
        }
    }
    Ok(())
}

// Helper functions

fn read_records(input: &Path, format: InputFormat) -> Result<Vec<ReplayRecord>, PulseCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let records = match format {
        InputFormat::Ndjson => replay::parse_ndjson(&input_data)?,
        InputFormat::Json => replay::parse_array(&input_data)?,
    };
    Ok(records)
}

// Error types

#[derive(Debug)]
enum PulseCliError {
    Io(io::Error),
    Tracker(TrackerError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for PulseCliError {
    fn from(e: io::Error) -> Self {
        PulseCliError::Io(e)
    }
}

impl From<TrackerError> for PulseCliError {
    fn from(e: TrackerError) -> Self {
        PulseCliError::Tracker(e)
    }
}

impl From<serde_json::Error> for PulseCliError {
    fn from(e: serde_json::Error) -> Self {
        PulseCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PulseCliError> for CliError {
    fn from(e: PulseCliError) -> Self {
        match e {
            PulseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PulseCliError::Tracker(TrackerError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'pulse doctor --config <file>' for details".to_string()),
            },
            PulseCliError::Tracker(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches {} schema", REPLAY_SCHEMA_VERSION)),
            },
            PulseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PulseCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            PulseCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} problems found in script", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            PulseCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    signal: String,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Error,
}
