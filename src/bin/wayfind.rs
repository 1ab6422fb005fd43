//! Wayfind CLI - Command-line interface for Synheart Wayfind
//!
//! Commands:
//! - replay: Ingest recorded navigation events and save the learned model
//! - predict: Predict next destinations from a saved model
//! - patterns: List the strongest patterns in a saved model
//! - metrics: Print model size and timing figures
//! - doctor: Diagnose configuration and state files
//! - schema: Print input/output schema information

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use synheart_wayfind::adapter::EventAdapter;
use synheart_wayfind::{
    ModelSnapshot, PatternRecognizer, PredictionContext, RecognizerConfig, WayfindError,
    PRODUCER_NAME, SNAPSHOT_VERSION, WAYFIND_VERSION,
};

/// Wayfind - On-device navigation pattern recognition
#[derive(Parser)]
#[command(name = "wayfind")]
#[command(author = "Synheart AI Inc")]
#[command(version = WAYFIND_VERSION)]
#[command(about = "Learn browsing patterns and predict the next destination", long_about = None)]
struct Cli {
    /// Recognizer configuration file (JSON); absent fields use defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest recorded events and save the learned model
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Continue from an existing state file
        #[arg(long)]
        load_state: Option<PathBuf>,

        /// Save the model state to file after ingesting
        #[arg(long)]
        save_state: Option<PathBuf>,

        /// Number of top patterns to print
        #[arg(long, default_value = "10")]
        top: usize,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Predict likely next destinations
    Predict {
        /// Model state file
        #[arg(long)]
        state: PathBuf,

        /// URL the user is currently on
        #[arg(long)]
        url: String,

        /// Local hour of day (0-23)
        #[arg(long)]
        time_of_day: Option<u8>,

        /// Elapsed session time in milliseconds
        #[arg(long)]
        session_duration_ms: Option<u64>,

        /// Recent search query (repeatable)
        #[arg(long = "search")]
        searches: Vec<String>,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// List the strongest patterns
    Patterns {
        /// Model state file
        #[arg(long)]
        state: PathBuf,

        /// Maximum number of patterns
        #[arg(long, default_value = "10")]
        top: usize,

        /// Minimum confidence
        #[arg(long, default_value = "0.0")]
        min_confidence: f64,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Print performance metrics for a model
    Metrics {
        /// Model state file
        #[arg(long)]
        state: PathBuf,
    },

    /// Diagnose configuration and state files
    Doctor {
        /// Check a model state file
        #[arg(long)]
        state: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
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
    /// JSON array
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Navigation event input
    Input,
    /// Prediction output
    Output,
    /// Model state snapshot
    Snapshot,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
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

fn run(cli: Cli) -> Result<(), WayfindCliError> {
    // Doctor reports a bad configuration instead of failing on it
    if let Commands::Doctor { state, json } = &cli.command {
        let config: RecognizerConfig = match cli.config.as_deref() {
            Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
            None => RecognizerConfig::default(),
        };
        return cmd_doctor(&config, state.as_deref(), *json);
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay {
            input,
            input_format,
            load_state,
            save_state,
            top,
            output_format,
        } => cmd_replay(
            config,
            &input,
            input_format,
            load_state.as_deref(),
            save_state.as_deref(),
            top,
            &output_format,
        ),

        Commands::Predict {
            state,
            url,
            time_of_day,
            session_duration_ms,
            searches,
            output_format,
        } => {
            let context = PredictionContext {
                time_of_day,
                session_duration_ms,
                recent_searches: (!searches.is_empty()).then_some(searches),
            };
            cmd_predict(config, &state, &url, &context, &output_format)
        }

        Commands::Patterns {
            state,
            top,
            min_confidence,
            output_format,
        } => {
            let recognizer = load_recognizer(config, &state)?;
            let patterns = recognizer.top_patterns(top, min_confidence);
            print!("{}", format_output(&patterns, &output_format)?);
            Ok(())
        }

        Commands::Metrics { state } => {
            let recognizer = load_recognizer(config, &state)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&recognizer.performance_metrics())?
            );
            Ok(())
        }

        // Handled before config validation
        Commands::Doctor { .. } => Ok(()),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn load_config(path: Option<&Path>) -> Result<RecognizerConfig, WayfindCliError> {
    match path {
        Some(path) => Ok(RecognizerConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(RecognizerConfig::default()),
    }
}

fn load_recognizer(
    config: RecognizerConfig,
    state: &Path,
) -> Result<PatternRecognizer, WayfindCliError> {
    let mut recognizer = PatternRecognizer::with_config(config)?;
    recognizer.import_json(&fs::read_to_string(state)?)?;
    Ok(recognizer)
}

fn read_input(input: &Path) -> Result<String, WayfindCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn cmd_replay(
    config: RecognizerConfig,
    input: &Path,
    input_format: InputFormat,
    load_state: Option<&Path>,
    save_state: Option<&Path>,
    top: usize,
    output_format: &OutputFormat,
) -> Result<(), WayfindCliError> {
    let input_data = read_input(input)?;

    let events = match input_format {
        InputFormat::Ndjson => EventAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => EventAdapter::parse_array(&input_data)?,
    };

    if events.is_empty() {
        return Err(WayfindCliError::NoEvents);
    }

    let mut recognizer = match load_state {
        Some(path) => load_recognizer(config, path)?,
        None => PatternRecognizer::with_config(config)?,
    };

    let issues = EventAdapter::validate_events(&events);
    for issue in &issues {
        log::warn!(
            "event #{} ({}): {}",
            issue.index,
            issue.event_id,
            issue.message
        );
    }

    recognizer.ingest_all(events);

    if let Some(path) = save_state {
        fs::write(path, recognizer.export_state().to_json_pretty()?)?;
        log::info!("model state saved to {}", path.display());
    }

    let patterns = recognizer.top_patterns(top, 0.0);
    let mut stdout = io::stdout();
    write!(stdout, "{}", format_output(&patterns, output_format)?)?;
    stdout.flush()?;
    Ok(())
}

fn cmd_predict(
    config: RecognizerConfig,
    state: &Path,
    url: &str,
    context: &PredictionContext,
    output_format: &OutputFormat,
) -> Result<(), WayfindCliError> {
    let recognizer = load_recognizer(config, state)?;
    let predictions = recognizer.predict(url, Some(context));
    print!("{}", format_output(&predictions, output_format)?);
    Ok(())
}

fn cmd_doctor(
    config: &RecognizerConfig,
    state: Option<&Path>,
    json: bool,
) -> Result<(), WayfindCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "wayfind_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Wayfind version {}", WAYFIND_VERSION),
    });

    checks.push(DoctorCheck {
        name: "snapshot_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Snapshot format: {}", SNAPSHOT_VERSION),
    });

    checks.push(match config.validate() {
        Ok(()) => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "history {}..{} events, {} patterns max",
                config.history_floor, config.history_capacity, config.max_patterns
            ),
        },
        Err(e) => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    });

    if let Some(state_path) = state {
        checks.push(check_state_file(state_path));
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
            message: "stdin is a pipe (replay from stdin ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: WAYFIND_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Wayfind Doctor Report");
        println!("=====================");
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
        Err(WayfindCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_state_file(path: &Path) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck {
            name: "state".to_string(),
            status: CheckStatus::Warning,
            message: "State file does not exist".to_string(),
        };
    }

    let result = fs::read_to_string(path)
        .map_err(|e| format!("Cannot read state file: {}", e))
        .and_then(|content| {
            ModelSnapshot::from_json(&content).map_err(|e| format!("Invalid state file: {}", e))
        });

    match result {
        Ok(snapshot) => DoctorCheck {
            name: "state".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "State file valid (v{}, {} patterns, {} history events, exported {})",
                snapshot.version,
                snapshot.patterns.len(),
                snapshot.history.events.len(),
                snapshot.exported_at.to_rfc3339()
            ),
        },
        Err(message) => DoctorCheck {
            name: "state".to_string(),
            status: CheckStatus::Error,
            message,
        },
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), WayfindCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", serde_json::to_string_pretty(&input_json_schema())?);
            } else {
                println!("Input: navigation event");
                println!();
                println!("  url        string, required (unparseable URLs are kept as 'unknown')");
                println!("  timestamp  RFC 3339 date-time, required");
                println!("  id         string, generated when absent");
                println!("  referrer   string, optional; drives transitions and search detection");
                println!("  duration   integer milliseconds, optional");
                println!("  type       navigation | search | interaction | tab_management");
                println!("  metadata   {{ tabId, title, category, searchTerms }}, all optional");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", serde_json::to_string_pretty(&output_json_schema())?);
            } else {
                println!("Output: prediction list, highest confidence first");
                println!();
                println!("  target_url  category key of the predicted destination");
                println!("  confidence  0.0 - 1.0");
                println!("  type        markov | temporal | session | search");
                println!("  factors     {{ historical_frequency, temporal_relevance, context_similarity }}");
                println!("  metadata    {{ sources: [type, ...] }}");
            }
        }
        SchemaType::Snapshot => {
            println!("Snapshot format: {}", SNAPSHOT_VERSION);
            println!();
            println!("  version, exported_at, patterns[], transitions {{ counts, probabilities }},");
            println!("  temporal[] (per day/hour bucket), history {{ capacity, events[] }}, session");
            if json_schema {
                log::warn!("no JSON schema is published for snapshots; printed the summary instead");
            }
        }
    }
    Ok(())
}

fn format_output<T: Serialize>(
    records: &[T],
    format: &OutputFormat,
) -> Result<String, WayfindCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)? + "\n"),
    }
}

fn input_json_schema() -> serde_json::Value {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "wayfind.navigation_event",
        "description": "Synheart Wayfind navigation event",
        "type": "object",
        "required": ["url", "timestamp"],
        "properties": {
            "id": { "type": "string" },
            "url": { "type": "string" },
            "referrer": { "type": ["string", "null"] },
            "timestamp": { "type": "string", "format": "date-time" },
            "duration": { "type": ["integer", "null"], "minimum": 0 },
            "type": {
                "type": "string",
                "enum": ["navigation", "search", "interaction", "tab_management"]
            },
            "metadata": {
                "type": "object",
                "properties": {
                    "tabId": { "type": "integer" },
                    "title": { "type": "string" },
                    "category": { "type": "string" },
                    "searchTerms": { "type": "string" }
                }
            }
        }
    })
}

fn output_json_schema() -> serde_json::Value {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "wayfind.predictions",
        "type": "array",
        "items": {
            "type": "object",
            "required": ["target_url", "confidence", "type", "factors"],
            "properties": {
                "target_url": { "type": "string" },
                "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                "type": { "type": "string", "enum": ["markov", "temporal", "session", "search"] },
                "factors": {
                    "type": "object",
                    "properties": {
                        "historical_frequency": { "type": "number" },
                        "temporal_relevance": { "type": "number" },
                        "context_similarity": { "type": "number" }
                    }
                },
                "metadata": {
                    "type": "object",
                    "properties": {
                        "sources": { "type": "array", "items": { "type": "string" } }
                    }
                }
            }
        }
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
enum WayfindCliError {
    Io(io::Error),
    Wayfind(WayfindError),
    Json(serde_json::Error),
    NoEvents,
    DoctorFailed,
}

impl From<io::Error> for WayfindCliError {
    fn from(e: io::Error) -> Self {
        WayfindCliError::Io(e)
    }
}

impl From<WayfindError> for WayfindCliError {
    fn from(e: WayfindError) -> Self {
        WayfindCliError::Wayfind(e)
    }
}

impl From<serde_json::Error> for WayfindCliError {
    fn from(e: serde_json::Error) -> Self {
        WayfindCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<WayfindCliError> for CliError {
    fn from(e: WayfindCliError) -> Self {
        match e {
            WayfindCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            WayfindCliError::Wayfind(e) => {
                let (code, hint) = match &e {
                    WayfindError::InvalidConfig(_) => {
                        ("CONFIG_ERROR", "Run 'wayfind doctor --config <file>' for details")
                    }
                    WayfindError::SnapshotVersion(_) => (
                        "SNAPSHOT_VERSION",
                        "Re-create the state file with this version of wayfind",
                    ),
                    WayfindError::JsonError(_) | WayfindError::ParseError(_) => {
                        ("PARSE_ERROR", "Run 'wayfind schema input' for the expected format")
                    }
                    WayfindError::EncodingError(_) => ("ENCODING_ERROR", "Check available memory"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            WayfindCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            WayfindCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            WayfindCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the checks above".to_string()),
            },
        }
    }
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

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
