//! Screen CLI - Command-line interface for Synheart Screen
//!
//! Commands:
//! - replay: Replay a recorded session into a report payload
//! - validate: Parse and dry-run a recorded session
//! - bank: Print or check a question bank
//! - config: Print the default configuration
//! - doctor: Diagnose configuration, bank and environment

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use synheart_screen::bank::QuestionBank;
use synheart_screen::config::ScreenConfig;
use synheart_screen::encoder::{ReportEncoder, REPORT_SCHEMA_VERSION};
use synheart_screen::pipeline::{parse_events, replay_session};
use synheart_screen::session::SessionEvent;
use synheart_screen::{ScreenError, PRODUCER_NAME, SCREEN_VERSION};
use tracing_subscriber::EnvFilter;

/// Screen - On-device adaptive screening engine
#[derive(Parser)]
#[command(name = "screen")]
#[command(author = "Synheart AI Inc")]
#[command(version = SCREEN_VERSION)]
#[command(about = "Replay and inspect adaptive screening sessions", long_about = None)]
struct Cli {
    /// Log engine activity to stderr (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded session events into a report payload
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Configuration file (defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Parse and dry-run recorded session events
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Configuration file (defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the question bank
    Bank {
        /// Custom bank file to check instead of the built-in bank
        #[arg(long)]
        file: Option<PathBuf>,

        /// Output the full bank as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default configuration as JSON
    Config,

    /// Diagnose configuration, bank and environment
    Doctor {
        /// Check a configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check a custom bank file
        #[arg(long)]
        bank: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Single-line JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), ScreenCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            config,
            output_format,
        } => cmd_replay(&input, &output, config.as_deref(), output_format),

        Commands::Validate { input, config, json } => cmd_validate(&input, config.as_deref(), json),

        Commands::Bank { file, json } => cmd_bank(file.as_deref(), json),

        Commands::Config => {
            println!("{}", ScreenConfig::default().to_json()?);
            Ok(())
        }

        Commands::Doctor { config, bank, json } => cmd_doctor(config.as_deref(), bank.as_deref(), json),
    }
}

fn read_input(input: &Path) -> Result<String, ScreenCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn load_config(path: Option<&Path>) -> Result<ScreenConfig, ScreenCliError> {
    match path {
        Some(path) => Ok(ScreenConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(ScreenConfig::default()),
    }
}

fn load_events(input: &Path) -> Result<Vec<SessionEvent>, ScreenCliError> {
    let events = parse_events(&read_input(input)?)?;
    if events.is_empty() {
        return Err(ScreenCliError::NoEvents);
    }
    Ok(events)
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    config: Option<&Path>,
    output_format: OutputFormat,
) -> Result<(), ScreenCliError> {
    let config = load_config(config)?;
    let events = load_events(input)?;

    let session = replay_session(&events, config)?;
    let payload = ReportEncoder::new().encode(session.report()?);

    let output_data = match output_format {
        OutputFormat::Json => serde_json::to_string(&payload)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&payload)?,
    };

    if output.to_string_lossy() == "-" {
        println!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, config: Option<&Path>, json: bool) -> Result<(), ScreenCliError> {
    let config = load_config(config)?;
    let events = load_events(input)?;

    let answers = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Answer(_)))
        .count();

    let report = match replay_session(&events, config) {
        Ok(session) => ValidationReport {
            total_events: events.len(),
            answer_events: answers,
            phase_reached: Some(session.phase().to_string()),
            questions_delivered: session.questions_delivered(),
            report_ready: session.report().is_ok(),
            error: None,
        },
        Err(e) => ValidationReport {
            total_events: events.len(),
            answer_events: answers,
            phase_reached: None,
            questions_delivered: 0,
            report_ready: false,
            error: Some(e.to_string()),
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:        {}", report.total_events);
        println!("Answer events:       {}", report.answer_events);
        if let Some(phase) = &report.phase_reached {
            println!("Phase reached:       {}", phase);
            println!("Questions delivered: {}", report.questions_delivered);
            println!("Report ready:        {}", report.report_ready);
        }
        if let Some(error) = &report.error {
            println!("\nError: {}", error);
        }
    }

    match report.error {
        Some(error) => Err(ScreenCliError::ValidationFailed(error)),
        None => Ok(()),
    }
}

fn cmd_bank(file: Option<&Path>, json: bool) -> Result<(), ScreenCliError> {
    let bank = match file {
        Some(path) => QuestionBank::from_json(&fs::read_to_string(path)?)?,
        None => QuestionBank::standard().as_ref().clone(),
    };

    if json {
        println!("{}", bank.to_json()?);
        return Ok(());
    }

    println!("Question Bank");
    println!("=============");
    println!("Total items:    {}", bank.len());
    println!("Baseline items: {}", bank.baseline_len());
    println!();
    for pool in &bank.domains {
        println!(
            "  {:<18} baseline {:>2}  follow-up {:>2}",
            pool.domain.display_name(),
            pool.baseline.len(),
            pool.follow_up.len()
        );
    }
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, bank: Option<&Path>, json: bool) -> Result<(), ScreenCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "screen_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Screen version {}", SCREEN_VERSION),
    });

    checks.push(DoctorCheck {
        name: "report_schema".to_string(),
        status: CheckStatus::Ok,
        message: format!("Report schema: {}", REPORT_SCHEMA_VERSION),
    });

    // Config and bank must agree on the baseline size
    let mut baseline_count = ScreenConfig::default().session.baseline_question_count;
    if let Some(path) = config {
        checks.push(match fs::read_to_string(path) {
            Ok(content) => match ScreenConfig::from_json(&content) {
                Ok(config) => {
                    baseline_count = config.session.baseline_question_count;
                    match config.age_group {
                        Some(age_group) => DoctorCheck {
                            name: "config".to_string(),
                            status: CheckStatus::Ok,
                            message: format!(
                                "Config valid ({} baseline questions, age group {})",
                                baseline_count,
                                age_group.as_str()
                            ),
                        },
                        None => DoctorCheck {
                            name: "config".to_string(),
                            status: CheckStatus::Warning,
                            message: "Config valid but no age_group set; reports omit the age reference"
                                .to_string(),
                        },
                    }
                }
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
        });
    }

    let bank_check = match bank {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => match QuestionBank::from_json(&content) {
                Ok(bank) => bank_size_check(&bank, baseline_count),
                Err(e) => DoctorCheck {
                    name: "bank".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
            },
            Err(e) => DoctorCheck {
                name: "bank".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read bank file: {}", e),
            },
        },
        None => bank_size_check(&QuestionBank::standard(), baseline_count),
    };
    checks.push(bank_check);

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass events with --input <file>)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (ready for --input -)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: SCREEN_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Screen Doctor Report");
        println!("====================");
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

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(ScreenCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn bank_size_check(bank: &QuestionBank, baseline_count: usize) -> DoctorCheck {
    if bank.baseline_len() < baseline_count {
        DoctorCheck {
            name: "bank".to_string(),
            status: CheckStatus::Error,
            message: format!(
                "Bank has {} baseline items but {} are required",
                bank.baseline_len(),
                baseline_count
            ),
        }
    } else {
        DoctorCheck {
            name: "bank".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "Bank valid ({} items, {} baseline)",
                bank.len(),
                bank.baseline_len()
            ),
        }
    }
}

// Error types

#[derive(Debug)]
enum ScreenCliError {
    Io(io::Error),
    Screen(ScreenError),
    Json(serde_json::Error),
    NoEvents,
    ValidationFailed(String),
    DoctorFailed,
}

impl From<io::Error> for ScreenCliError {
    fn from(e: io::Error) -> Self {
        ScreenCliError::Io(e)
    }
}

impl From<ScreenError> for ScreenCliError {
    fn from(e: ScreenError) -> Self {
        ScreenCliError::Screen(e)
    }
}

impl From<serde_json::Error> for ScreenCliError {
    fn from(e: serde_json::Error) -> Self {
        ScreenCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ScreenCliError> for CliError {
    fn from(e: ScreenCliError) -> Self {
        match e {
            ScreenCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ScreenCliError::Screen(e) => {
                let (code, hint) = match &e {
                    ScreenError::ParseError(_) | ScreenError::JsonError(_) => {
                        ("PARSE_ERROR", "Ensure input is a JSON array or NDJSON of session events")
                    }
                    ScreenError::InvalidConfig(_) => {
                        ("CONFIG_ERROR", "Run 'screen config' for a valid starting point")
                    }
                    ScreenError::InvalidBank(_) => ("BANK_ERROR", "Run 'screen bank --json' for the expected layout"),
                    ScreenError::ReportUnavailable | ScreenError::SessionCancelled => {
                        ("NO_REPORT", "The recording ends before the session completes")
                    }
                    _ => ("SESSION_ERROR", "Run 'screen validate' for details"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            ScreenCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ScreenCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            ScreenCliError::ValidationFailed(message) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message,
                hint: Some("Check that answers follow the recorded seed's question order".to_string()),
            },
            ScreenCliError::DoctorFailed => CliError {
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
    total_events: usize,
    answer_events: usize,
    phase_reached: Option<String>,
    questions_delivered: usize,
    report_ready: bool,
    error: Option<String>,
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
    Warning,
    Error,
}
