//! Proctor CLI - Command-line interface for Synheart Proctor
//!
//! Commands:
//! - replay: Replay a recorded session log into a report
//! - score: Compute a risk score from session aggregates
//! - config: Print the default configuration or validate a config file
//! - questions: Print the fallback question set or validate a question file
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use synheart_proctor::quiz::{fallback_questions, parse_questions, validate_questions};
use synheart_proctor::replay::{parse_records, replay_records, ReplayOptions};
use synheart_proctor::types::{QuestionSource, QuizQuestion};
use synheart_proctor::{
    ProctorConfig, ProctorError, QuestionSet, ReportBuilder, RiskScorer, SessionController,
    PROCTOR_VERSION, PRODUCER_NAME,
};

/// Proctor - On-device proctoring session engine
#[derive(Parser)]
#[command(name = "proctor")]
#[command(author = "Synheart AI Inc")]
#[command(version = PROCTOR_VERSION)]
#[command(about = "Turn proctoring signals into violation reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded session log (NDJSON) into a report
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Engine configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Question file (JSON or numbered text); defaults to the fallback set
        #[arg(long)]
        questions: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Submit at the last record when the log never submits
        #[arg(long)]
        submit_at_end: bool,

        /// Fixed producer instance ID (for reproducible output)
        #[arg(long)]
        instance_id: Option<String>,
    },

    /// Compute a risk score from session aggregates
    Score {
        /// Percentage of the session with a face visible
        #[arg(long, default_value = "100")]
        face_visibility: f64,

        /// Number of multi-face events
        #[arg(long, default_value = "0")]
        multi_face: u32,

        /// Number of tab switches
        #[arg(long, default_value = "0")]
        tab_switches: u32,

        /// Session length in minutes
        #[arg(long)]
        minutes: f64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default configuration, or validate a configuration file
    Config {
        /// Configuration file to validate
        #[arg(long)]
        validate: Option<PathBuf>,
    },

    /// Print the fallback question set, or validate a question file
    Questions {
        /// Question file to validate (use - for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check a configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check a question file
        #[arg(long)]
        questions: Option<PathBuf>,

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

fn run(cli: Cli) -> Result<(), ProctorCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            config,
            questions,
            output_format,
            submit_at_end,
            instance_id,
        } => cmd_replay(
            &input,
            &output,
            config.as_deref(),
            questions.as_deref(),
            output_format,
            submit_at_end,
            instance_id,
        ),

        Commands::Score {
            face_visibility,
            multi_face,
            tab_switches,
            minutes,
            json,
        } => cmd_score(face_visibility, multi_face, tab_switches, minutes, json),

        Commands::Config { validate } => cmd_config(validate.as_deref()),

        Commands::Questions { input, json } => cmd_questions(input.as_deref(), json),

        Commands::Doctor {
            config,
            questions,
            json,
        } => cmd_doctor(config.as_deref(), questions.as_deref(), json),
    }
}

fn read_input(path: &Path) -> Result<String, ProctorCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn load_config(path: Option<&Path>) -> Result<ProctorConfig, ProctorCliError> {
    match path {
        Some(path) => Ok(ProctorConfig::from_file(path)?),
        None => Ok(ProctorConfig::default()),
    }
}

fn load_question_set(path: Option<&Path>) -> Result<QuestionSet, ProctorCliError> {
    match path {
        Some(path) => {
            let questions = parse_questions(&read_input(path)?)?;
            validate_questions(&questions)?;
            Ok(QuestionSet {
                questions,
                source: QuestionSource::Supplied,
            })
        }
        None => Ok(QuestionSet::fallback()),
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    config: Option<&Path>,
    questions: Option<&Path>,
    output_format: OutputFormat,
    submit_at_end: bool,
    instance_id: Option<String>,
) -> Result<(), ProctorCliError> {
    let config = load_config(config)?;
    let set = load_question_set(questions)?;

    let records = if input.to_string_lossy() == "-" {
        parse_records(io::stdin().lock())?
    } else {
        parse_records(BufReader::new(fs::File::open(input)?))?
    };
    if records.is_empty() {
        return Err(ProctorCliError::NoRecords);
    }

    let mut controller = SessionController::with_question_set(config, set)?;
    if let Some(instance_id) = instance_id {
        controller = controller.with_report_builder(ReportBuilder::with_instance_id(instance_id));
    }

    let report = replay_records(&controller, &records, ReplayOptions { submit_at_end })?;

    let output_data = match output_format {
        OutputFormat::Json => serde_json::to_string(&report)? + "\n",
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&report)? + "\n",
    };

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_score(
    face_visibility: f64,
    multi_face: u32,
    tab_switches: u32,
    minutes: f64,
    json: bool,
) -> Result<(), ProctorCliError> {
    if !(0.0..=100.0).contains(&face_visibility) {
        return Err(ProctorCliError::InvalidArgument(format!(
            "face visibility must be within 0-100, got {}",
            face_visibility
        )));
    }
    if !minutes.is_finite() || minutes < 0.0 {
        return Err(ProctorCliError::InvalidArgument(format!(
            "minutes must be a non-negative number, got {}",
            minutes
        )));
    }

    let assessment = RiskScorer::score(face_visibility, multi_face, tab_switches, minutes);

    if json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
    } else {
        println!("Risk score: {:.2}", assessment.score);
        println!("Risk level: {:?}", assessment.level);
    }

    Ok(())
}

fn cmd_config(validate: Option<&Path>) -> Result<(), ProctorCliError> {
    match validate {
        Some(path) => {
            let config = ProctorConfig::from_file(path)?;
            println!("{}", config.to_json()?);
        }
        None => println!("{}", ProctorConfig::default().to_json()?),
    }
    Ok(())
}

fn cmd_questions(input: Option<&Path>, json: bool) -> Result<(), ProctorCliError> {
    let questions: Vec<QuizQuestion> = match input {
        Some(path) => load_question_set(Some(path))?.questions,
        None => fallback_questions(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&questions)?);
    } else {
        for (i, question) in questions.iter().enumerate() {
            println!("{}. {}", i + 1, question.prompt);
            for (letter, option) in ['A', 'B', 'C', 'D'].iter().zip(&question.options) {
                println!("   {}) {}", letter, option);
            }
            if let Some(letter) = ['A', 'B', 'C', 'D'].get(question.correct_index) {
                println!("   Answer: {}", letter);
            }
            println!();
        }
    }

    Ok(())
}

fn cmd_doctor(
    config: Option<&Path>,
    questions: Option<&Path>,
    json: bool,
) -> Result<(), ProctorCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "proctor_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Proctor version {}", PROCTOR_VERSION),
    });

    match config {
        Some(path) if !path.exists() => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "Configuration file does not exist".to_string(),
        }),
        Some(path) => match ProctorConfig::from_file(path) {
            Ok(config) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Configuration valid ({} s limit, {} ms capture interval)",
                    config.session.duration_limit_secs, config.session.capture_interval_ms
                ),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }),
        },
        None => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "Using default configuration".to_string(),
        }),
    }

    match questions {
        Some(path) => match load_question_set(Some(path)) {
            Ok(set) => checks.push(DoctorCheck {
                name: "questions".to_string(),
                status: if set.questions.is_empty() {
                    CheckStatus::Warning
                } else {
                    CheckStatus::Ok
                },
                message: format!("{} questions loaded", set.questions.len()),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "questions".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            }),
        },
        None => checks.push(DoctorCheck {
            name: "questions".to_string(),
            status: CheckStatus::Ok,
            message: format!("Fallback set ({} questions)", fallback_questions().len()),
        }),
    }

    // Replay reads session logs from stdin when piped
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
        version: PROCTOR_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Proctor Doctor Report");
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
        Err(ProctorCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum ProctorCliError {
    Io(io::Error),
    Proctor(ProctorError),
    Json(serde_json::Error),
    InvalidArgument(String),
    NoRecords,
    DoctorFailed,
}

impl From<io::Error> for ProctorCliError {
    fn from(e: io::Error) -> Self {
        ProctorCliError::Io(e)
    }
}

impl From<ProctorError> for ProctorCliError {
    fn from(e: ProctorError) -> Self {
        ProctorCliError::Proctor(e)
    }
}

impl From<serde_json::Error> for ProctorCliError {
    fn from(e: serde_json::Error) -> Self {
        ProctorCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ProctorCliError> for CliError {
    fn from(e: ProctorCliError) -> Self {
        match e {
            ProctorCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ProctorCliError::Proctor(e) => {
                let (code, hint) = match &e {
                    ProctorError::ConfigurationError(_) => (
                        "CONFIG_ERROR",
                        "Run 'proctor config' to see a valid configuration",
                    ),
                    ProctorError::InvalidQuestion(_) => (
                        "QUESTION_ERROR",
                        "Each question needs a unique id, four options and a correct_index below 4",
                    ),
                    ProctorError::ParseError(_) | ProctorError::JsonError(_) => (
                        "PARSE_ERROR",
                        "Check input format",
                    ),
                    ProctorError::InvalidPhase { .. } | ProctorError::AlreadySubmitted => (
                        "SESSION_ERROR",
                        "Session logs must start with a start record and submit at most once",
                    ),
                    ProctorError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                    ProctorError::ProviderUnavailable(_) | ProctorError::OverlappingEvent(_) => {
                        ("ENGINE_ERROR", "Re-run with a fresh session log")
                    }
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            ProctorCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ProctorCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: None,
            },
            ProctorCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in session log".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            ProctorCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

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
